//! Device handle lifecycle
//!
//! A `DeviceHandle` is the single owner of one open device session. All
//! access to the underlying `RawDevice` goes through a per-handle mutex,
//! so the handle is `Send + Sync` and may be shared (e.g. in an `Arc`)
//! with operations serialized in call order.

use std::sync::atomic::{AtomicBool, Ordering};

use hidport_transport::{RawDevice, TransportError};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{HidError, Result};
use crate::lifecycle::Library;

/// Shared state behind a `DeviceHandle`; shutdown reaches it through a weak ref
pub(crate) struct HandleCore {
    device: Mutex<Option<Box<dyn RawDevice>>>,
    nonblocking: AtomicBool,
    // Separate lock so it stays readable while a read holds `device`
    last_error: Mutex<Option<String>>,
}

impl HandleCore {
    pub(crate) fn new(device: Box<dyn RawDevice>) -> Self {
        Self {
            device: Mutex::new(Some(device)),
            nonblocking: AtomicBool::new(false),
            last_error: Mutex::new(None),
        }
    }

    /// Drop the raw device; returns whether it was still open
    pub(crate) fn close(&self) -> bool {
        self.device.lock().take().is_some()
    }

    pub(crate) fn is_open(&self) -> bool {
        self.device.lock().is_some()
    }
}

/// Exclusive access to one open HID interface
///
/// Closed handles never reopen; every operation on them fails with
/// `InvalidHandle`. After `Library::shutdown` operations fail with
/// `NotInitialized` until the library is initialized again, then with
/// `InvalidHandle`.
pub struct DeviceHandle {
    library: Library,
    core: std::sync::Arc<HandleCore>,
    label: String,
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("device", &self.label)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Library {
    /// Open the first interface matching VID/PID and, if given, the exact serial
    pub fn open(
        &self,
        vendor_id: u16,
        product_id: u16,
        serial_number: Option<&str>,
    ) -> Result<DeviceHandle> {
        let (backend, generation) = self.backend()?;
        let label = match serial_number {
            Some(sn) => format!("{vendor_id:04X}:{product_id:04X} (serial {sn})"),
            None => format!("{vendor_id:04X}:{product_id:04X}"),
        };
        let raw = backend
            .open(vendor_id, product_id, serial_number)
            .map_err(|e| {
                debug!("Open {} failed: {}", label, e);
                HidError::DeviceNotFound(format!("{label}: {e}"))
            })?;
        self.register(raw, generation, label)
    }

    /// Open an interface by a path from enumeration or a platform-native path
    pub fn open_path(&self, path: impl AsRef<[u8]>) -> Result<DeviceHandle> {
        let path = path.as_ref();
        let (backend, generation) = self.backend()?;
        let label = String::from_utf8_lossy(path).into_owned();
        let raw = backend.open_path(path).map_err(|e| {
            debug!("Open {} failed: {}", label, e);
            HidError::DeviceNotFound(format!("{label}: {e}"))
        })?;
        self.register(raw, generation, label)
    }
}

impl DeviceHandle {
    pub(crate) fn new(library: Library, core: std::sync::Arc<HandleCore>, label: String) -> Self {
        Self {
            library,
            core,
            label,
        }
    }

    /// Release the device; closing an already closed handle is a no-op
    pub fn close(&self) {
        if self.core.close() {
            info!("Closed {}", self.label);
        }
    }

    pub fn is_open(&self) -> bool {
        self.core.is_open()
    }

    /// Human-readable device identity used in logs
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Switch `read` between waiting for a report and returning immediately
    ///
    /// Takes effect for the next read; a read already waiting is unaffected.
    pub fn set_nonblocking(&self, enabled: bool) -> Result<()> {
        self.transfer(HidError::ModeError, |dev| dev.set_nonblocking(enabled))?;
        self.core.nonblocking.store(enabled, Ordering::SeqCst);
        debug!("{}: nonblocking={}", self.label, enabled);
        Ok(())
    }

    pub fn is_nonblocking(&self) -> bool {
        self.core.nonblocking.load(Ordering::SeqCst)
    }

    /// Description of the most recent failed call on this handle
    ///
    /// `None` until something fails. Successful calls leave it unchanged.
    pub fn last_error(&self) -> Option<String> {
        self.core.last_error.lock().clone()
    }

    pub(crate) fn read_slice_ms(&self) -> i32 {
        self.library.config().read_slice_ms.clamp(1, i32::MAX as u64) as i32
    }

    pub(crate) fn string_capacity(&self) -> usize {
        self.library.config().string_capacity
    }

    /// Record `err` as this handle's last error and hand it back
    pub(crate) fn fail(&self, err: HidError, detail: Option<String>) -> HidError {
        let message = detail.unwrap_or_else(|| err.to_string());
        debug!("{}: {}", self.label, message);
        *self.core.last_error.lock() = Some(message);
        err
    }

    /// Run one raw operation under the handle lock
    ///
    /// Checks lifecycle state and handle validity first; a transport failure
    /// becomes `kind(message)`.
    pub(crate) fn transfer<T>(
        &self,
        kind: fn(String) -> HidError,
        op: impl FnOnce(&mut dyn RawDevice) -> std::result::Result<T, TransportError>,
    ) -> Result<T> {
        if let Err(e) = self.library.ensure_initialized() {
            return Err(self.fail(e, None));
        }

        let mut guard = self.core.device.lock();
        let Some(device) = guard.as_deref_mut() else {
            drop(guard);
            return Err(self.fail(HidError::InvalidHandle, None));
        };

        match op(&mut *device) {
            Ok(value) => Ok(value),
            Err(e) => {
                let detail = device.last_error();
                drop(guard);
                Err(self.fail(kind(e.to_string()), detail))
            }
        }
    }

    /// Validate lifecycle and handle state without touching the device
    pub(crate) fn ensure_open(&self) -> Result<()> {
        self.transfer(|_| HidError::InvalidHandle, |_| Ok(()))
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hidport_transport::{MockBackend, MockDevice};
    use std::sync::Arc;

    fn library() -> (Arc<MockBackend>, Library) {
        let mock = Arc::new(MockBackend::new());
        mock.attach(MockDevice::new(0x1209, 0x0001).with_serial("A1"));
        let lib = Library::with_backend(mock.clone());
        lib.init().unwrap();
        (mock, lib)
    }

    #[test]
    fn test_close_is_idempotent() {
        let (_mock, lib) = library();
        let handle = lib.open(0x1209, 0x0001, None).unwrap();
        assert!(handle.is_open());
        handle.close();
        handle.close();
        assert!(!handle.is_open());
        assert_eq!(lib.open_handles(), 0);
    }

    #[test]
    fn test_drop_closes() {
        let (_mock, lib) = library();
        let handle = lib.open(0x1209, 0x0001, Some("A1")).unwrap();
        assert_eq!(lib.open_handles(), 1);
        drop(handle);
        assert_eq!(lib.open_handles(), 0);
    }

    #[test]
    fn test_last_error_starts_empty() {
        let (_mock, lib) = library();
        let handle = lib.open(0x1209, 0x0001, None).unwrap();
        assert_eq!(handle.last_error(), None);
        handle.close();
        assert!(matches!(handle.ensure_open(), Err(HidError::InvalidHandle)));
        assert_eq!(
            handle.last_error().as_deref(),
            Some("Invalid handle: device is closed")
        );
    }
}
