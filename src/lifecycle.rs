//! Library lifecycle: backend binding and teardown
//!
//! A `Library` owns the process-wide transport state behind a single mutex:
//! whether a backend is bound, and which handles are open on it. Every
//! enumeration, open and transfer passes through `Library::backend()` first
//! and fails with `NotInitialized` while nothing is bound.

use std::sync::{Arc, OnceLock, Weak};

use hidport_transport::{Backend, MockBackend, RawDevice};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::{BackendKind, HidConfig};
use crate::device::{DeviceHandle, HandleCore};
use crate::error::{HidError, Result};

type BackendFactory = Box<dyn Fn() -> Result<Arc<dyn Backend>> + Send + Sync>;

struct LifecycleState {
    backend: Option<Arc<dyn Backend>>,
    /// Bumped on every successful init; lets `register` spot a handle opened
    /// against a binding that has since been torn down
    generation: u64,
    handles: Vec<Weak<HandleCore>>,
}

pub(crate) struct Shared {
    state: Mutex<LifecycleState>,
    factory: BackendFactory,
    pub(crate) config: HidConfig,
}

/// HID access context
///
/// Cheap to clone; clones share the same lifecycle state.
#[derive(Clone)]
pub struct Library {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("initialized", &self.is_initialized())
            .field("config", &self.shared.config)
            .finish()
    }
}

#[cfg(feature = "hidapi")]
fn hidapi_backend() -> Result<Arc<dyn Backend>> {
    Ok(Arc::new(hidport_transport::HidapiBackend::new()))
}

#[cfg(not(feature = "hidapi"))]
fn hidapi_backend() -> Result<Arc<dyn Backend>> {
    Err(HidError::InitError("hidapi backend not compiled in".into()))
}

#[cfg(all(target_os = "linux", feature = "hidraw"))]
fn hidraw_backend() -> Result<Arc<dyn Backend>> {
    Ok(Arc::new(hidport_transport::HidrawBackend::new()))
}

#[cfg(not(all(target_os = "linux", feature = "hidraw")))]
fn hidraw_backend() -> Result<Arc<dyn Backend>> {
    Err(HidError::InitError(
        "hidraw backend requires Linux and the `hidraw` feature".into(),
    ))
}

fn backend_for(kind: BackendKind) -> Result<Arc<dyn Backend>> {
    match kind {
        BackendKind::Auto => hidapi_backend()
            .or_else(|_| hidraw_backend())
            .map_err(|_| HidError::InitError("no HID backend compiled in".into())),
        BackendKind::Hidapi => hidapi_backend(),
        BackendKind::Hidraw => hidraw_backend(),
        BackendKind::Mock => Ok(Arc::new(MockBackend::new())),
    }
}

impl Library {
    fn from_factory(config: HidConfig, factory: BackendFactory) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(LifecycleState {
                    backend: None,
                    generation: 0,
                    handles: Vec::new(),
                }),
                factory,
                config,
            }),
        }
    }

    /// Library that binds the backend chosen by `config` at each `init`
    pub fn new(config: HidConfig) -> Self {
        let kind = config.backend;
        Self::from_factory(config, Box::new(move || backend_for(kind)))
    }

    /// Library bound to a prebuilt adapter (mock harnesses, custom transports)
    pub fn with_backend(backend: Arc<dyn Backend>) -> Self {
        Self::with_backend_and_config(backend, HidConfig::default())
    }

    pub fn with_backend_and_config(backend: Arc<dyn Backend>, config: HidConfig) -> Self {
        Self::from_factory(config, Box::new(move || Ok(Arc::clone(&backend))))
    }

    /// Library whose every `init` fails with `err` (e.g. a bad config file)
    fn unavailable(err: HidError) -> Self {
        Self::from_factory(HidConfig::default(), Box::new(move || Err(err.clone())))
    }

    pub fn config(&self) -> &HidConfig {
        &self.shared.config
    }

    /// Bind and initialize the backend; a no-op when already initialized
    pub fn init(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.backend.is_some() {
            debug!("HID library already initialized");
            return Ok(());
        }

        let backend = (self.shared.factory)().map_err(|e| match e {
            HidError::InitError(_) => e,
            other => HidError::InitError(other.to_string()),
        })?;
        backend
            .init()
            .map_err(|e| HidError::InitError(format!("{}: {e}", backend.name())))?;

        info!(
            "HID backend {} bound from {}",
            backend.name(),
            backend.location()
        );
        state.backend = Some(backend);
        state.generation += 1;
        Ok(())
    }

    /// Close every open handle and release the backend
    ///
    /// A no-op when not initialized. The binding is dropped before any handle
    /// is closed, so opens racing the teardown fail with `NotInitialized`. If
    /// the backend's own exit fails the binding is restored so the call can be
    /// retried; handles are closed either way.
    pub fn shutdown(&self) -> Result<()> {
        let (backend, handles) = {
            let mut state = self.shared.state.lock();
            let Some(backend) = state.backend.take() else {
                return Ok(());
            };
            (backend, std::mem::take(&mut state.handles))
        };

        // Closing locks each handle, so the lifecycle lock must not be held here
        let mut closed = 0;
        for core in handles.iter().filter_map(Weak::upgrade) {
            if core.close() {
                closed += 1;
            }
        }
        if closed > 0 {
            info!("Closed {} open handle(s) during shutdown", closed);
        }

        if let Err(e) = backend.exit() {
            warn!("{} backend exit failed: {}", backend.name(), e);
            let mut state = self.shared.state.lock();
            if state.backend.is_none() {
                state.backend = Some(Arc::clone(&backend));
                // Opens that started before the teardown must not register
                state.generation += 1;
            }
            return Err(HidError::ShutdownError(e.to_string()));
        }

        info!("HID backend {} released", backend.name());
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.state.lock().backend.is_some()
    }

    /// Identifier of the bound backend
    pub fn backend_name(&self) -> Result<String> {
        Ok(self.backend()?.0.name().to_string())
    }

    /// Where the bound backend was loaded from
    pub fn backend_location(&self) -> Result<String> {
        Ok(self.backend()?.0.location())
    }

    pub(crate) fn backend(&self) -> Result<(Arc<dyn Backend>, u64)> {
        let state = self.shared.state.lock();
        match &state.backend {
            Some(backend) => Ok((Arc::clone(backend), state.generation)),
            None => Err(HidError::NotInitialized),
        }
    }

    pub(crate) fn ensure_initialized(&self) -> Result<()> {
        self.backend().map(|_| ())
    }

    /// Track a freshly opened device so shutdown can close it
    pub(crate) fn register(
        &self,
        raw: Box<dyn RawDevice>,
        generation: u64,
        label: String,
    ) -> Result<DeviceHandle> {
        let mut state = self.shared.state.lock();
        if state.backend.is_none() || state.generation != generation {
            // Shutdown raced the open; dropping `raw` closes it
            return Err(HidError::NotInitialized);
        }
        let core = Arc::new(HandleCore::new(raw));
        state.handles.retain(|w| w.strong_count() > 0);
        state.handles.push(Arc::downgrade(&core));
        drop(state);

        info!("Opened {}", label);
        Ok(DeviceHandle::new(self.clone(), core, label))
    }

    /// Number of handles currently open on this library
    pub fn open_handles(&self) -> usize {
        self.shared
            .state
            .lock()
            .handles
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|core| core.is_open())
            .count()
    }
}

static GLOBAL: OnceLock<Library> = OnceLock::new();

/// Process-wide library, configured from the environment on first use
///
/// A bad `HIDPORT_CONFIG`/`HIDPORT_BACKEND` makes `init` fail with
/// `InitError` carrying the configuration message.
pub fn global() -> &'static Library {
    GLOBAL.get_or_init(|| match HidConfig::from_env() {
        Ok(config) => Library::new(config),
        Err(e) => {
            warn!("Ignoring HID configuration: {}", e);
            Library::unavailable(e)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_kind_binds_empty_bus() {
        let lib = Library::new(HidConfig::default().with_backend(BackendKind::Mock));
        assert!(!lib.is_initialized());
        lib.init().unwrap();
        assert_eq!(lib.backend_name().unwrap(), "mock");
        assert_eq!(lib.backend_location().unwrap(), "in-memory");
        lib.shutdown().unwrap();
        assert_eq!(lib.backend_name(), Err(HidError::NotInitialized));
    }

    #[test]
    fn test_bad_config_fails_init() {
        let err = "usbfs".parse::<BackendKind>().unwrap_err();
        let lib = Library::unavailable(err);
        let result = lib.init();
        assert_eq!(
            result,
            Err(HidError::InitError(
                "Configuration error: unknown backend: usbfs".into()
            ))
        );
        assert!(!lib.is_initialized());
    }

    #[test]
    fn test_register_rejects_stale_generation() {
        let mock = Arc::new(MockBackend::new());
        mock.attach(hidport_transport::MockDevice::new(1, 2));
        let lib = Library::with_backend(mock.clone());
        lib.init().unwrap();
        let (backend, generation) = lib.backend().unwrap();
        let raw = backend.open(1, 2, None).unwrap();

        lib.shutdown().unwrap();
        lib.init().unwrap();
        let result = lib.register(raw, generation, "stale".into());
        assert!(matches!(result, Err(HidError::NotInitialized)));
    }
}
