//! In-memory simulated HID bus
//!
//! `MockBackend` stands in for a platform transport in tests and harnesses.
//! Each `MockDevice` is a shared handle to one simulated interface: tests
//! keep a clone to queue input reports, inspect writes, or pull the plug
//! while the library holds an open session on it.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::error::TransportError;
use crate::types::{BusType, RawDeviceInfo, StringQuery};
use crate::{Backend, RawDevice};

/// What a simulated device does with output reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Loopback {
    /// Writes are recorded only
    #[default]
    Off,
    /// Writes are queued back verbatim as input reports
    Echo,
    /// Writes are queued back without their leading report-ID byte
    StripReportId,
}

#[derive(Debug, Default)]
struct SimState {
    info: RawDeviceInfo,
    input: VecDeque<Vec<u8>>,
    written: Vec<Vec<u8>>,
    feature_reports: HashMap<u8, Vec<u8>>,
    indexed_strings: HashMap<i32, String>,
    loopback: Loopback,
    disconnected: bool,
    reject_nonblocking: bool,
    fail_open: bool,
    open_sessions: usize,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<SimState>,
    arrived: Condvar,
}

/// Shared handle to one simulated HID interface
#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    shared: Arc<Shared>,
}

impl MockDevice {
    /// Create a device with the given identity and a path of `mock:VVVV:PPPP`
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        let device = Self::default();
        {
            let mut state = device.shared.state.lock();
            state.info = RawDeviceInfo {
                path: format!("mock:{vendor_id:04x}:{product_id:04x}").into_bytes(),
                vendor_id,
                product_id,
                interface_number: -1,
                bus_type: BusType::Usb,
                ..Default::default()
            };
        }
        device
    }

    fn update(self, f: impl FnOnce(&mut SimState)) -> Self {
        f(&mut self.shared.state.lock());
        self
    }

    pub fn with_path(self, path: impl Into<Vec<u8>>) -> Self {
        let path = path.into();
        self.update(|s| s.info.path = path)
    }

    pub fn with_serial(self, serial: &str) -> Self {
        self.update(|s| s.info.serial_number = Some(serial.to_string()))
    }

    pub fn with_manufacturer(self, manufacturer: &str) -> Self {
        self.update(|s| s.info.manufacturer_string = Some(manufacturer.to_string()))
    }

    pub fn with_product(self, product: &str) -> Self {
        self.update(|s| s.info.product_string = Some(product.to_string()))
    }

    pub fn with_release(self, bcd: u16) -> Self {
        self.update(|s| s.info.release_number = bcd)
    }

    pub fn with_usage(self, usage_page: u16, usage: u16) -> Self {
        self.update(|s| {
            s.info.usage_page = usage_page;
            s.info.usage = usage;
        })
    }

    pub fn with_interface(self, interface_number: i32) -> Self {
        self.update(|s| s.info.interface_number = interface_number)
    }

    pub fn with_bus(self, bus_type: BusType) -> Self {
        self.update(|s| s.info.bus_type = bus_type)
    }

    pub fn with_loopback(self, loopback: Loopback) -> Self {
        self.update(|s| s.loopback = loopback)
    }

    pub fn with_indexed_string(self, index: i32, value: &str) -> Self {
        let value = value.to_string();
        self.update(|s| {
            s.indexed_strings.insert(index, value);
        })
    }

    /// Preload a feature report; `report[0]` is its report ID
    pub fn with_feature_report(self, report: &[u8]) -> Self {
        let report = report.to_vec();
        self.update(|s| {
            if let Some(&id) = report.first() {
                s.feature_reports.insert(id, report);
            }
        })
    }

    /// Make every open attempt fail as if access were denied
    pub fn with_open_failure(self) -> Self {
        self.update(|s| s.fail_open = true)
    }

    /// Snapshot of the device's enumeration record
    pub fn info(&self) -> RawDeviceInfo {
        self.shared.state.lock().info.clone()
    }

    /// Queue an input report and wake any blocked reader
    pub fn push_input(&self, report: &[u8]) {
        self.shared.state.lock().input.push_back(report.to_vec());
        self.shared.arrived.notify_all();
    }

    /// Number of queued, unread input reports
    pub fn pending_input(&self) -> usize {
        self.shared.state.lock().input.len()
    }

    /// Every output report written so far
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.shared.state.lock().written.clone()
    }

    /// Current contents of a feature report slot
    pub fn feature_report(&self, report_id: u8) -> Option<Vec<u8>> {
        self.shared
            .state
            .lock()
            .feature_reports
            .get(&report_id)
            .cloned()
    }

    /// Simulate unplugging; pending and future I/O fails
    pub fn disconnect(&self) {
        self.shared.state.lock().disconnected = true;
        self.shared.arrived.notify_all();
    }

    pub fn reconnect(&self) {
        self.shared.state.lock().disconnected = false;
    }

    pub fn set_reject_nonblocking(&self, reject: bool) {
        self.shared.state.lock().reject_nonblocking = reject;
    }

    /// Number of sessions currently holding the device open
    pub fn open_sessions(&self) -> usize {
        self.shared.state.lock().open_sessions
    }

    fn open_session(&self) -> Result<Box<dyn RawDevice>, TransportError> {
        let mut state = self.shared.state.lock();
        if state.fail_open {
            return Err(TransportError::PermissionDenied(
                String::from_utf8_lossy(&state.info.path).into_owned(),
            ));
        }
        if state.disconnected {
            return Err(TransportError::Disconnected);
        }
        state.open_sessions += 1;
        drop(state);
        Ok(Box::new(MockSession {
            device: self.clone(),
            last_error: None,
        }))
    }
}

/// Simulated transport holding a set of attachable devices
#[derive(Debug, Default)]
pub struct MockBackend {
    devices: Mutex<Vec<MockDevice>>,
    init_error: Mutex<Option<String>>,
    exit_error: Mutex<Option<String>>,
    initialized: Mutex<bool>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a device to the simulated bus
    pub fn attach(&self, device: MockDevice) {
        self.devices.lock().push(device);
    }

    /// Detach the device at `path`; open sessions see a disconnect
    pub fn detach(&self, path: &[u8]) {
        let mut devices = self.devices.lock();
        devices.retain(|d| {
            let keep = d.info().path != path;
            if !keep {
                d.disconnect();
            }
            keep
        });
    }

    /// Make the next `init` fail with `message`
    pub fn fail_init(&self, message: Option<&str>) {
        *self.init_error.lock() = message.map(str::to_string);
    }

    /// Make the next `exit` fail with `message`
    pub fn fail_exit(&self, message: Option<&str>) {
        *self.exit_error.lock() = message.map(str::to_string);
    }

    pub fn is_initialized(&self) -> bool {
        *self.initialized.lock()
    }

    fn attached(&self) -> Vec<MockDevice> {
        self.devices
            .lock()
            .iter()
            .filter(|d| !d.shared.state.lock().disconnected)
            .cloned()
            .collect()
    }

    fn ensure_initialized(&self) -> Result<(), TransportError> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(TransportError::Backend("mock backend not initialized".into()))
        }
    }
}

impl Backend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn location(&self) -> String {
        "in-memory".to_string()
    }

    fn init(&self) -> Result<(), TransportError> {
        if let Some(msg) = self.init_error.lock().clone() {
            return Err(TransportError::Backend(msg));
        }
        *self.initialized.lock() = true;
        Ok(())
    }

    fn exit(&self) -> Result<(), TransportError> {
        if let Some(msg) = self.exit_error.lock().clone() {
            return Err(TransportError::Backend(msg));
        }
        *self.initialized.lock() = false;
        Ok(())
    }

    fn enumerate(
        &self,
        vendor_id: u16,
        product_id: u16,
    ) -> Result<Vec<RawDeviceInfo>, TransportError> {
        self.ensure_initialized()?;
        Ok(self
            .attached()
            .iter()
            .map(MockDevice::info)
            .filter(|info| info.matches(vendor_id, product_id))
            .collect())
    }

    fn open(
        &self,
        vendor_id: u16,
        product_id: u16,
        serial_number: Option<&str>,
    ) -> Result<Box<dyn RawDevice>, TransportError> {
        self.ensure_initialized()?;
        let device = self
            .attached()
            .into_iter()
            .find(|d| {
                let info = d.info();
                info.vendor_id == vendor_id
                    && info.product_id == product_id
                    && serial_number.map_or(true, |sn| info.serial_number.as_deref() == Some(sn))
            })
            .ok_or_else(|| {
                TransportError::NotFound(format!("{vendor_id:04X}:{product_id:04X}"))
            })?;
        device.open_session()
    }

    fn open_path(&self, path: &[u8]) -> Result<Box<dyn RawDevice>, TransportError> {
        self.ensure_initialized()?;
        let device = self
            .attached()
            .into_iter()
            .find(|d| d.info().path == path)
            .ok_or_else(|| TransportError::NotFound(String::from_utf8_lossy(path).into_owned()))?;
        device.open_session()
    }
}

/// One open session on a simulated device
struct MockSession {
    device: MockDevice,
    last_error: Option<String>,
}

impl MockSession {
    fn record<T>(&mut self, result: Result<T, TransportError>) -> Result<T, TransportError> {
        if let Err(e) = &result {
            self.last_error = Some(e.to_string());
        }
        result
    }

    fn wait_for_input(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, TransportError> {
        let shared = &self.device.shared;
        let mut state = shared.state.lock();
        let deadline = (timeout_ms > 0)
            .then(|| Instant::now() + Duration::from_millis(timeout_ms as u64));

        loop {
            if state.disconnected {
                return Err(TransportError::Disconnected);
            }
            if let Some(report) = state.input.pop_front() {
                let n = report.len().min(buf.len());
                buf[..n].copy_from_slice(&report[..n]);
                return Ok(n);
            }
            match (timeout_ms, deadline) {
                (0, _) => return Ok(0),
                (_, Some(deadline)) => {
                    if shared.arrived.wait_until(&mut state, deadline).timed_out()
                        && state.input.is_empty()
                        && !state.disconnected
                    {
                        return Ok(0);
                    }
                }
                (_, None) => shared.arrived.wait(&mut state),
            }
        }
    }
}

impl RawDevice for MockSession {
    fn read_timeout(&mut self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, TransportError> {
        let result = self.wait_for_input(buf, timeout_ms);
        self.record(result)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let result = {
            let mut state = self.device.shared.state.lock();
            if state.disconnected {
                Err(TransportError::Disconnected)
            } else {
                state.written.push(data.to_vec());
                let echo = match state.loopback {
                    Loopback::Off => None,
                    Loopback::Echo => Some(data.to_vec()),
                    Loopback::StripReportId => Some(data.get(1..).unwrap_or(&[]).to_vec()),
                };
                if let Some(report) = echo {
                    state.input.push_back(report);
                    self.device.shared.arrived.notify_all();
                }
                Ok(data.len())
            }
        };
        self.record(result)
    }

    fn get_feature_report(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let result = {
            let state = self.device.shared.state.lock();
            let id = buf.first().copied().unwrap_or(0);
            if state.disconnected {
                Err(TransportError::Disconnected)
            } else if let Some(report) = state.feature_reports.get(&id) {
                let n = report.len().min(buf.len());
                buf[..n].copy_from_slice(&report[..n]);
                Ok(n)
            } else {
                Err(TransportError::Backend(format!(
                    "feature report 0x{id:02X} not supported"
                )))
            }
        };
        self.record(result)
    }

    fn send_feature_report(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let result = {
            let mut state = self.device.shared.state.lock();
            if state.disconnected {
                Err(TransportError::Disconnected)
            } else if let Some(&id) = data.first() {
                state.feature_reports.insert(id, data.to_vec());
                Ok(data.len())
            } else {
                Err(TransportError::Backend("empty feature report".into()))
            }
        };
        self.record(result)
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> Result<(), TransportError> {
        let reject = self.device.shared.state.lock().reject_nonblocking;
        let result = if reject {
            Err(TransportError::Backend(format!(
                "device refused nonblocking={nonblocking}"
            )))
        } else {
            Ok(())
        };
        self.record(result)
    }

    fn get_string(&mut self, query: StringQuery) -> Result<String, TransportError> {
        let result = {
            let state = self.device.shared.state.lock();
            let value = match query {
                StringQuery::Manufacturer => state.info.manufacturer_string.clone(),
                StringQuery::Product => state.info.product_string.clone(),
                StringQuery::SerialNumber => state.info.serial_number.clone(),
                StringQuery::Indexed(index) => state.indexed_strings.get(&index).cloned(),
            };
            if state.disconnected {
                Err(TransportError::Disconnected)
            } else {
                value.ok_or_else(|| TransportError::NotFound(format!("{query:?} string")))
            }
        };
        self.record(result)
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        let mut state = self.device.shared.state.lock();
        state.open_sessions = state.open_sessions.saturating_sub(1);
        debug!(
            "Mock session closed on {}",
            String::from_utf8_lossy(&state.info.path)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend_with(device: MockDevice) -> MockBackend {
        let backend = MockBackend::new();
        backend.attach(device);
        backend.init().unwrap();
        backend
    }

    #[test]
    fn test_requires_init() {
        let backend = MockBackend::new();
        backend.attach(MockDevice::new(1, 2));
        assert!(backend.enumerate(0, 0).is_err());
        backend.init().unwrap();
        assert_eq!(backend.enumerate(0, 0).unwrap().len(), 1);
    }

    #[test]
    fn test_timed_read_expires() {
        let backend = backend_with(MockDevice::new(1, 2));
        let mut session = backend.open(1, 2, None).unwrap();
        let mut buf = [0u8; 8];
        let start = Instant::now();
        assert_eq!(session.read_timeout(&mut buf, 30).unwrap(), 0);
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn test_blocked_read_wakes_on_push() {
        let device = MockDevice::new(1, 2);
        let backend = backend_with(device.clone());
        let mut session = backend.open(1, 2, None).unwrap();

        let pusher = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            device.push_input(&[0x01, 0xAA]);
        });

        let mut buf = [0u8; 8];
        assert_eq!(session.read_timeout(&mut buf, -1).unwrap(), 2);
        assert_eq!(&buf[..2], &[0x01, 0xAA]);
        pusher.join().unwrap();
    }

    #[test]
    fn test_session_count_tracks_drop() {
        let device = MockDevice::new(1, 2);
        let backend = backend_with(device.clone());
        let session = backend.open(1, 2, None).unwrap();
        assert_eq!(device.open_sessions(), 1);
        drop(session);
        assert_eq!(device.open_sessions(), 0);
    }

    #[test]
    fn test_detach_disconnects_session() {
        let device = MockDevice::new(1, 2).with_path("mock:detach");
        let backend = backend_with(device);
        let mut session = backend.open_path(b"mock:detach").unwrap();
        backend.detach(b"mock:detach");
        let mut buf = [0u8; 4];
        assert!(matches!(
            session.read_timeout(&mut buf, 0),
            Err(TransportError::Disconnected)
        ));
        assert!(session.last_error().is_some());
        assert!(backend.enumerate(0, 0).unwrap().is_empty());
    }
}
