//! hidapi adapter
//!
//! Wraps the `hidapi` crate, which already covers hidraw/libusb on Linux,
//! IOHIDManager on macOS and the Windows HID stack.

use std::ffi::CString;

use hidapi::{HidApi, HidDevice};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::TransportError;
use crate::types::{BusType, RawDeviceInfo, StringQuery};
use crate::{Backend, RawDevice};

#[cfg(target_os = "linux")]
const PLATFORM: &str = "hidapi (linux)";
#[cfg(target_os = "macos")]
const PLATFORM: &str = "hidapi (IOHIDManager)";
#[cfg(target_os = "windows")]
const PLATFORM: &str = "hidapi (windows)";
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
const PLATFORM: &str = "hidapi";

/// Backend built on a shared `HidApi` context
pub struct HidapiBackend {
    api: Mutex<Option<HidApi>>,
}

impl Default for HidapiBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HidapiBackend {
    pub fn new() -> Self {
        Self {
            api: Mutex::new(None),
        }
    }

    fn with_api<T>(
        &self,
        f: impl FnOnce(&mut HidApi) -> Result<T, TransportError>,
    ) -> Result<T, TransportError> {
        let mut guard = self.api.lock();
        let api = guard
            .as_mut()
            .ok_or_else(|| TransportError::Backend("hidapi context not initialized".into()))?;
        f(api)
    }
}

fn bus_type(info: &hidapi::DeviceInfo) -> BusType {
    match info.bus_type() {
        hidapi::BusType::Usb => BusType::Usb,
        hidapi::BusType::Bluetooth => BusType::Bluetooth,
        hidapi::BusType::I2c => BusType::I2c,
        hidapi::BusType::Spi => BusType::Spi,
        _ => BusType::Unknown,
    }
}

fn convert_info(info: &hidapi::DeviceInfo) -> RawDeviceInfo {
    RawDeviceInfo {
        path: info.path().to_bytes().to_vec(),
        vendor_id: info.vendor_id(),
        product_id: info.product_id(),
        serial_number: info.serial_number().map(str::to_owned),
        release_number: info.release_number(),
        manufacturer_string: info.manufacturer_string().map(str::to_owned),
        product_string: info.product_string().map(str::to_owned),
        usage_page: info.usage_page(),
        usage: info.usage(),
        interface_number: info.interface_number(),
        bus_type: bus_type(info),
    }
}

impl Backend for HidapiBackend {
    fn name(&self) -> &str {
        "hidapi"
    }

    fn location(&self) -> String {
        PLATFORM.to_string()
    }

    fn init(&self) -> Result<(), TransportError> {
        let mut guard = self.api.lock();
        if guard.is_none() {
            *guard = Some(HidApi::new_without_enumerate()?);
            debug!("hidapi context created");
        }
        Ok(())
    }

    fn exit(&self) -> Result<(), TransportError> {
        // Dropping the context releases hidapi's global state
        self.api.lock().take();
        debug!("hidapi context released");
        Ok(())
    }

    fn enumerate(
        &self,
        vendor_id: u16,
        product_id: u16,
    ) -> Result<Vec<RawDeviceInfo>, TransportError> {
        self.with_api(|api| {
            api.refresh_devices()?;
            Ok(api
                .device_list()
                .map(convert_info)
                .filter(|info| info.matches(vendor_id, product_id))
                .collect())
        })
    }

    fn open(
        &self,
        vendor_id: u16,
        product_id: u16,
        serial_number: Option<&str>,
    ) -> Result<Box<dyn RawDevice>, TransportError> {
        self.with_api(|api| {
            let device = match serial_number {
                Some(sn) => api.open_serial(vendor_id, product_id, sn)?,
                None => api.open(vendor_id, product_id)?,
            };
            Ok(Box::new(HidapiDevice::new(device)) as Box<dyn RawDevice>)
        })
    }

    fn open_path(&self, path: &[u8]) -> Result<Box<dyn RawDevice>, TransportError> {
        let c_path = CString::new(path)
            .map_err(|_| TransportError::NotFound("path contains a NUL byte".into()))?;
        self.with_api(|api| {
            let device = api.open_path(&c_path)?;
            Ok(Box::new(HidapiDevice::new(device)) as Box<dyn RawDevice>)
        })
    }
}

/// One open hidapi session
struct HidapiDevice {
    device: HidDevice,
    last_error: Option<String>,
}

impl HidapiDevice {
    fn new(device: HidDevice) -> Self {
        Self {
            device,
            last_error: None,
        }
    }

    fn record<T>(&mut self, result: hidapi::HidResult<T>) -> Result<T, TransportError> {
        result.map_err(|e| {
            self.last_error = Some(e.to_string());
            TransportError::from(e)
        })
    }
}

impl RawDevice for HidapiDevice {
    fn read_timeout(&mut self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, TransportError> {
        let result = self.device.read_timeout(buf, timeout_ms);
        self.record(result)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let result = self.device.write(data);
        self.record(result)
    }

    fn get_feature_report(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let result = self.device.get_feature_report(buf);
        self.record(result)
    }

    fn send_feature_report(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let result = self.device.send_feature_report(data);
        self.record(result).map(|()| data.len())
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> Result<(), TransportError> {
        let result = self.device.set_blocking_mode(!nonblocking);
        self.record(result)
    }

    fn get_string(&mut self, query: StringQuery) -> Result<String, TransportError> {
        let result = match query {
            StringQuery::Manufacturer => self.device.get_manufacturer_string(),
            StringQuery::Product => self.device.get_product_string(),
            StringQuery::SerialNumber => self.device.get_serial_number_string(),
            StringQuery::Indexed(index) => self.device.get_indexed_string(index),
        };
        self.record(result).map(Option::unwrap_or_default)
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }
}
