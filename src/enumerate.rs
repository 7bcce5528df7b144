//! Device registry: discovery of attached HID interfaces

use tracing::debug;

use crate::descriptor::DeviceDescriptor;
use crate::error::{HidError, Result};
use crate::lifecycle::Library;

impl Library {
    /// List attached HID interfaces
    ///
    /// `0` for either ID matches any value. No match is an empty list, not
    /// an error. Each call returns fresh descriptors.
    pub fn enumerate(&self, vendor_id: u16, product_id: u16) -> Result<Vec<DeviceDescriptor>> {
        let (backend, _) = self.backend()?;
        let raw = backend
            .enumerate(vendor_id, product_id)
            .map_err(|e| HidError::EnumerationError(e.to_string()))?;

        let devices: Vec<DeviceDescriptor> = raw
            .into_iter()
            .filter(|info| info.matches(vendor_id, product_id))
            .map(DeviceDescriptor::from)
            .collect();

        debug!(
            "Enumerated {} device(s) for {:04X}:{:04X} via {}",
            devices.len(),
            vendor_id,
            product_id,
            backend.name()
        );
        Ok(devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hidport_transport::{MockBackend, MockDevice};
    use std::sync::Arc;

    #[test]
    fn test_enumerate_requires_init() {
        let lib = Library::with_backend(Arc::new(MockBackend::new()));
        assert_eq!(lib.enumerate(0, 0), Err(HidError::NotInitialized));
    }

    #[test]
    fn test_enumerate_filters_by_product() {
        let mock = Arc::new(MockBackend::new());
        mock.attach(MockDevice::new(0x3151, 0x4015));
        mock.attach(MockDevice::new(0x3151, 0x5030));
        let lib = Library::with_backend(mock);
        lib.init().unwrap();

        let all = lib.enumerate(0x3151, 0).unwrap();
        assert_eq!(all.len(), 2);
        let one = lib.enumerate(0x3151, 0x5030).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].product_id, 0x5030);
    }
}
