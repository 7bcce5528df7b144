//! Common types for the transport layer

use serde::Serialize;

/// Underlying bus a HID interface is attached through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BusType {
    #[default]
    Unknown,
    Usb,
    Bluetooth,
    I2c,
    Spi,
}

impl BusType {
    /// Map a Linux `BUS_*` constant (as found in `HID_ID`) to a bus type
    pub fn from_linux_bus(bus: u16) -> Self {
        match bus {
            0x03 => BusType::Usb,
            0x05 => BusType::Bluetooth,
            0x18 => BusType::I2c,
            0x1C => BusType::Spi,
            _ => BusType::Unknown,
        }
    }
}

/// One HID interface as reported by a backend's discovery walk
///
/// Adapters build these by copying out of whatever native representation
/// the platform hands back; nothing here borrows backend memory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawDeviceInfo {
    /// Platform-specific device locator (e.g. `/dev/hidraw3`)
    pub path: Vec<u8>,
    pub vendor_id: u16,
    pub product_id: u16,
    pub serial_number: Option<String>,
    /// BCD device release number
    pub release_number: u16,
    pub manufacturer_string: Option<String>,
    pub product_string: Option<String>,
    /// Top-level collection usage page from the report descriptor
    pub usage_page: u16,
    /// Top-level collection usage from the report descriptor
    pub usage: u16,
    /// USB interface number, or -1 when the transport has none
    pub interface_number: i32,
    pub bus_type: BusType,
}

impl RawDeviceInfo {
    /// Check whether this record passes a VID/PID filter (0 matches any)
    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        (vendor_id == 0 || self.vendor_id == vendor_id)
            && (product_id == 0 || self.product_id == product_id)
    }
}

/// Which string descriptor to fetch from an open device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringQuery {
    Manufacturer,
    Product,
    SerialNumber,
    /// Arbitrary USB string descriptor index
    Indexed(i32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_wildcards() {
        let info = RawDeviceInfo {
            vendor_id: 0x046D,
            product_id: 0xC52B,
            ..Default::default()
        };
        assert!(info.matches(0, 0));
        assert!(info.matches(0x046D, 0));
        assert!(info.matches(0, 0xC52B));
        assert!(info.matches(0x046D, 0xC52B));
        assert!(!info.matches(0x046D, 0xC52C));
        assert!(!info.matches(0x1234, 0));
    }

    #[test]
    fn test_linux_bus_mapping() {
        assert_eq!(BusType::from_linux_bus(0x03), BusType::Usb);
        assert_eq!(BusType::from_linux_bus(0x05), BusType::Bluetooth);
        assert_eq!(BusType::from_linux_bus(0x18), BusType::I2c);
        assert_eq!(BusType::from_linux_bus(0x42), BusType::Unknown);
    }
}
