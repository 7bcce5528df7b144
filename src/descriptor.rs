//! Enumeration result value type

use std::fmt;

use hidport_transport::{BusType, RawDeviceInfo};
use serde::{Serialize, Serializer};

/// Snapshot of one attached HID interface
///
/// Produced only by enumeration. Holds no reference to the backend or to
/// any open handle; two enumerations yield independent values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceDescriptor {
    /// Platform device locator, usable with `open_path`
    #[serde(serialize_with = "serialize_path")]
    pub path: Vec<u8>,
    pub vendor_id: u16,
    pub product_id: u16,
    pub serial_number: String,
    /// BCD-encoded device release
    pub release_number: u16,
    pub manufacturer_string: String,
    pub product_string: String,
    pub usage_page: u16,
    pub usage: u16,
    /// -1 when the transport has no interface numbers (e.g. Bluetooth)
    pub interface_number: i32,
    pub bus_type: BusType,
}

fn serialize_path<S: Serializer>(path: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&String::from_utf8_lossy(path))
}

impl DeviceDescriptor {
    /// Path rendered for display (invalid UTF-8 replaced)
    pub fn path_lossy(&self) -> String {
        String::from_utf8_lossy(&self.path).into_owned()
    }
}

impl From<RawDeviceInfo> for DeviceDescriptor {
    fn from(info: RawDeviceInfo) -> Self {
        Self {
            path: info.path,
            vendor_id: info.vendor_id,
            product_id: info.product_id,
            serial_number: info.serial_number.unwrap_or_default(),
            release_number: info.release_number,
            manufacturer_string: info.manufacturer_string.unwrap_or_default(),
            product_string: info.product_string.unwrap_or_default(),
            usage_page: info.usage_page,
            usage: info.usage,
            interface_number: info.interface_number,
            bus_type: info.bus_type,
        }
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "path:                \"{}\"", self.path_lossy())?;
        writeln!(f, "vendor_id:           0x{:04x}", self.vendor_id)?;
        writeln!(f, "product_id:          0x{:04x}", self.product_id)?;
        writeln!(f, "serial_number:       \"{}\"", self.serial_number)?;
        writeln!(f, "release_number:      0x{:04x}", self.release_number)?;
        writeln!(f, "manufacturer_string: \"{}\"", self.manufacturer_string)?;
        writeln!(f, "product_string:      \"{}\"", self.product_string)?;
        writeln!(f, "usage_page:          {}", self.usage_page)?;
        writeln!(f, "usage:               {}", self.usage)?;
        write!(f, "interface_number:    {}", self.interface_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DeviceDescriptor {
        DeviceDescriptor::from(RawDeviceInfo {
            path: b"/dev/hidraw2".to_vec(),
            vendor_id: 0x046D,
            product_id: 0xC52B,
            serial_number: None,
            release_number: 0x1211,
            manufacturer_string: Some("Logitech".into()),
            product_string: Some("USB Receiver".into()),
            usage_page: 0xFF00,
            usage: 1,
            interface_number: 2,
            bus_type: BusType::Usb,
        })
    }

    #[test]
    fn test_missing_strings_become_empty() {
        let desc = sample();
        assert_eq!(desc.serial_number, "");
        assert_eq!(desc.manufacturer_string, "Logitech");
    }

    #[test]
    fn test_display_block() {
        let text = sample().to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[0], "path:                \"/dev/hidraw2\"");
        assert_eq!(lines[1], "vendor_id:           0x046d");
        assert_eq!(lines[4], "release_number:      0x1211");
        assert_eq!(lines[7], "usage_page:          65280");
        assert_eq!(lines[9], "interface_number:    2");
    }

    #[test]
    fn test_json_path_is_string() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["path"], "/dev/hidraw2");
        assert_eq!(json["bus_type"], "usb");
        assert_eq!(json["vendor_id"], 0x046D);
    }
}
