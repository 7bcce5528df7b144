//! hidraw discovery through sysfs
//!
//! Each `/sys/class/hidraw/hidrawN/device` links to the HID device node,
//! whose `uevent` carries `HID_ID=BBBB:VVVVVVVV:PPPPPPPP`. For USB devices
//! the parent is the USB interface and its parent the USB device, which
//! hold the string and release attributes.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::descriptor;
use crate::types::{BusType, RawDeviceInfo};

pub const SYSFS_HIDRAW: &str = "/sys/class/hidraw";

/// Fields of a HID device `uevent`
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Uevent {
    pub bus: u16,
    pub vendor_id: u16,
    pub product_id: u16,
    pub name: Option<String>,
    pub uniq: Option<String>,
}

/// Parse `HID_ID`, `HID_NAME` and `HID_UNIQ` from a uevent file
pub fn parse_uevent(text: &str) -> Option<Uevent> {
    let mut uevent = Uevent::default();
    let mut have_id = false;

    for line in text.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key {
            "HID_ID" => {
                let parts: Vec<&str> = value.split(':').collect();
                if parts.len() != 3 {
                    return None;
                }
                uevent.bus = u16::from_str_radix(parts[0], 16).ok()?;
                // VID/PID are printed as 8 hex digits; the high half is zero
                uevent.vendor_id = u32::from_str_radix(parts[1], 16).ok()? as u16;
                uevent.product_id = u32::from_str_radix(parts[2], 16).ok()? as u16;
                have_id = true;
            }
            "HID_NAME" => uevent.name = non_empty(value),
            "HID_UNIQ" => uevent.uniq = non_empty(value),
            _ => {}
        }
    }

    have_id.then_some(uevent)
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn read_attr(dir: &Path, name: &str) -> Option<String> {
    fs::read_to_string(dir.join(name))
        .ok()
        .and_then(|s| non_empty(&s))
}

fn read_hex_attr(dir: &Path, name: &str) -> Option<u32> {
    read_attr(dir, name).and_then(|s| u32::from_str_radix(&s, 16).ok())
}

/// Build the descriptor for one `hidrawN` class entry
pub fn probe(class_entry: &Path, dev_root: &Path) -> Option<RawDeviceInfo> {
    let node = class_entry.file_name()?.to_string_lossy().into_owned();
    let hid_dir: PathBuf = fs::canonicalize(class_entry.join("device")).ok()?;
    let uevent = parse_uevent(&fs::read_to_string(hid_dir.join("uevent")).ok()?)?;

    let (usage_page, usage) = fs::read(hid_dir.join("report_descriptor"))
        .map(|d| descriptor::top_level_usage(&d))
        .unwrap_or((0, 0));

    let bus_type = BusType::from_linux_bus(uevent.bus);
    let mut info = RawDeviceInfo {
        path: dev_root.join(&node).into_os_string().into_encoded_bytes(),
        vendor_id: uevent.vendor_id,
        product_id: uevent.product_id,
        serial_number: uevent.uniq.clone(),
        release_number: 0,
        manufacturer_string: None,
        product_string: uevent.name.clone(),
        usage_page,
        usage,
        interface_number: -1,
        bus_type,
    };

    if bus_type == BusType::Usb {
        // hid device -> usb interface -> usb device
        if let Some(intf_dir) = hid_dir.parent() {
            if let Some(n) = read_hex_attr(intf_dir, "bInterfaceNumber") {
                info.interface_number = n as i32;
            }
            if let Some(usb_dir) = intf_dir.parent() {
                info.manufacturer_string = read_attr(usb_dir, "manufacturer");
                if let Some(product) = read_attr(usb_dir, "product") {
                    info.product_string = Some(product);
                }
                if let Some(serial) = read_attr(usb_dir, "serial") {
                    info.serial_number = Some(serial);
                }
                if let Some(bcd) = read_hex_attr(usb_dir, "bcdDevice") {
                    info.release_number = bcd as u16;
                }
            }
        }
    }

    debug!(
        "hidraw {}: {:04X}:{:04X} bus={:?} page=0x{:04X} usage=0x{:04X} intf={}",
        node, info.vendor_id, info.product_id, bus_type, usage_page, usage, info.interface_number
    );
    Some(info)
}

/// Walk every hidraw node under `class_root`
pub fn scan(class_root: &Path, dev_root: &Path) -> std::io::Result<Vec<RawDeviceInfo>> {
    let mut entries: Vec<PathBuf> = fs::read_dir(class_root)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with("hidraw"))
        })
        .collect();
    entries.sort();

    Ok(entries
        .iter()
        .filter_map(|entry| probe(entry, dev_root))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_usb_uevent() {
        let text = "DRIVER=hid-generic\n\
                    HID_ID=0003:0000046D:0000C52B\n\
                    HID_NAME=Logitech USB Receiver\n\
                    HID_PHYS=usb-0000:00:14.0-2/input2\n\
                    HID_UNIQ=\n\
                    MODALIAS=hid:b0003g0000v0000046Dp0000C52B\n";
        let uevent = parse_uevent(text).unwrap();
        assert_eq!(uevent.bus, 0x0003);
        assert_eq!(uevent.vendor_id, 0x046D);
        assert_eq!(uevent.product_id, 0xC52B);
        assert_eq!(uevent.name.as_deref(), Some("Logitech USB Receiver"));
        assert_eq!(uevent.uniq, None);
    }

    #[test]
    fn test_parse_bluetooth_uevent() {
        let text = "HID_ID=0005:0000054C:000009CC\nHID_NAME=Wireless Controller\nHID_UNIQ=a4:53:85:12:34:56\n";
        let uevent = parse_uevent(text).unwrap();
        assert_eq!(BusType::from_linux_bus(uevent.bus), BusType::Bluetooth);
        assert_eq!(uevent.uniq.as_deref(), Some("a4:53:85:12:34:56"));
    }

    #[test]
    fn test_missing_hid_id() {
        assert_eq!(parse_uevent("HID_NAME=foo\n"), None);
        assert_eq!(parse_uevent("HID_ID=0003:zz:0000\n"), None);
    }

    #[test]
    fn test_scan_missing_root() {
        let result = scan(Path::new("/nonexistent/hidraw/root"), Path::new("/dev"));
        assert!(result.is_err());
    }
}
