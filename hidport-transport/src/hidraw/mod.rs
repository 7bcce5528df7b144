//! Native Linux hidraw adapter
//!
//! Discovery walks sysfs; I/O goes straight to `/dev/hidrawN` with
//! `poll`/`read`/`write` and the feature-report ioctls.

mod descriptor;
mod device;
mod sysfs;

use std::path::PathBuf;

use tracing::debug;

pub use descriptor::top_level_usage;
pub use device::HidrawDevice;

use crate::error::TransportError;
use crate::types::RawDeviceInfo;
use crate::{Backend, RawDevice};

/// Backend reading `/sys/class/hidraw` and opening `/dev/hidrawN`
pub struct HidrawBackend {
    class_root: PathBuf,
    dev_root: PathBuf,
}

impl Default for HidrawBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HidrawBackend {
    pub fn new() -> Self {
        Self::with_roots(sysfs::SYSFS_HIDRAW, "/dev")
    }

    /// Backend over an alternate sysfs class directory and device directory
    pub fn with_roots(class_root: impl Into<PathBuf>, dev_root: impl Into<PathBuf>) -> Self {
        Self {
            class_root: class_root.into(),
            dev_root: dev_root.into(),
        }
    }

    fn scan(&self) -> Result<Vec<RawDeviceInfo>, TransportError> {
        sysfs::scan(&self.class_root, &self.dev_root).map_err(TransportError::from_os)
    }
}

impl Backend for HidrawBackend {
    fn name(&self) -> &str {
        "hidraw"
    }

    fn location(&self) -> String {
        self.class_root.display().to_string()
    }

    fn init(&self) -> Result<(), TransportError> {
        if !self.class_root.is_dir() {
            return Err(TransportError::Unsupported(format!(
                "{} not available (hidraw driver not loaded?)",
                self.class_root.display()
            )));
        }
        Ok(())
    }

    fn exit(&self) -> Result<(), TransportError> {
        Ok(())
    }

    fn enumerate(
        &self,
        vendor_id: u16,
        product_id: u16,
    ) -> Result<Vec<RawDeviceInfo>, TransportError> {
        let mut devices = self.scan()?;
        devices.retain(|d| d.matches(vendor_id, product_id));
        Ok(devices)
    }

    fn open(
        &self,
        vendor_id: u16,
        product_id: u16,
        serial_number: Option<&str>,
    ) -> Result<Box<dyn RawDevice>, TransportError> {
        let info = self
            .scan()?
            .into_iter()
            .find(|d| {
                d.vendor_id == vendor_id
                    && d.product_id == product_id
                    && serial_number.map_or(true, |sn| d.serial_number.as_deref() == Some(sn))
            })
            .ok_or_else(|| {
                TransportError::NotFound(format!("{vendor_id:04X}:{product_id:04X}"))
            })?;
        debug!(
            "Resolved {:04X}:{:04X} to {}",
            vendor_id,
            product_id,
            String::from_utf8_lossy(&info.path)
        );
        Ok(Box::new(HidrawDevice::open(info)?))
    }

    fn open_path(&self, path: &[u8]) -> Result<Box<dyn RawDevice>, TransportError> {
        // Pick up the sysfs strings when the node is known; raw paths outside
        // the class directory still open but report empty strings
        let info = self
            .scan()
            .unwrap_or_default()
            .into_iter()
            .find(|d| d.path == path)
            .unwrap_or_else(|| RawDeviceInfo {
                path: path.to_vec(),
                interface_number: -1,
                ..Default::default()
            });
        Ok(Box::new(HidrawDevice::open(info)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BusType, StringQuery};
    use std::fs;
    use std::os::unix::fs::symlink;
    use std::path::Path;

    // Usage Page (Generic Desktop), Usage (Keyboard), Collection (Application)
    const KEYBOARD_DESC: &[u8] = &[0x05, 0x01, 0x09, 0x06, 0xA1, 0x01, 0xC0];
    // Usage Page (Vendor 0xFFFF), Usage (0x02), Collection (Application)
    const VENDOR_DESC: &[u8] = &[0x06, 0xFF, 0xFF, 0x09, 0x02, 0xA1, 0x01, 0xC0];

    /// sysfs + /dev lookalike for one USB keyboard with two HID interfaces
    struct Fixture {
        root: PathBuf,
    }

    impl Fixture {
        fn composite(tag: &str) -> Self {
            let root = std::env::temp_dir().join(format!(
                "hidport-hidraw-{tag}-{}",
                std::process::id()
            ));
            let _ = fs::remove_dir_all(&root);

            let usb = root.join("sys/devices/pci0000:00/usb1/1-4");
            fs::create_dir_all(&usb).unwrap();
            fs::write(usb.join("manufacturer"), "MonsGeek\n").unwrap();
            fs::write(usb.join("product"), "M1 V5 HE\n").unwrap();
            fs::write(usb.join("serial"), "KB-0001\n").unwrap();
            fs::write(usb.join("bcdDevice"), "0105\n").unwrap();

            fs::create_dir_all(root.join("class")).unwrap();
            fs::create_dir_all(root.join("dev")).unwrap();

            for (n, desc) in [(0u8, KEYBOARD_DESC), (1, VENDOR_DESC)] {
                let intf = usb.join(format!("1-4:1.{n}"));
                let hid = intf.join(format!("0003:3151:4015.000{}", n + 1));
                fs::create_dir_all(&hid).unwrap();
                fs::write(intf.join("bInterfaceNumber"), format!("{n:02x}\n")).unwrap();
                fs::write(
                    hid.join("uevent"),
                    "DRIVER=hid-generic\n\
                     HID_ID=0003:00003151:00004015\n\
                     HID_NAME=MonsGeek Keyboard\n\
                     HID_UNIQ=\n",
                )
                .unwrap();
                fs::write(hid.join("report_descriptor"), desc).unwrap();

                let class_entry = root.join(format!("class/hidraw{n}"));
                fs::create_dir_all(&class_entry).unwrap();
                symlink(&hid, class_entry.join("device")).unwrap();

                // Regular files stand in for the character devices
                fs::write(root.join(format!("dev/hidraw{n}")), b"").unwrap();
            }

            Self { root }
        }

        fn class_root(&self) -> PathBuf {
            self.root.join("class")
        }

        fn dev_node(&self, n: u8) -> PathBuf {
            self.root.join(format!("dev/hidraw{n}"))
        }

        fn backend(&self) -> HidrawBackend {
            HidrawBackend::with_roots(self.class_root(), self.root.join("dev"))
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.root);
        }
    }

    fn path_bytes(path: &Path) -> Vec<u8> {
        path.as_os_str().as_encoded_bytes().to_vec()
    }

    #[test]
    fn test_scan_composite_device() {
        let fx = Fixture::composite("scan");
        let devices = sysfs::scan(&fx.class_root(), &fx.root.join("dev")).unwrap();
        assert_eq!(devices.len(), 2);

        for (n, dev) in devices.iter().enumerate() {
            assert_eq!(dev.path, path_bytes(&fx.dev_node(n as u8)));
            assert_eq!((dev.vendor_id, dev.product_id), (0x3151, 0x4015));
            assert_eq!(dev.interface_number, n as i32);
            assert_eq!(dev.release_number, 0x0105);
            assert_eq!(dev.bus_type, BusType::Usb);
            assert_eq!(dev.manufacturer_string.as_deref(), Some("MonsGeek"));
            // USB device attributes win over HID_NAME / HID_UNIQ
            assert_eq!(dev.product_string.as_deref(), Some("M1 V5 HE"));
            assert_eq!(dev.serial_number.as_deref(), Some("KB-0001"));
        }
        assert_eq!((devices[0].usage_page, devices[0].usage), (0x0001, 0x0006));
        assert_eq!((devices[1].usage_page, devices[1].usage), (0xFFFF, 0x0002));
    }

    #[test]
    fn test_scan_skips_entries_without_uevent() {
        let fx = Fixture::composite("broken");
        fs::create_dir_all(fx.class_root().join("hidraw9")).unwrap();
        fs::create_dir_all(fx.class_root().join("not-hidraw")).unwrap();
        let devices = sysfs::scan(&fx.class_root(), &fx.root.join("dev")).unwrap();
        assert_eq!(devices.len(), 2);
    }

    #[test]
    fn test_backend_enumerate_and_open() {
        let fx = Fixture::composite("backend");
        let backend = fx.backend();
        backend.init().unwrap();
        assert_eq!(backend.location(), fx.class_root().display().to_string());

        assert_eq!(backend.enumerate(0x3151, 0x4015).unwrap().len(), 2);
        assert!(backend.enumerate(0x3151, 0x5030).unwrap().is_empty());

        let mut dev = backend.open(0x3151, 0x4015, Some("KB-0001")).unwrap();
        assert_eq!(dev.get_string(StringQuery::Product).unwrap(), "M1 V5 HE");
        assert!(dev.get_string(StringQuery::Indexed(3)).is_err());
        assert!(dev.last_error().is_some());

        assert!(matches!(
            backend.open(0x3151, 0x4015, Some("KB-0002")),
            Err(TransportError::NotFound(_))
        ));
    }

    #[test]
    fn test_open_path_outside_sysfs() {
        let fx = Fixture::composite("path");
        let backend = fx.backend();

        let known = path_bytes(&fx.dev_node(1));
        let mut dev = backend.open_path(&known).unwrap();
        assert_eq!(dev.get_string(StringQuery::SerialNumber).unwrap(), "KB-0001");

        // An existing node sysfs does not know about opens with empty strings
        let stray = fx.root.join("dev/hidraw-extra");
        fs::write(&stray, b"").unwrap();
        let mut dev = backend.open_path(&path_bytes(&stray)).unwrap();
        assert_eq!(dev.get_string(StringQuery::Manufacturer).unwrap(), "");

        let missing = path_bytes(&fx.root.join("dev/hidraw42"));
        assert!(backend.open_path(&missing).is_err());
    }

    #[test]
    fn test_init_requires_class_dir() {
        let backend = HidrawBackend::with_roots("/nonexistent/class/hidraw", "/dev");
        assert!(matches!(backend.init(), Err(TransportError::Unsupported(_))));
    }
}
