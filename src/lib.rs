//! hidport - user-space HID device access
//!
//! Enumeration, device handles, and the report transfer protocol on top of
//! interchangeable transport adapters (hidapi, Linux hidraw, in-memory mock).
//!
//! ```no_run
//! hidport::init()?;
//! for dev in hidport::enumerate(0, 0)? {
//!     println!("{dev}");
//! }
//! let kbd = hidport::open(0x3151, 0x4015, None)?;
//! kbd.write(&[0x00, 0x8F])?;
//! let reply = kbd.read_timeout(64, 500)?;
//! # let _ = reply;
//! hidport::shutdown()?;
//! # Ok::<(), hidport::HidError>(())
//! ```

pub mod config;
pub mod descriptor;
pub mod device;
pub mod enumerate;
pub mod error;
pub mod lifecycle;
pub mod report;

pub use config::{BackendKind, HidConfig};
pub use descriptor::DeviceDescriptor;
pub use device::DeviceHandle;
pub use error::{HidError, Result};
pub use lifecycle::{global, Library};

pub use hidport_transport::{
    Backend, BusType, Loopback, MockBackend, MockDevice, RawDevice, RawDeviceInfo, StringQuery,
    TransportError,
};

/// Bind the process-wide backend
pub fn init() -> Result<()> {
    global().init()
}

/// Close every open handle and release the process-wide backend
pub fn shutdown() -> Result<()> {
    global().shutdown()
}

/// Enumerate through the process-wide library (`0` matches any ID)
pub fn enumerate(vendor_id: u16, product_id: u16) -> Result<Vec<DeviceDescriptor>> {
    global().enumerate(vendor_id, product_id)
}

/// Open by VID/PID and optional serial through the process-wide library
pub fn open(vendor_id: u16, product_id: u16, serial_number: Option<&str>) -> Result<DeviceHandle> {
    global().open(vendor_id, product_id, serial_number)
}

/// Open by path through the process-wide library
pub fn open_path(path: impl AsRef<[u8]>) -> Result<DeviceHandle> {
    global().open_path(path)
}
