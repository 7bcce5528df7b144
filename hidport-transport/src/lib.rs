//! Transport adapters for user-space HID access
//!
//! Every adapter presents the same two-level contract upward:
//!
//! - [`Backend`]: process-wide binding (init/exit), discovery, and opening
//! - [`RawDevice`]: one open device session performing raw report I/O
//!
//! ```text
//! [hidapi] [hidraw (Linux)] [mock]   ← implement Backend / RawDevice
//!                 |
//!        [hidport::Library]          ← lifecycle, handles, report rules
//! ```
//!
//! Adapters do no report-ID validation, truncation or retrying. Those rules
//! live one layer up.

pub mod error;
pub mod mock;
pub mod types;

#[cfg(feature = "hidapi")]
mod hidapi_backend;

#[cfg(all(target_os = "linux", feature = "hidraw"))]
pub mod hidraw;

pub use error::TransportError;
pub use mock::{Loopback, MockBackend, MockDevice};
pub use types::{BusType, RawDeviceInfo, StringQuery};

#[cfg(feature = "hidapi")]
pub use hidapi_backend::HidapiBackend;

#[cfg(all(target_os = "linux", feature = "hidraw"))]
pub use hidraw::HidrawBackend;

/// Process-wide transport binding
pub trait Backend: Send + Sync {
    /// Short identifier ("hidapi", "hidraw", "mock")
    fn name(&self) -> &str;

    /// Where the backend was bound from (library version, sysfs root, ...)
    fn location(&self) -> String;

    /// Prepare backend-global resources; called once per library init
    fn init(&self) -> Result<(), TransportError>;

    /// Release backend-global resources
    fn exit(&self) -> Result<(), TransportError>;

    /// Walk attached HID interfaces matching `vendor_id`/`product_id` (0 = any)
    fn enumerate(
        &self,
        vendor_id: u16,
        product_id: u16,
    ) -> Result<Vec<RawDeviceInfo>, TransportError>;

    /// Open the first interface matching VID/PID and, if given, serial number
    fn open(
        &self,
        vendor_id: u16,
        product_id: u16,
        serial_number: Option<&str>,
    ) -> Result<Box<dyn RawDevice>, TransportError>;

    /// Open an interface by its platform path
    fn open_path(&self, path: &[u8]) -> Result<Box<dyn RawDevice>, TransportError>;
}

/// An open device session
///
/// Dropping the box closes the underlying resource.
pub trait RawDevice: Send {
    /// Read one input report into `buf`
    ///
    /// `timeout_ms` of -1 blocks, 0 polls once, >0 waits up to that long.
    /// Returns `Ok(0)` when no report arrived.
    fn read_timeout(&mut self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, TransportError>;

    /// Send an output report (`data[0]` is the report ID)
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Fetch a feature report; `buf[0]` selects the report ID on entry
    fn get_feature_report(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Send a feature report (`data[0]` is the report ID)
    fn send_feature_report(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Switch the session's native read mode
    fn set_nonblocking(&mut self, nonblocking: bool) -> Result<(), TransportError>;

    /// Query a string descriptor
    fn get_string(&mut self, query: StringQuery) -> Result<String, TransportError>;

    /// Backend-provided description of the last failure, if any
    fn last_error(&self) -> Option<String>;
}
