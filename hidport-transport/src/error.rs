//! Transport error types

use thiserror::Error;

/// Errors reported by a transport adapter
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not supported: {0}")]
    Unsupported(String),
}

impl TransportError {
    /// Classify an OS error, folding disconnect-style errnos into `Disconnected`
    pub fn from_os(err: std::io::Error) -> Self {
        match err.raw_os_error() {
            // ENODEV / ENXIO / EIO are what hidraw returns once the device is unplugged
            Some(19) | Some(6) | Some(5) => TransportError::Disconnected,
            _ if err.kind() == std::io::ErrorKind::PermissionDenied => {
                TransportError::PermissionDenied(err.to_string())
            }
            _ => TransportError::Io(err),
        }
    }
}

#[cfg(feature = "hidapi")]
impl From<hidapi::HidError> for TransportError {
    fn from(e: hidapi::HidError) -> Self {
        let msg = e.to_string();
        if msg.contains("Permission denied") || msg.contains("EPERM") {
            TransportError::PermissionDenied(msg)
        } else {
            TransportError::Backend(msg)
        }
    }
}
