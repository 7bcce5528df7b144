//! Error types for HID operations

use thiserror::Error;

/// Every failure surfaced by the access layer
///
/// Variants are the error kinds callers branch on; the carried string is
/// the transport's description of what went wrong.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HidError {
    #[error("HID library not initialized")]
    NotInitialized,

    #[error("HID backend initialization failed: {0}")]
    InitError(String),

    #[error("HID backend shutdown failed: {0}")]
    ShutdownError(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Invalid handle: device is closed")]
    InvalidHandle,

    #[error("Read failed: {0}")]
    ReadError(String),

    #[error("Write failed: {0}")]
    WriteError(String),

    #[error("Feature report failed: {0}")]
    FeatureReportError(String),

    #[error("String query failed: {0}")]
    StringQueryError(String),

    #[error("Nonblocking mode change rejected: {0}")]
    ModeError(String),

    #[error("Enumeration failed: {0}")]
    EnumerationError(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, HidError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_distinguishable() {
        let err = HidError::ReadError("Device disconnected".into());
        assert!(matches!(err, HidError::ReadError(_)));
        assert_ne!(err, HidError::InvalidHandle);
        assert_eq!(err.to_string(), "Read failed: Device disconnected");
    }
}
