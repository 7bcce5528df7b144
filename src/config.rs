//! Library configuration
//!
//! Loaded from TOML (file named by `HIDPORT_CONFIG`), with `HIDPORT_BACKEND`
//! taking precedence for the backend choice:
//!
//! ```toml
//! backend = "hidraw"
//! string_capacity = 256
//! read_slice_ms = 50
//! ```

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{HidError, Result};

/// Environment variable naming a TOML config file
pub const CONFIG_ENV: &str = "HIDPORT_CONFIG";
/// Environment variable overriding the backend choice
pub const BACKEND_ENV: &str = "HIDPORT_BACKEND";

/// Capacity (UTF-16 code units, terminator included) for string queries
pub const DEFAULT_STRING_CAPACITY: usize = 256;
/// Upper bound on how long a blocking read holds the handle at a time
pub const DEFAULT_READ_SLICE_MS: u64 = 50;

/// Which transport adapter to bind at init
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// hidapi when compiled in, otherwise native hidraw on Linux
    #[default]
    Auto,
    Hidapi,
    Hidraw,
    /// Empty simulated bus
    Mock,
}

impl FromStr for BackendKind {
    type Err = HidError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" | "" => Ok(Self::Auto),
            "hidapi" => Ok(Self::Hidapi),
            "hidraw" => Ok(Self::Hidraw),
            "mock" => Ok(Self::Mock),
            other => Err(HidError::Config(format!("unknown backend: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HidConfig {
    pub backend: BackendKind,
    pub string_capacity: usize,
    pub read_slice_ms: u64,
}

impl Default for HidConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Auto,
            string_capacity: DEFAULT_STRING_CAPACITY,
            read_slice_ms: DEFAULT_READ_SLICE_MS,
        }
    }
}

impl HidConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| HidError::Config(e.to_string()))?;
        config.validate()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| HidError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Build from `HIDPORT_CONFIG` / `HIDPORT_BACKEND`, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Ok(kind) = std::env::var(BACKEND_ENV) {
            config.backend = kind.parse()?;
        }
        Ok(config)
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_string_capacity(mut self, capacity: usize) -> Self {
        self.string_capacity = capacity;
        self
    }

    pub fn with_read_slice_ms(mut self, ms: u64) -> Self {
        self.read_slice_ms = ms;
        self
    }

    fn validate(self) -> Result<Self> {
        if self.string_capacity < 2 {
            return Err(HidError::Config(
                "string_capacity must leave room for at least one character".into(),
            ));
        }
        if self.read_slice_ms == 0 || self.read_slice_ms > i32::MAX as u64 {
            return Err(HidError::Config("read_slice_ms out of range".into()));
        }
        Ok(self)
    }
}
