//! Error types for the gateway crate.

use std::path::PathBuf;

use gwtap_core::CapabilityError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid capabilities_override: {0}")]
    InvalidCapabilities(#[from] CapabilityError),
}

/// A sub-record of a dispatch payload that could not be normalized.
///
/// Never fatal: the offending sub-record is left as-is and its siblings are
/// still processed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed payload at {path}: {reason}")]
pub struct MalformedPayload {
    pub path: String,
    pub reason: &'static str,
}

impl MalformedPayload {
    pub fn new(path: impl Into<String>, reason: &'static str) -> Self {
        Self {
            path: path.into(),
            reason,
        }
    }
}

/// A replay log line that is not a valid frame.
#[derive(Debug, Error)]
#[error("replay line {line}: {source}")]
pub struct ReplayError {
    pub line: usize,
    #[source]
    pub source: serde_json::Error,
}
