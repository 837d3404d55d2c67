// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the depth greenscreen
//!
//! Two families exist:
//! - [`DeviceError`]: everything the hardware side can report. Only
//!   [`DeviceError::Timeout`] is transient; every other variant is fatal for
//!   the session that raised it.
//! - [`ConfigError`]: settings persistence failures.
//!
//! [`EngineError`] joins both for engine construction from stored settings.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Hardware and session errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeviceError {
    /// The device has no sensor reporting a depth scale
    #[error("device does not have a depth sensor")]
    NoDepthSensor,
    /// The active stream set contains no depth stream
    #[error("no depth stream available")]
    NoDepthStream,
    /// Nothing besides depth is streaming, so there is nothing to align to
    #[error("no stream found to align with depth")]
    NoAlignableStream,
    /// No attached device carries the requested serial number
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    /// The device does not offer the requested color resolution
    #[error("device {serial} does not support {width}x{height}")]
    UnsupportedResolution {
        serial: String,
        width: u32,
        height: u32,
    },
    /// Starting the hardware pipeline failed
    #[error("failed to open pipeline: {0}")]
    OpenFailed(String),
    /// No frame set arrived in time
    #[error("timed out waiting for frames")]
    Timeout,
    /// The device went away while streaming
    #[error("device disconnected: {0}")]
    Disconnected(String),
    /// A previous reconfiguration failed and left the engine without a session
    #[error("no active device session")]
    NoActiveSession,
}

impl DeviceError {
    /// Whether the error only costs the current frame
    pub fn is_transient(&self) -> bool {
        matches!(self, DeviceError::Timeout)
    }
}

/// Errors from building an engine out of stored settings
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Settings persistence errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to serialize settings: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("failed to write settings file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no configuration directory available on this system")]
    NoConfigDir,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_timeout_is_transient() {
        assert!(DeviceError::Timeout.is_transient());
        assert!(!DeviceError::NoDepthStream.is_transient());
        assert!(!DeviceError::NoAlignableStream.is_transient());
        assert!(!DeviceError::Disconnected("usb".into()).is_transient());
        assert!(!DeviceError::NoActiveSession.is_transient());
    }

    #[test]
    fn test_display_names_the_device() {
        let err = DeviceError::UnsupportedResolution {
            serial: "1234".into(),
            width: 1920,
            height: 1080,
        };
        assert_eq!(err.to_string(), "device 1234 does not support 1920x1080");
    }
}
