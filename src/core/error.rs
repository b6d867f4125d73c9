//! Error types for the content enumerator
//!
//! Empty ids, devices with no children and "no devices connected" are not
//! errors; they show up as empty results instead.

use thiserror::Error;

/// Main error type for device discovery and content enumeration
#[derive(Error, Debug)]
pub enum EnumError {
    /// COM library initialization failed
    #[error("COM initialization failed: {0}")]
    ComError(String),

    /// A provider call failed (connection lost, device removed, bad id, ...)
    #[error("{operation} failed: {message}")]
    Provider { operation: String, message: String },

    /// Access to the device was denied
    #[error("Access denied. Unlock the device and allow access from this computer.")]
    AccessDenied,

    /// The requested device id is not known to the provider
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// `next` was called on a cursor that is already exhausted, failed or closed
    #[error("Cursor over children of '{0}' is finished")]
    CursorFinished(String),

    /// Shutdown was requested while a pass was running
    #[error("Enumeration interrupted")]
    Interrupted,

    /// Windows API error
    #[cfg(windows)]
    #[error("Windows API error: {0}")]
    WindowsError(#[from] windows::core::Error),
}

impl EnumError {
    /// Build a provider error for the named operation
    pub fn provider(operation: impl Into<String>, message: impl std::fmt::Display) -> Self {
        EnumError::Provider {
            operation: operation.into(),
            message: message.to_string(),
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, EnumError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_message() {
        let err = EnumError::provider("EnumObjects", "device removed");
        assert_eq!(err.to_string(), "EnumObjects failed: device removed");
    }

    #[test]
    fn test_cursor_finished_names_parent() {
        let err = EnumError::CursorFinished("o1A".to_string());
        assert!(err.to_string().contains("o1A"));
    }
}
