//! Crate-wide error taxonomy
//!
//! Resolution failures are fatal to the operation that raised them;
//! everything on the ingestion path is recoverable and must never tear
//! down a broker session.

use crate::config::ConfigError;
use crate::map::DecodeError;
use crate::protocol::FirmwareVariant;
use crate::transport::mqtt::MqttError;
use thiserror::Error;

/// Errors surfaced by identity resolution, command dispatch, and the
/// consumer pull API.
#[derive(Debug, Error)]
pub enum VacuumError {
    #[error("vacuum not found: {0}")]
    NotFound(String),

    #[error("device {device_id} maps to {count} vacuum entities")]
    AmbiguousTarget { device_id: String, count: usize },

    #[error("not supported on {firmware:?} firmware: {message}")]
    UnsupportedFirmware {
        firmware: FirmwareVariant,
        message: String,
    },

    #[error("map decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("transport error: {0}")]
    Transport(#[from] MqttError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// No valid reading exists yet, or the session is down. Consumers see
    /// this instead of a stale snapshot served silently.
    #[error("vacuum {0} is unavailable")]
    Unavailable(String),
}

impl VacuumError {
    pub fn not_found<S: Into<String>>(target: S) -> Self {
        Self::NotFound(target.into())
    }

    pub fn unavailable<S: Into<String>>(vacuum: S) -> Self {
        Self::Unavailable(vacuum.into())
    }

    pub fn unsupported_firmware<S: Into<String>>(firmware: FirmwareVariant, message: S) -> Self {
        Self::UnsupportedFirmware {
            firmware,
            message: message.into(),
        }
    }
}

/// Result type for vacuum operations.
pub type VacuumResult<T> = Result<T, VacuumError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats() {
        let err = VacuumError::not_found("vacuum.kitchen");
        assert_eq!(err.to_string(), "vacuum not found: vacuum.kitchen");

        let err = VacuumError::AmbiguousTarget {
            device_id: "dev-1".to_string(),
            count: 2,
        };
        assert_eq!(err.to_string(), "device dev-1 maps to 2 vacuum entities");

        let err = VacuumError::unavailable("tango");
        assert_eq!(err.to_string(), "vacuum tango is unavailable");
    }

    #[test]
    fn decode_error_converts() {
        let err: VacuumError = DecodeError::Truncated.into();
        assert!(matches!(err, VacuumError::Decode(DecodeError::Truncated)));
    }
}
