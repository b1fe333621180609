//! ═══════════════════════════════════════════════════════════════════════════════
//! ERROR — Unified Error Type for Iso-Entropy
//! ═══════════════════════════════════════════════════════════════════════════════
//! Only malformed core-numeric input is fatal. Oracle failures and degenerate
//! searches are degraded to explicit verdicts by the orchestrator and never
//! reach the caller of `audit_system`.
//! ═══════════════════════════════════════════════════════════════════════════════

use std::fmt;

use crate::oracle::OracleError;

/// The unified error type for the iso-entropy crate
#[derive(Debug)]
pub enum IsoError {
    /// Negative, NaN or otherwise malformed numeric argument
    InvalidInput { field: String, message: String },
    /// Grounding label outside the enumerated set
    UnrecognizedCategory { kind: &'static str, value: String },
    /// Network/quota/credential failure from the decision oracle
    Oracle(OracleError),
    /// ORIENT phase with no remaining room to move K
    DegenerateSearch(String),
    /// Configuration error
    Config(ConfigError),
    /// I/O error (config file)
    Io(std::io::Error),
    /// JSON serialization/deserialization error
    Json(serde_json::Error),
}

impl IsoError {
    pub fn invalid_input(field: impl Into<String>, message: impl Into<String>) -> Self {
        IsoError::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::error::Error for IsoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IsoError::Io(e) => Some(e),
            IsoError::Json(e) => Some(e),
            IsoError::Oracle(e) => Some(e),
            IsoError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for IsoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsoError::InvalidInput { field, message } => {
                write!(f, "Invalid input for '{}': {}", field, message)
            }
            IsoError::UnrecognizedCategory { kind, value } => {
                write!(f, "Unrecognized {} category: '{}'", kind, value)
            }
            IsoError::Oracle(e) => write!(f, "Oracle error: {}", e),
            IsoError::DegenerateSearch(msg) => write!(f, "Degenerate K search: {}", msg),
            IsoError::Config(e) => write!(f, "Configuration error: {}", e),
            IsoError::Io(e) => write!(f, "I/O error: {}", e),
            IsoError::Json(e) => write!(f, "JSON error: {}", e),
        }
    }
}

impl From<std::io::Error> for IsoError {
    fn from(err: std::io::Error) -> Self {
        IsoError::Io(err)
    }
}

impl From<serde_json::Error> for IsoError {
    fn from(err: serde_json::Error) -> Self {
        IsoError::Json(err)
    }
}

impl From<OracleError> for IsoError {
    fn from(err: OracleError) -> Self {
        IsoError::Oracle(err)
    }
}

/// Configuration-specific errors
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// Invalid value
    InvalidValue { field: String, message: String },
    /// Unknown oracle provider name
    UnknownProvider(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidValue { field, message } => {
                write!(f, "Invalid value for '{}': {}", field, message)
            }
            ConfigError::UnknownProvider(name) => write!(f, "Unknown oracle provider: {}", name),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for IsoError {
    fn from(err: ConfigError) -> Self {
        IsoError::Config(err)
    }
}

/// Type alias for Result with IsoError
pub type IsoResult<T> = Result<T, IsoError>;

/// Reject negative or non-finite values for a named physical quantity.
pub(crate) fn ensure_non_negative(field: &str, value: f64) -> IsoResult<f64> {
    if !value.is_finite() {
        return Err(IsoError::invalid_input(field, format!("must be finite, got {}", value)));
    }
    if value < 0.0 {
        return Err(IsoError::invalid_input(field, format!("must be non-negative, got {}", value)));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IsoError::invalid_input("theta_max", "must be non-negative, got -1");
        assert!(err.to_string().contains("theta_max"));

        let err = IsoError::UnrecognizedCategory {
            kind: "volatility",
            value: "Extreme".to_string(),
        };
        assert!(err.to_string().contains("Extreme"));
        assert!(err.to_string().contains("volatility"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: IsoError = io_err.into();
        assert!(matches!(err, IsoError::Io(_)));
    }

    #[test]
    fn test_ensure_non_negative() {
        assert_eq!(ensure_non_negative("k", 0.0).ok(), Some(0.0));
        assert!(ensure_non_negative("k", -0.1).is_err());
        assert!(ensure_non_negative("k", f64::NAN).is_err());
        assert!(ensure_non_negative("k", f64::INFINITY).is_err());
    }
}
