//! Failure taxonomy and the fallback result type.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Why a guarded call did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownstreamError {
    /// The breaker was open; the operation was not attempted.
    #[error("circuit '{name}' is open")]
    CircuitOpen { name: String },

    #[error("downstream call exceeded {0:?}")]
    Timeout(Duration),

    #[error("downstream call failed: {0}")]
    Thrown(String),
}

impl DownstreamError {
    /// Label used for the fallback metric.
    pub fn reason(&self) -> &'static str {
        match self {
            DownstreamError::CircuitOpen { .. } => "circuit_open",
            DownstreamError::Timeout(_) => "timeout",
            DownstreamError::Thrown(_) => "thrown",
        }
    }
}

/// Result returned by a fallback instead of the real value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceUnavailable {
    pub message: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl ServiceUnavailable {
    pub fn new(message: impl Into<String>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        Self {
            message: message.into(),
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_unavailable_shape() {
        let body = serde_json::to_value(ServiceUnavailable::new("indisponible")).unwrap();
        assert_eq!(body["message"], "indisponible");
        assert!(body["timestamp"].as_u64().unwrap() > 1_600_000_000_000);
    }
}
