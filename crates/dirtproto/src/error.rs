//! Error surface of the command protocol.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::impl_wire;

/// The one error shape handlers return. Every failed response carries
/// exactly this; richer categorization lives in the message text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct ApiError {
    pub message: String,
}

impl_wire!(ApiError { message });

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for ApiError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for ApiError {
    fn from(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// Transport-layer failures, kept distinct from [`ApiError`]: an `ApiError`
/// means the remote handler ran and refused; a `TransportError` means the
/// exchange itself broke down.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Not connected")]
    NotConnected,
    #[error("Connection closed")]
    Closed,
    #[error("Timed out after {0}ms")]
    Timeout(u64),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Send failed: {0}")]
    Send(String),
}

impl From<crate::wire::WireError> for TransportError {
    fn from(err: crate::wire::WireError) -> Self {
        Self::Protocol(err.to_string())
    }
}
