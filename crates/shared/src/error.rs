use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    Validation,
    Unavailable,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Problems with an inbound frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame is not a message envelope: {0}")]
    MalformedEnvelope(#[source] serde_json::Error),
    #[error("binary frames are not supported")]
    BinaryFrame,
    #[error("unknown message type {0:?}")]
    UnknownType(String),
    #[error("invalid payload for {kind}: {source}")]
    InvalidPayload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("session is no longer part of its presentation")]
    Detached,
}

impl ProtocolError {
    /// Whether the offending connection must be closed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::MalformedEnvelope(_)
                | ProtocolError::BinaryFrame
                | ProtocolError::Detached
        )
    }
}
