//! Error types for ripple-protocols.

use std::time::Duration;

use thiserror::Error;

/// Result type for ripple-protocols operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while exchanging or propagating messages.
#[derive(Debug, Error)]
pub enum Error {
    /// No reply arrived before the attempt deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The message could not be delivered (peer unreachable, channel closed).
    #[error("transport error: {0}")]
    Transport(String),

    /// The peer answered with an explicit error body.
    #[error("request rejected with code {code}: {text}")]
    Rejected { code: u32, text: String },

    /// A body that could not be decoded into a known payload.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// A body whose `type` this node does not handle.
    #[error("unsupported message type: {0}")]
    NotSupported(String),

    /// The propagation queue has no consumers left.
    #[error("propagation queue closed")]
    QueueClosed,

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// The harness error code used when this error is reported to a peer.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::Transport(_) | Self::QueueClosed => ErrorCode::TemporarilyUnavailable,
            Self::Rejected { code, .. } => ErrorCode::from_code(*code),
            Self::Malformed(_) | Self::Serialization(_) => ErrorCode::MalformedRequest,
            Self::NotSupported(_) => ErrorCode::NotSupported,
        }
    }
}

/// Error codes understood by the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Timeout,
    NodeNotFound,
    NotSupported,
    TemporarilyUnavailable,
    MalformedRequest,
    Crash,
    Abort,
}

impl ErrorCode {
    /// Numeric code as carried in an `error` body.
    pub fn as_u32(self) -> u32 {
        match self {
            Self::Timeout => 0,
            Self::NodeNotFound => 1,
            Self::NotSupported => 10,
            Self::TemporarilyUnavailable => 11,
            Self::MalformedRequest => 12,
            Self::Crash => 13,
            Self::Abort => 14,
        }
    }

    /// Map a numeric code back; unknown codes are treated as a crash.
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Self::Timeout,
            1 => Self::NodeNotFound,
            10 => Self::NotSupported,
            11 => Self::TemporarilyUnavailable,
            12 => Self::MalformedRequest,
            14 => Self::Abort,
            _ => Self::Crash,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::NodeNotFound => write!(f, "node-not-found"),
            Self::NotSupported => write!(f, "not-supported"),
            Self::TemporarilyUnavailable => write!(f, "temporarily-unavailable"),
            Self::MalformedRequest => write!(f, "malformed-request"),
            Self::Crash => write!(f, "crash"),
            Self::Abort => write!(f, "abort"),
        }
    }
}
