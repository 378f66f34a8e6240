//! Error types for the depth observer

use std::io;

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised while folding a single update event into the book
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FoldError {
    #[error("Invalid update event (price={price}, volume={volume}): {reason}")]
    InvalidEvent {
        price: Decimal,
        volume: Decimal,
        reason: &'static str,
    },

    #[error("Unsupported update kind code: {0}")]
    UnsupportedUpdateKind(u8),
}

impl FoldError {
    /// Whether the error invalidates the whole book rather than a single event
    pub fn is_fatal(&self) -> bool {
        matches!(self, FoldError::UnsupportedUpdateKind(_))
    }
}

/// Feed session and transport errors
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to connect to {address}: {message}")]
    Connect { address: String, message: String },

    #[error("Transport error ({kind:?}): {message}")]
    Transport { kind: io::ErrorKind, message: String },

    #[error("Failed to decode frame: {0}")]
    Decode(String),

    #[error("Failed to encode frame: {0}")]
    Encode(String),

    #[error("Frame of {len} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Fold(#[from] FoldError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Session already started")]
    SessionAlreadyStarted,

    #[error("Session already closed")]
    SessionClosed,

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Max reconnection attempts exceeded")]
    MaxReconnectAttemptsExceeded,
}

impl FeedError {
    /// Socket-level failures that end the session without faulting it.
    ///
    /// The caller may simply reconnect after one of these.
    pub fn is_recoverable_transport(&self) -> bool {
        match self {
            FeedError::Transport { kind, .. } => matches!(
                kind,
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }

    /// The io error kind behind a transport failure
    pub fn transport_kind(&self) -> Option<io::ErrorKind> {
        match self {
            FeedError::Transport { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<io::Error> for FeedError {
    fn from(err: io::Error) -> Self {
        FeedError::Transport {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<rmp_serde::decode::Error> for FeedError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        FeedError::Decode(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for FeedError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        FeedError::Encode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fold_error_fatality() {
        let invalid = FoldError::InvalidEvent {
            price: dec!(100),
            volume: dec!(0),
            reason: "zero volume",
        };
        assert!(!invalid.is_fatal());
        assert!(FoldError::UnsupportedUpdateKind(99).is_fatal());
    }

    #[test]
    fn test_reset_is_recoverable() {
        let err = FeedError::from(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(err.is_recoverable_transport());
        assert_eq!(err.transport_kind(), Some(io::ErrorKind::ConnectionReset));

        let refused = FeedError::from(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        assert!(!refused.is_recoverable_transport());
        assert!(!FeedError::Protocol("bad".to_string()).is_recoverable_transport());
    }

    #[test]
    fn test_display_includes_code() {
        let err = FeedError::from(FoldError::UnsupportedUpdateKind(42));
        assert!(err.to_string().contains("42"));
    }
}
