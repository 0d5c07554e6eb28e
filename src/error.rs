//! Unified error handling for parleyd.
//!
//! Errors raised by persona operations flow back to the dispatcher, which
//! logs them against the event that failed and labels the failure metric
//! with [`RouterError::error_code`].

use parley_proto::ProtocolError;
use thiserror::Error;

use crate::store::StoreError;

/// Errors that can occur while handling an event for one persona.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("address error: {0}")]
    Address(#[from] ProtocolError),

    #[error("no such chat: {0}")]
    NoSuchChat(String),

    #[error("dispatcher is shut down")]
    DispatcherClosed,

    #[error("internal error: {0}")]
    Internal(String),
}

impl RouterError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Store(_) => "store",
            Self::Address(_) => "address",
            Self::NoSuchChat(_) => "no_such_chat",
            Self::DispatcherClosed => "dispatcher_closed",
            Self::Internal(_) => "internal_error",
        }
    }
}

/// Result type for persona operations and event handlers.
pub type RouterResult<T = ()> = Result<T, RouterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_keep_their_code() {
        let err: RouterError = StoreError::Unavailable("down".into()).into();
        assert_eq!(err.error_code(), "store");

        let err: RouterError = parley_proto::Address::parse("").unwrap_err().into();
        assert_eq!(err.error_code(), "address");
        assert_eq!(RouterError::NoSuchChat("t1".into()).to_string(), "no such chat: t1");
    }
}
