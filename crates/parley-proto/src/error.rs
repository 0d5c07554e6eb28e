//! Error types for the parley protocol library.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Errors raised while building or parsing protocol values.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The input was empty after trimming.
    #[error("empty address")]
    EmptyAddress,

    /// The input could not be parsed as `[node@]domain[/resource]`.
    #[error("invalid address {input:?}: {reason}")]
    InvalidAddress {
        /// The rejected input.
        input: String,
        /// What was wrong with it.
        reason: &'static str,
    },

    /// A bare address was required but a resource was present.
    #[error("unexpected resource in bare address {0:?}")]
    UnexpectedResource(String),
}

impl ProtocolError {
    pub(crate) fn invalid(input: &str, reason: &'static str) -> Self {
        Self::InvalidAddress {
            input: input.to_string(),
            reason,
        }
    }
}
