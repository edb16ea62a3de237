//! Errors for values that cannot be constructed.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// A value was rejected before reaching any store: a malformed rule table, an
/// unparsable identifier or setting. Adapter and IO failures have their own types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
