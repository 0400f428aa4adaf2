//! Error types for id generation and parsing

use crate::id_type::IdType;
use thiserror::Error;

/// Result type for id operations
pub type IdResult<T> = Result<T, IdError>;

/// Errors raised while minting or parsing identifiers.
///
/// Validation outcomes (an uncorrelated id, a mismatched pair) are *not*
/// errors; see [`crate::validator::ConsistencyCheck`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// A derived id was requested without the context it must embed.
    #[error("Missing correlation context for {id_type} id: {field} is required")]
    MissingCorrelationContext {
        id_type: IdType,
        field: &'static str,
    },

    /// A root id (user, thread) was requested with a parent.
    #[error("Unexpected parent for root {id_type} id")]
    UnexpectedParent { id_type: IdType },

    /// A value to embed is empty, too long, or outside the allowed charset.
    #[error("Invalid {field} segment: {details}")]
    InvalidSegment {
        field: &'static str,
        details: String,
    },

    /// A string does not follow the id layout.
    #[error("Invalid ID format: {0}")]
    InvalidFormat(String),

    /// Generator configuration is out of range.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl IdError {
    /// True for errors caused by the caller omitting required context.
    ///
    /// These indicate a programming error upstream and must not be retried.
    pub fn is_missing_context(&self) -> bool {
        matches!(self, IdError::MissingCorrelationContext { .. })
    }
}
