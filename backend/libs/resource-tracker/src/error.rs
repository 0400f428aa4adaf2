//! Error types for resource tracking

use crate::record::ResourceState;
use id_correlation::IdError;
use thiserror::Error;

/// Result type for tracker operations
pub type TrackerResult<T> = Result<T, TrackerError>;

/// Resource tracking errors
///
/// Leaks are not errors; they are reported as [`crate::LeakEvent`] values.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Id could not be minted
    #[error("Id error: {0}")]
    Id(#[from] IdError),

    /// A record with this id is already tracked
    #[error("Resource already registered: {0}")]
    DuplicateResource(String),

    /// The resource id does not embed the parent it is registered under
    #[error("Resource {resource_id} is not correlated with parent {parent_id}")]
    UncorrelatedResource {
        resource_id: String,
        parent_id: String,
    },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid state transition for {resource_id}: {from} -> {to}")]
    InvalidTransition {
        resource_id: String,
        from: ResourceState,
        to: ResourceState,
    },

    /// Downstream connection could not be opened
    #[error("Connection failed for {client_id}: {source}")]
    Connect {
        client_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),
}
