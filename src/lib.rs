//! Correlated ids and the resources keyed by them
//!
//! Facade over the workspace libraries:
//! - [`id_correlation`]: mint, parse, and validate correlated ids
//! - [`resource_tracker`]: registry, lifecycle, and cleanup of id-keyed resources

pub mod logging;

pub use id_correlation;
pub use resource_tracker;

pub use id_correlation::{
    extract_parent, extract_service, is_consistent, is_valid_format, IdContext, IdGenerator,
    IdType,
};
pub use resource_tracker::{
    CleanupCoordinator, CleanupOutcome, CleanupRequest, ResourceRegistry, TrackerConfig,
};
