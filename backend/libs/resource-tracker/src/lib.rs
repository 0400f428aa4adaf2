//! Resource Tracker
//!
//! Registry and lifecycle for resources keyed by correlated ids:
//!
//! ```text
//! minted → active → cleanup-requested → { reclaimed | leaked }
//! ```
//!
//! Factories mint an id derived from the parent the resource serves, register
//! it, and hand it out. Teardown goes through [`CleanupCoordinator`], which
//! validates the `(parent, resource)` pair before touching the registry. A
//! pair that does not belong together produces a [`LeakEvent`] and leaves the
//! resource in place instead of closing someone else's connection; the record
//! is flagged so aged or manual cleanup can still reach it.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use id_correlation::IdGenerator;
//! use resource_tracker::{CleanupCoordinator, ResourceRegistry, TrackerConfig, WebSocketConnectionFactory};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ResourceRegistry::new();
//! let coordinator = CleanupCoordinator::new(registry.clone(), &TrackerConfig::default());
//! let generator = Arc::new(IdGenerator::new());
//! let factory = WebSocketConnectionFactory::new(generator.clone(), coordinator);
//!
//! let thread_id = generator.generate_thread_id();
//! let handle = factory.open("alice", &thread_id).await?;
//!
//! let outcome = factory.close("alice", &thread_id, &handle.connection_id).await;
//! assert!(outcome.is_reclaimed());
//! assert!(registry.is_empty());
//! # Ok(())
//! # }
//! ```
//!
//! The registry is always injected; there is no process-wide instance.

pub mod cleanup;
pub mod config;
pub mod error;
pub mod factory;
pub mod record;
pub mod registry;
pub mod sweeper;

mod metrics;

pub use cleanup::{CleanupCoordinator, CleanupOutcome, CleanupRequest, LeakEvent, LeakReason};
pub use config::TrackerConfig;
pub use error::{TrackerError, TrackerResult};
pub use factory::{
    ClientConnector, ClientFactory, ClientLease, WebSocketConnectionFactory, WebSocketHandle,
};
pub use record::{ResourceKind, ResourceRecord, ResourceState, ServiceType};
pub use registry::ResourceRegistry;
pub use sweeper::StaleSweeper;

#[cfg(feature = "clickhouse")]
pub use factory::ClickHouseConnector;
#[cfg(feature = "redis")]
pub use factory::RedisConnector;
