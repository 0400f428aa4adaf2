//! Resource factories
//!
//! Each factory mints correlated ids, registers what it opens, and routes
//! every teardown through the shared [`crate::CleanupCoordinator`].

mod client;
mod websocket;

#[cfg(feature = "clickhouse")]
mod clickhouse_connector;
#[cfg(feature = "redis")]
mod redis_connector;

pub use client::{ClientConnector, ClientFactory, ClientLease};
pub use websocket::{WebSocketConnectionFactory, WebSocketHandle};

#[cfg(feature = "clickhouse")]
pub use clickhouse_connector::ClickHouseConnector;
#[cfg(feature = "redis")]
pub use redis_connector::RedisConnector;
