//! Tracked resources and their lifecycle
//!
//! State transitions:
//! - Minted → Active: first use by the owning component
//! - Minted | Active → CleanupRequested: a teardown path fires with a consistent id pair
//! - CleanupRequested → Reclaimed: teardown succeeded, record is removed
//! - CleanupRequested → Leaked: teardown failed, record stays for aged cleanup
//! - Leaked → Reclaimed: manual or aged cleanup
//!
//! A record whose cleanup was rejected keeps its state but is flagged; a
//! flagged record is reclaimable from any state.

use crate::error::{TrackerError, TrackerResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Downstream service a client id is scoped to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceType {
    Redis,
    ClickHouse,
    Postgres,
    Custom(String),
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceType::Redis => write!(f, "redis"),
            ServiceType::ClickHouse => write!(f, "clickhouse"),
            ServiceType::Postgres => write!(f, "postgres"),
            ServiceType::Custom(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for ServiceType {
    fn from(s: &str) -> Self {
        match s {
            "redis" => ServiceType::Redis,
            "clickhouse" => ServiceType::ClickHouse,
            "postgres" => ServiceType::Postgres,
            custom => ServiceType::Custom(custom.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    WebSocketConnection,
    DatabaseClient(ServiceType),
    Session,
}

impl ResourceKind {
    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::WebSocketConnection => "websocket_connection",
            ResourceKind::DatabaseClient(_) => "database_client",
            ResourceKind::Session => "session",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    Minted,
    Active,
    CleanupRequested,
    Reclaimed,
    Leaked,
}

impl ResourceState {
    pub fn can_transition_to(self, next: ResourceState) -> bool {
        use ResourceState::*;
        matches!(
            (self, next),
            (Minted, Active)
                | (Minted, CleanupRequested)
                | (Active, CleanupRequested)
                | (CleanupRequested, Reclaimed)
                | (CleanupRequested, Leaked)
                | (Leaked, Reclaimed)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == ResourceState::Reclaimed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceState::Minted => "minted",
            ResourceState::Active => "active",
            ResourceState::CleanupRequested => "cleanup_requested",
            ResourceState::Reclaimed => "reclaimed",
            ResourceState::Leaked => "leaked",
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry entry for one tracked resource, keyed by its derived id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub resource_id: String,
    pub parent_id: String,
    pub user_id: Option<String>,
    pub kind: ResourceKind,
    pub state: ResourceState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set when a cleanup attempt was rejected for this record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leak_flagged_at: Option<DateTime<Utc>>,
}

impl ResourceRecord {
    pub fn new(
        resource_id: impl Into<String>,
        parent_id: impl Into<String>,
        kind: ResourceKind,
    ) -> Self {
        let now = Utc::now();
        Self {
            resource_id: resource_id.into(),
            parent_id: parent_id.into(),
            user_id: None,
            kind,
            state: ResourceState::Minted,
            created_at: now,
            updated_at: now,
            leak_flagged_at: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Time since the last state change
    pub fn idle_for(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.updated_at
    }

    pub fn is_flagged(&self) -> bool {
        self.leak_flagged_at.is_some()
    }

    /// Flag for manual or aged cleanup; the first flag wins
    pub fn flag_leak(&mut self) {
        if self.leak_flagged_at.is_none() {
            self.leak_flagged_at = Some(Utc::now());
        }
    }

    /// How long this record has been a leak, if it is one
    pub fn leak_age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        match (self.state, self.leak_flagged_at) {
            (ResourceState::Leaked, _) => Some(self.idle_for(now)),
            (_, Some(flagged_at)) => Some(now - flagged_at),
            _ => None,
        }
    }

    /// Final transition before removal
    pub fn reclaim(&mut self) -> TrackerResult<()> {
        if self.is_flagged() && !self.state.is_terminal() {
            self.state = ResourceState::Reclaimed;
            self.updated_at = Utc::now();
            return Ok(());
        }
        self.transition(ResourceState::Reclaimed)
    }

    pub fn transition(&mut self, next: ResourceState) -> TrackerResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(TrackerError::InvalidTransition {
                resource_id: self.resource_id.clone(),
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}
