//! Cleanup coordination
//!
//! Drives `cleanup-requested → {reclaimed | leaked}`. A cleanup request that
//! fails any check never tears anything down: the resource keeps its state and
//! a [`LeakEvent`] is emitted instead, so a mis-paired id can never close
//! another user's resource. A registered record rejected over its ids is
//! flagged, which makes it visible to [`CleanupCoordinator::force_reclaim`]
//! and [`CleanupCoordinator::reap_aged`].

use crate::config::TrackerConfig;
use crate::error::{TrackerError, TrackerResult};
use crate::metrics;
use crate::record::{ResourceKind, ResourceRecord, ResourceState};
use crate::registry::ResourceRegistry;
use chrono::{DateTime, Utc};
use id_correlation::{extract_service, ConsistencyCheck, ConsistencyValidator, ViolationReason};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Ids a teardown path was handed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupRequest {
    pub parent_id: String,
    pub resource_id: String,
    /// Owner the caller acts for; checked when present
    pub user_id: Option<String>,
    /// Expected service tag; checked when present
    pub service_type: Option<String>,
}

impl CleanupRequest {
    pub fn new(parent_id: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            parent_id: parent_id.into(),
            resource_id: resource_id.into(),
            user_id: None,
            service_type: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_service(mut self, service_type: impl Into<String>) -> Self {
        self.service_type = Some(service_type.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeakReason {
    InconsistentIds(ViolationReason),
    NotRegistered,
    UserMismatch { owner: Option<String> },
    ParentMismatch { registered: String },
    ServiceMismatch { found: Option<String> },
    InvalidState(ResourceState),
    TeardownFailed(String),
}

impl LeakReason {
    /// Metric/log label
    pub fn label(&self) -> &'static str {
        match self {
            LeakReason::InconsistentIds(_) => "inconsistent_ids",
            LeakReason::NotRegistered => "not_registered",
            LeakReason::UserMismatch { .. } => "user_mismatch",
            LeakReason::ParentMismatch { .. } => "parent_mismatch",
            LeakReason::ServiceMismatch { .. } => "service_mismatch",
            LeakReason::InvalidState(_) => "invalid_state",
            LeakReason::TeardownFailed(_) => "teardown_failed",
        }
    }

    /// Whether the resource itself is suspect, as opposed to the caller
    fn flags_resource(&self) -> bool {
        !matches!(
            self,
            LeakReason::NotRegistered | LeakReason::UserMismatch { .. }
        )
    }
}

impl fmt::Display for LeakReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeakReason::InconsistentIds(reason) => write!(f, "inconsistent ids: {}", reason),
            LeakReason::NotRegistered => write!(f, "resource not registered"),
            LeakReason::UserMismatch { owner } => match owner {
                Some(owner) => write!(f, "resource owned by {}", owner),
                None => write!(f, "resource has no owner"),
            },
            LeakReason::ParentMismatch { registered } => {
                write!(f, "resource registered under {}", registered)
            }
            LeakReason::ServiceMismatch { found } => match found {
                Some(found) => write!(f, "client id tagged for {}", found),
                None => write!(f, "client id carries no service tag"),
            },
            LeakReason::InvalidState(state) => write!(f, "resource is {}", state),
            LeakReason::TeardownFailed(details) => write!(f, "teardown failed: {}", details),
        }
    }
}

/// A resource that could not be reclaimed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeakEvent {
    pub resource_id: String,
    pub parent_id: String,
    pub user_id: Option<String>,
    pub kind: Option<ResourceKind>,
    pub reason: LeakReason,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    Reclaimed(ResourceRecord),
    Leaked(LeakEvent),
}

impl CleanupOutcome {
    pub fn is_reclaimed(&self) -> bool {
        matches!(self, CleanupOutcome::Reclaimed(_))
    }

    pub fn leak(&self) -> Option<&LeakEvent> {
        match self {
            CleanupOutcome::Leaked(event) => Some(event),
            CleanupOutcome::Reclaimed(_) => None,
        }
    }
}

/// Shared cleanup path for every resource factory
#[derive(Debug, Clone)]
pub struct CleanupCoordinator {
    registry: ResourceRegistry,
    validator: ConsistencyValidator,
    history: Arc<Mutex<VecDeque<LeakEvent>>>,
    history_capacity: usize,
}

impl CleanupCoordinator {
    pub fn new(registry: ResourceRegistry, config: &TrackerConfig) -> Self {
        Self {
            registry,
            validator: ConsistencyValidator::new(config.component.clone()),
            history: Arc::new(Mutex::new(VecDeque::with_capacity(
                config.leak_history_capacity.min(1024),
            ))),
            history_capacity: config.leak_history_capacity,
        }
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn component(&self) -> &str {
        self.validator.component()
    }

    /// Validate a cleanup request and move the record to `CleanupRequested`
    ///
    /// Checks, in order: the id pair is consistent, the resource is
    /// registered under that parent, it belongs to the requesting user, it
    /// carries the expected service tag, and it is not already being
    /// cleaned up. A rejected record keeps its state; unless the rejection
    /// is about the caller (unknown id, wrong user) it is also flagged.
    pub fn begin(&self, request: &CleanupRequest) -> Result<ResourceRecord, LeakEvent> {
        let violation = match self.validator.check(&request.parent_id, &request.resource_id) {
            ConsistencyCheck::Violation(violation) => {
                metrics::record_violation(self.component(), violation.reason.label());
                Some(LeakReason::InconsistentIds(violation.reason))
            }
            ConsistencyCheck::Consistent => None,
        };

        let outcome = self.registry.update(
            &request.resource_id,
            |record| -> Result<ResourceRecord, (LeakReason, ResourceKind)> {
                let admitted = match &violation {
                    Some(reason) => Err(reason.clone()),
                    None => admit(record, request),
                };
                match admitted {
                    Ok(()) => Ok(record.clone()),
                    Err(reason) => {
                        if reason.flags_resource() {
                            record.flag_leak();
                        }
                        Err((reason, record.kind.clone()))
                    }
                }
            },
        );

        match outcome {
            Ok(Ok(record)) => Ok(record),
            Ok(Err((reason, kind))) => Err(self.leak(request, Some(kind), reason)),
            Err(_) => {
                let reason = violation.unwrap_or(LeakReason::NotRegistered);
                Err(self.leak(request, None, reason))
            }
        }
    }

    /// Teardown succeeded: `CleanupRequested → Reclaimed`, record removed
    pub fn complete(&self, resource_id: &str) -> TrackerResult<ResourceRecord> {
        self.reclaim(resource_id, |record| {
            record.state == ResourceState::CleanupRequested
        })
    }

    /// Teardown failed: `CleanupRequested → Leaked`, record kept for aged cleanup
    pub fn fail(&self, resource_id: &str, details: impl Into<String>) -> LeakEvent {
        let reason = LeakReason::TeardownFailed(details.into());
        let marked = self.registry.update(resource_id, |record| {
            // a record not in CleanupRequested keeps its state
            if record.transition(ResourceState::Leaked).is_err() {
                record.flag_leak();
            }
            record.clone()
        });

        let request = match &marked {
            Ok(record) => CleanupRequest {
                parent_id: record.parent_id.clone(),
                resource_id: record.resource_id.clone(),
                user_id: record.user_id.clone(),
                service_type: None,
            },
            Err(_) => CleanupRequest::new(String::new(), resource_id),
        };
        self.leak(&request, marked.ok().map(|r| r.kind), reason)
    }

    /// `begin` then `complete`, for resources with no external teardown
    pub fn cleanup(&self, request: &CleanupRequest) -> CleanupOutcome {
        match self.begin(request) {
            Ok(_) => match self.complete(&request.resource_id) {
                Ok(record) => CleanupOutcome::Reclaimed(record),
                Err(_) => {
                    CleanupOutcome::Leaked(self.leak(request, None, LeakReason::NotRegistered))
                }
            },
            Err(event) => CleanupOutcome::Leaked(event),
        }
    }

    /// Manual cleanup of a leaked, flagged, or stuck record
    pub fn force_reclaim(&self, resource_id: &str) -> TrackerResult<ResourceRecord> {
        self.reclaim(resource_id, |record| {
            record.is_flagged()
                || matches!(
                    record.state,
                    ResourceState::Leaked | ResourceState::CleanupRequested
                )
        })
    }

    /// Remove leaked and flagged records that have been leaks for at least `max_age`
    pub fn reap_aged(&self, max_age: Duration) -> Vec<ResourceRecord> {
        let now = Utc::now();
        let removed = self.registry.remove_where(|record| {
            record
                .leak_age(now)
                .and_then(|age| age.to_std().ok())
                .map(|age| age >= max_age)
                .unwrap_or(false)
        });

        let reaped: Vec<ResourceRecord> = removed
            .into_iter()
            .filter_map(|mut record| {
                record.reclaim().ok()?;
                Some(record)
            })
            .collect();

        if !reaped.is_empty() {
            metrics::record_reaped(reaped.len());
            info!(
                component = %self.component(),
                count = reaped.len(),
                "reaped leaked resources"
            );
        }
        reaped
    }

    /// Most recent leak events, oldest first
    pub fn leak_history(&self) -> Vec<LeakEvent> {
        self.history.lock().iter().cloned().collect()
    }

    fn reclaim(
        &self,
        resource_id: &str,
        accept: impl FnOnce(&ResourceRecord) -> bool,
    ) -> TrackerResult<ResourceRecord> {
        let record = self.registry.reclaim(resource_id, |record| {
            if accept(record) {
                Ok(())
            } else {
                Err(TrackerError::InvalidTransition {
                    resource_id: record.resource_id.clone(),
                    from: record.state,
                    to: ResourceState::Reclaimed,
                })
            }
        })?;

        metrics::record_cleanup(record.kind.label(), "reclaimed");
        info!(
            component = %self.component(),
            resource_id = %record.resource_id,
            parent_id = %record.parent_id,
            kind = record.kind.label(),
            "reclaimed resource"
        );
        Ok(record)
    }

    fn leak(
        &self,
        request: &CleanupRequest,
        kind: Option<ResourceKind>,
        reason: LeakReason,
    ) -> LeakEvent {
        let event = LeakEvent {
            resource_id: request.resource_id.clone(),
            parent_id: request.parent_id.clone(),
            user_id: request.user_id.clone(),
            kind,
            reason,
            detected_at: Utc::now(),
        };

        let kind_label = event.kind.as_ref().map(|k| k.label()).unwrap_or("unknown");
        metrics::record_cleanup(kind_label, "leaked");
        warn!(
            component = %self.component(),
            resource_id = %event.resource_id,
            parent_id = %event.parent_id,
            kind = kind_label,
            reason = %event.reason,
            "resource leak"
        );

        if self.history_capacity > 0 {
            let mut history = self.history.lock();
            if history.len() == self.history_capacity {
                history.pop_front();
            }
            history.push_back(event.clone());
        }
        event
    }
}

/// Ownership checks for a consistent id pair, then `→ CleanupRequested`
fn admit(record: &mut ResourceRecord, request: &CleanupRequest) -> Result<(), LeakReason> {
    if record.parent_id != request.parent_id {
        return Err(LeakReason::ParentMismatch {
            registered: record.parent_id.clone(),
        });
    }
    if let Some(user_id) = &request.user_id {
        if record.user_id.as_ref() != Some(user_id) {
            return Err(LeakReason::UserMismatch {
                owner: record.user_id.clone(),
            });
        }
    }
    if let Some(expected) = &request.service_type {
        let found = extract_service(&record.resource_id);
        if found.as_ref() != Some(expected) {
            return Err(LeakReason::ServiceMismatch { found });
        }
    }
    let state = record.state;
    record
        .transition(ResourceState::CleanupRequested)
        .map_err(|_| LeakReason::InvalidState(state))
}
