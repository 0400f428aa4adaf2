//! Registry of live resources keyed by correlated id
//!
//! Registration refuses ids that do not embed their parent. Every mutation
//! happens under one write lock, so readers never see a half-finished
//! teardown.

use crate::error::{TrackerError, TrackerResult};
use crate::metrics;
use crate::record::{ResourceRecord, ResourceState};
use id_correlation::is_consistent;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of live resources, keyed by resource id
///
/// Cheap to clone; clones share state. Separate instances are fully isolated,
/// so components and tests each inject their own.
#[derive(Debug, Default, Clone)]
pub struct ResourceRegistry {
    // resource_id -> record
    inner: Arc<RwLock<HashMap<String, ResourceRecord>>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly minted resource
    ///
    /// The resource id must embed the parent it is registered under; a record
    /// that fails this check could never be cleaned up by id.
    pub fn register(&self, record: ResourceRecord) -> TrackerResult<()> {
        if !is_consistent(&record.parent_id, &record.resource_id) {
            return Err(TrackerError::UncorrelatedResource {
                resource_id: record.resource_id,
                parent_id: record.parent_id,
            });
        }

        let mut guard = self.inner.write();
        if guard.contains_key(&record.resource_id) {
            return Err(TrackerError::DuplicateResource(record.resource_id));
        }

        metrics::resource_added(record.kind.label());
        tracing::debug!(
            resource_id = %record.resource_id,
            parent_id = %record.parent_id,
            kind = record.kind.label(),
            total = guard.len() + 1,
            "registered resource"
        );
        guard.insert(record.resource_id.clone(), record);
        Ok(())
    }

    /// Minted → Active
    pub fn activate(&self, resource_id: &str) -> TrackerResult<ResourceRecord> {
        self.transition(resource_id, ResourceState::Active)
    }

    pub fn transition(
        &self,
        resource_id: &str,
        next: ResourceState,
    ) -> TrackerResult<ResourceRecord> {
        self.update(resource_id, |record| -> TrackerResult<ResourceRecord> {
            record.transition(next)?;
            Ok(record.clone())
        })?
    }

    pub fn get(&self, resource_id: &str) -> Option<ResourceRecord> {
        self.inner.read().get(resource_id).cloned()
    }

    pub fn contains(&self, resource_id: &str) -> bool {
        self.inner.read().contains_key(resource_id)
    }

    /// Drop a record regardless of state
    pub fn remove(&self, resource_id: &str) -> Option<ResourceRecord> {
        let removed = self.inner.write().remove(resource_id);
        if let Some(record) = &removed {
            metrics::resource_removed(record.kind.label());
            tracing::debug!(
                resource_id = %resource_id,
                state = %record.state,
                "removed resource"
            );
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn count_in_state(&self, state: ResourceState) -> usize {
        self.inner
            .read()
            .values()
            .filter(|r| r.state == state)
            .count()
    }

    pub fn records_for_user(&self, user_id: &str) -> Vec<ResourceRecord> {
        self.filtered(|r| r.user_id.as_deref() == Some(user_id))
    }

    pub fn records_for_parent(&self, parent_id: &str) -> Vec<ResourceRecord> {
        self.filtered(|r| r.parent_id == parent_id)
    }

    /// Leaked records, plus records flagged by a rejected cleanup
    pub fn leaked(&self) -> Vec<ResourceRecord> {
        self.filtered(|r| r.state == ResourceState::Leaked || r.is_flagged())
    }

    pub fn snapshot(&self) -> Vec<ResourceRecord> {
        self.filtered(|_| true)
    }

    /// Run `f` against a record under the write lock
    pub(crate) fn update<R>(
        &self,
        resource_id: &str,
        f: impl FnOnce(&mut ResourceRecord) -> R,
    ) -> TrackerResult<R> {
        let mut guard = self.inner.write();
        let record = guard
            .get_mut(resource_id)
            .ok_or_else(|| TrackerError::NotFound(resource_id.to_string()))?;
        Ok(f(record))
    }

    /// Move a record to `Reclaimed` and drop it under one write lock
    ///
    /// `admit` sees the record first; an error leaves it untouched.
    pub(crate) fn reclaim(
        &self,
        resource_id: &str,
        admit: impl FnOnce(&ResourceRecord) -> TrackerResult<()>,
    ) -> TrackerResult<ResourceRecord> {
        let mut guard = self.inner.write();
        let record = guard
            .get_mut(resource_id)
            .ok_or_else(|| TrackerError::NotFound(resource_id.to_string()))?;
        admit(record)?;
        record.reclaim()?;

        let removed = guard
            .remove(resource_id)
            .ok_or_else(|| TrackerError::NotFound(resource_id.to_string()))?;
        metrics::resource_removed(removed.kind.label());
        tracing::debug!(
            resource_id = %resource_id,
            remaining = guard.len(),
            "reclaimed and removed resource"
        );
        Ok(removed)
    }

    /// Remove every record matching `pred` in one pass
    pub(crate) fn remove_where(
        &self,
        mut pred: impl FnMut(&ResourceRecord) -> bool,
    ) -> Vec<ResourceRecord> {
        let mut guard = self.inner.write();
        let ids: Vec<String> = guard
            .values()
            .filter(|r| pred(r))
            .map(|r| r.resource_id.clone())
            .collect();

        let removed: Vec<ResourceRecord> = ids.iter().filter_map(|id| guard.remove(id)).collect();
        for record in &removed {
            metrics::resource_removed(record.kind.label());
        }
        removed
    }

    fn filtered(&self, pred: impl Fn(&ResourceRecord) -> bool) -> Vec<ResourceRecord> {
        self.inner
            .read()
            .values()
            .filter(|r| pred(r))
            .cloned()
            .collect()
    }
}
