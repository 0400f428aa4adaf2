//! Consistency validation for (parent, derived) id pairs
//!
//! A mismatch is an expected outcome, not an error: cleanup paths receive id
//! pairs of uncertain provenance and must decide policy themselves. Results
//! are deterministic, so a failed check is never retried.

use crate::extractor::{extract_parent, ParentFragment};
use serde::Serialize;
use std::fmt;
use tracing::warn;

/// Why a pair failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationReason {
    /// The derived id carries no correlation data (legacy, foreign, malformed, root).
    Uncorrelated,
    /// The derived id names a different parent.
    ParentMismatch { embedded: String },
}

impl ViolationReason {
    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ViolationReason::Uncorrelated => "uncorrelated",
            ViolationReason::ParentMismatch { .. } => "parent_mismatch",
        }
    }
}

impl fmt::Display for ViolationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationReason::Uncorrelated => write!(f, "derived id carries no correlation data"),
            ViolationReason::ParentMismatch { embedded } => {
                write!(f, "derived id was minted from {}", embedded)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsistencyViolation {
    pub parent_id: String,
    pub derived_id: String,
    pub reason: ViolationReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyCheck {
    Consistent,
    Violation(ConsistencyViolation),
}

impl ConsistencyCheck {
    pub fn is_consistent(&self) -> bool {
        matches!(self, ConsistencyCheck::Consistent)
    }
}

/// Decide whether `derived_id` was minted from `parent_id`
///
/// ```
/// use id_correlation::{is_consistent, IdGenerator};
///
/// let generator = IdGenerator::new();
/// let alice_thread = generator.generate_thread_id();
/// let bob_thread = generator.generate_thread_id();
/// let bob_run = generator.generate_run_id(&bob_thread).unwrap();
///
/// assert!(is_consistent(&bob_thread, &bob_run));
/// assert!(!is_consistent(&alice_thread, &bob_run));
/// ```
pub fn is_consistent(parent_id: &str, derived_id: &str) -> bool {
    evaluate(parent_id, derived_id).is_none()
}

/// True when neither pair validates against the other's parent.
///
/// Used by multi-user isolation checks: two users' id chains must never be
/// mistaken for one another.
pub fn are_isolated(a_parent: &str, a_derived: &str, b_parent: &str, b_derived: &str) -> bool {
    !is_consistent(a_parent, b_derived) && !is_consistent(b_parent, a_derived)
}

/// Validator that reports violations under a component name.
#[derive(Debug, Clone)]
pub struct ConsistencyValidator {
    component: String,
}

impl ConsistencyValidator {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    /// Validate a pair, logging a warning on violation.
    pub fn check(&self, parent_id: &str, derived_id: &str) -> ConsistencyCheck {
        match evaluate(parent_id, derived_id) {
            None => ConsistencyCheck::Consistent,
            Some(reason) => {
                warn!(
                    component = %self.component,
                    parent_id = %parent_id,
                    derived_id = %derived_id,
                    reason = %reason,
                    "id mismatch: consistency violation"
                );
                ConsistencyCheck::Violation(ConsistencyViolation {
                    parent_id: parent_id.to_string(),
                    derived_id: derived_id.to_string(),
                    reason,
                })
            }
        }
    }
}

fn evaluate(parent_id: &str, derived_id: &str) -> Option<ViolationReason> {
    if parent_id.is_empty() {
        return Some(ViolationReason::Uncorrelated);
    }

    match extract_parent(derived_id) {
        None => Some(ViolationReason::Uncorrelated),
        Some(ParentFragment::Exact(embedded) | ParentFragment::Scoped { parent: embedded, .. }) => {
            if embedded == parent_id {
                None
            } else {
                Some(ViolationReason::ParentMismatch { embedded })
            }
        }
    }
}
