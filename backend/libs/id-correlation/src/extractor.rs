//! Correlation extraction
//!
//! Recover what an id was derived from without consulting any registry.
//! Every function here is total: malformed or foreign input yields `None`,
//! never a panic, because callers run these on ids of unknown provenance
//! during cleanup.

use crate::format::{parse_id, parse_scoped, SEPARATOR};
use crate::id_type::{IdType, Scope};
use uuid::Uuid;

/// How the parent is embedded, selected by prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    /// Parent sits between the prefix and the fixed tail.
    Structured,
    /// Parent follows an escaped label.
    Scoped,
    /// No known prefix; nothing can be extracted.
    Unsupported,
}

/// What [`extract_parent`] recovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentFragment {
    /// The parent id, byte for byte.
    Exact(String),
    /// The parent of a scoped id, with the label it was minted under.
    Scoped { label: String, parent: String },
}

impl ParentFragment {
    /// The parent id, whichever layout carried it.
    pub fn as_str(&self) -> &str {
        match self {
            ParentFragment::Exact(parent) | ParentFragment::Scoped { parent, .. } => parent,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, ParentFragment::Exact(_))
    }
}

/// Coarse classification of an arbitrary id string, for logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdShape {
    Root(IdType),
    Derived(IdType),
    Scoped(Scope),
    /// A bare UUID, or a legacy id ending in one (`demo-thread-<uuid>`)
    LegacyUuid,
    Unknown,
}

pub fn strategy_for(id: &str) -> ExtractionStrategy {
    let prefix = id.split(SEPARATOR).next().unwrap_or_default();
    if IdType::from_prefix(prefix).is_some() {
        ExtractionStrategy::Structured
    } else if Scope::from_prefix(prefix).is_some() {
        ExtractionStrategy::Scoped
    } else {
        ExtractionStrategy::Unsupported
    }
}

/// Recover the parent embedded in `derived_id`
///
/// Returns `None` for root ids, uncorrelated ids (bare UUIDs and the like),
/// and anything malformed.
///
/// ```
/// use id_correlation::{extract_parent, IdGenerator, ParentFragment};
///
/// let generator = IdGenerator::new();
/// let thread_id = generator.generate_thread_id();
/// let run_id = generator.generate_run_id(&thread_id).unwrap();
///
/// assert_eq!(extract_parent(&run_id), Some(ParentFragment::Exact(thread_id.clone())));
/// assert_eq!(extract_parent(&thread_id), None);
/// assert_eq!(extract_parent("550e8400-e29b-41d4-a716-446655440000"), None);
/// ```
pub fn extract_parent(derived_id: &str) -> Option<ParentFragment> {
    match strategy_for(derived_id) {
        ExtractionStrategy::Structured => parse_id(derived_id)
            .ok()
            .and_then(|parsed| parsed.parent_id)
            .map(ParentFragment::Exact),
        ExtractionStrategy::Scoped => parse_scoped(derived_id).map(|parts| ParentFragment::Scoped {
            label: parts.label,
            parent: parts.parent.to_string(),
        }),
        ExtractionStrategy::Unsupported => None,
    }
}

/// Parent id of any derived or scoped id.
pub fn extract_parent_id(derived_id: &str) -> Option<String> {
    match extract_parent(derived_id)? {
        ParentFragment::Exact(parent) | ParentFragment::Scoped { parent, .. } => Some(parent),
    }
}

/// Service tag of a client id (`svc-` segment).
pub fn extract_service(id: &str) -> Option<String> {
    parse_id(id).ok().and_then(|parsed| parsed.service_type)
}

/// User tag of a client id (`usr-` segment).
pub fn extract_user(id: &str) -> Option<String> {
    parse_id(id).ok().and_then(|parsed| parsed.user_id)
}

/// Request tag of a client id (`req-` segment).
pub fn extract_request(id: &str) -> Option<String> {
    parse_id(id).ok().and_then(|parsed| parsed.request_id)
}

pub fn extract_id_type(id: &str) -> Option<IdType> {
    parse_id(id).ok().map(|parsed| parsed.id_type)
}

pub fn classify(id: &str) -> IdShape {
    if let Ok(parsed) = parse_id(id) {
        return if parsed.is_derived() {
            IdShape::Derived(parsed.id_type)
        } else {
            IdShape::Root(parsed.id_type)
        };
    }
    if let Some(parts) = parse_scoped(id) {
        return IdShape::Scoped(parts.scope);
    }
    if ends_with_uuid(id) {
        return IdShape::LegacyUuid;
    }
    IdShape::Unknown
}

fn ends_with_uuid(id: &str) -> bool {
    // hyphenated uuid is 36 chars
    id.len() >= 36
        && id.is_char_boundary(id.len() - 36)
        && Uuid::parse_str(&id[id.len() - 36..]).is_ok()
}
