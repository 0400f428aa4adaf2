//! Correlated Identifier Library
//!
//! One canonical way to mint, parse, and correlate the ids that flow through a
//! unit of work (thread → run → request / session / connection / client).
//!
//! **Problem Solved**:
//! Services used to mint every id independently:
//! ```rust,ignore
//! let thread_id = format!("thread_{}", Uuid::new_v4());
//! let run_id = format!("run_{}", Uuid::new_v4()); // no way back to the thread
//! ```
//! Cleanup code then had no way to tell whether a `(thread_id, run_id)` pair
//! found in a teardown request actually belonged together, and resources leaked.
//!
//! **After**:
//! ```rust
//! use id_correlation::{extract_parent_id, is_consistent, IdGenerator};
//!
//! let generator = IdGenerator::new();
//! let thread_id = generator.generate_thread_id();
//! let run_id = generator.generate_run_id(&thread_id).unwrap();
//!
//! assert_eq!(extract_parent_id(&run_id).as_deref(), Some(thread_id.as_str()));
//! assert!(is_consistent(&thread_id, &run_id));
//! ```
//!
//! ## Id format
//!
//! ```text
//! <prefix>[_<correlation segments>]_<counter>_<timestamp-ms>_<random-hex>
//!
//! thread_17_1760870400000_9f2c41ab
//! run_thread_17_1760870400000_9f2c41ab_18_1760870400003_03be77d1
//! client_svc-redis_usr-u1_req-r1_19_1760870400004_5aa0e9c2
//! ```
//!
//! Derived ids embed the full parent literally, so extraction is a pure string
//! operation with no lookup table. Client ids carry labeled, escaped segments
//! so the service tag can be recovered without knowing the layout.
//!
//! Scoped ids (`factory_`, `context_`, `agent_`) embed their parent after an
//! escaped label, which keeps the label/parent split unambiguous.

pub mod config;
pub mod context;
pub mod error;
pub mod extractor;
pub mod format;
pub mod generator;
pub mod id_type;
pub mod validator;

// Re-export main types for convenience
pub use config::IdGeneratorConfig;
pub use context::IdContext;
pub use error::{IdError, IdResult};
pub use extractor::{
    classify, extract_id_type, extract_parent, extract_parent_id, extract_request,
    extract_service, extract_user, strategy_for, ExtractionStrategy, IdShape, ParentFragment,
};
pub use format::{is_valid_format, parse_id, ParsedId};
pub use generator::IdGenerator;
pub use id_type::{IdType, ParentRequirement, Scope};
pub use validator::{
    are_isolated, is_consistent, ConsistencyCheck, ConsistencyValidator, ConsistencyViolation,
    ViolationReason,
};
