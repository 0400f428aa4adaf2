//! Id generation
//!
//! Every id is a pure function of its inputs plus a uniqueness source
//! (per-generator counter, wall clock in milliseconds, random hex). The only
//! shared state is the atomic counter, so one generator can be used from any
//! number of threads without locking.

use crate::config::IdGeneratorConfig;
use crate::context::IdContext;
use crate::error::{IdError, IdResult};
use crate::format::{self, build_client_middle, build_scoped, build_structured, validate_value};
use crate::id_type::{IdType, ParentRequirement, Scope};
use once_cell::sync::Lazy;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

static GLOBAL_GENERATOR: Lazy<IdGenerator> = Lazy::new(|| {
    let config = IdGeneratorConfig::from_env().unwrap_or_default();
    IdGenerator {
        config,
        counter: AtomicU64::new(0),
    }
});

/// Thread-safe id generator.
///
/// # Examples
///
/// ```
/// use id_correlation::{IdContext, IdError, IdGenerator, IdType};
///
/// let generator = IdGenerator::new();
/// let thread_id = generator.generate_thread_id();
/// let run_id = generator.generate(IdType::Run, &IdContext::derived_from(&thread_id)).unwrap();
/// assert!(run_id.starts_with(&format!("run_{}_", thread_id)));
///
/// // A run without its thread is a programming error, never a random fallback
/// let err = generator.generate(IdType::Run, &IdContext::new()).unwrap_err();
/// assert!(matches!(err, IdError::MissingCorrelationContext { .. }));
/// ```
#[derive(Debug)]
pub struct IdGenerator {
    config: IdGeneratorConfig,
    counter: AtomicU64,
}

impl IdGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: IdGeneratorConfig::default(),
            counter: AtomicU64::new(0),
        }
    }

    pub fn with_config(config: IdGeneratorConfig) -> IdResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            counter: AtomicU64::new(0),
        })
    }

    /// Process-wide generator, configured from the environment on first use.
    ///
    /// Falls back to the default configuration when the environment is invalid.
    pub fn global() -> &'static IdGenerator {
        &GLOBAL_GENERATOR
    }

    pub fn config(&self) -> &IdGeneratorConfig {
        &self.config
    }

    /// Mint an id of `id_type` carrying the correlation data in `ctx`.
    pub fn generate(&self, id_type: IdType, ctx: &IdContext) -> IdResult<String> {
        let id = match id_type {
            IdType::Client => self.client_id(ctx)?,
            _ => self.structured_id(id_type, ctx.parent_id.as_deref())?,
        };
        debug!(id_type = %id_type, id = %id, "minted id");
        Ok(id)
    }

    #[must_use]
    pub fn generate_user_id(&self) -> String {
        self.root_id(IdType::User)
    }

    #[must_use]
    pub fn generate_thread_id(&self) -> String {
        self.root_id(IdType::Thread)
    }

    pub fn generate_run_id(&self, thread_id: &str) -> IdResult<String> {
        self.generate(IdType::Run, &IdContext::derived_from(thread_id))
    }

    pub fn generate_request_id(&self, parent_id: Option<&str>) -> IdResult<String> {
        self.generate(IdType::Request, &optional_parent(parent_id))
    }

    pub fn generate_session_id(&self, parent_id: Option<&str>) -> IdResult<String> {
        self.generate(IdType::Session, &optional_parent(parent_id))
    }

    pub fn generate_connection_id(&self, parent_id: Option<&str>) -> IdResult<String> {
        self.generate(IdType::Connection, &optional_parent(parent_id))
    }

    /// Mint a client id tagged with its downstream service, user, and request.
    ///
    /// ```
    /// use id_correlation::{extract_service, IdGenerator};
    ///
    /// let generator = IdGenerator::new();
    /// let client_id = generator.generate_client_id("redis", "u1", "r1").unwrap();
    /// assert_eq!(extract_service(&client_id).as_deref(), Some("redis"));
    /// ```
    pub fn generate_client_id(
        &self,
        service_type: &str,
        user_id: &str,
        request_id: &str,
    ) -> IdResult<String> {
        let ctx = IdContext::new()
            .with_service(service_type)
            .with_user(user_id)
            .with_request(request_id);
        self.generate(IdType::Client, &ctx)
    }

    /// Mint a factory/context/agent id that embeds `parent_id` after `label`.
    ///
    /// The label is escaped like client id segments, so the parent always
    /// starts after the first `_` following the scope prefix.
    pub fn generate_scoped(&self, scope: Scope, label: &str, parent_id: &str) -> IdResult<String> {
        validate_value("label", label, self.config.max_parent_len)?;
        validate_value("parent_id", parent_id, self.config.max_parent_len)?;

        let id = build_scoped(scope, label, parent_id, now_millis(), &self.random_hex());
        debug!(scope = %scope, id = %id, "minted scoped id");
        Ok(id)
    }

    /// Current counter value; the next structured id uses this value.
    #[must_use]
    pub fn current_counter(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }

    fn root_id(&self, id_type: IdType) -> String {
        build_structured(id_type, None, self.next_counter(), now_millis(), &self.random_hex())
    }

    fn structured_id(&self, id_type: IdType, parent_id: Option<&str>) -> IdResult<String> {
        let parent = match (id_type.parent_requirement(), parent_id) {
            (ParentRequirement::Forbidden, Some(_)) => {
                return Err(IdError::UnexpectedParent { id_type });
            }
            (ParentRequirement::Required, None) => {
                return Err(IdError::MissingCorrelationContext {
                    id_type,
                    field: "parent_id",
                });
            }
            (_, parent) => parent,
        };

        if let Some(parent) = parent {
            validate_value("parent_id", parent, self.config.max_parent_len)?;
        }

        Ok(build_structured(
            id_type,
            parent,
            self.next_counter(),
            now_millis(),
            &self.random_hex(),
        ))
    }

    fn client_id(&self, ctx: &IdContext) -> IdResult<String> {
        let service = required(ctx.service_type.as_deref(), "service_type")?;
        let user = required(ctx.user_id.as_deref(), "user_id")?;
        // the request is the client's parent; accept it under either name
        let request = match (ctx.request_id.as_deref(), ctx.parent_id.as_deref()) {
            (Some(request), Some(parent)) if request != parent => {
                return Err(IdError::InvalidSegment {
                    field: "request_id",
                    details: "request_id and parent_id disagree".into(),
                });
            }
            (Some(request), _) | (None, Some(request)) => request,
            (None, None) => {
                return Err(IdError::MissingCorrelationContext {
                    id_type: IdType::Client,
                    field: "request_id",
                });
            }
        };

        let max_len = self.config.max_parent_len;
        validate_value("service_type", service, max_len)?;
        validate_value("user_id", user, max_len)?;
        validate_value("request_id", request, max_len)?;

        let middle = build_client_middle(service, user, request);
        Ok(build_structured(
            IdType::Client,
            Some(&middle),
            self.next_counter(),
            now_millis(),
            &self.random_hex(),
        ))
    }

    fn next_counter(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }

    fn random_hex(&self) -> String {
        let value: u128 = rand::thread_rng().gen();
        let full = format!("{:032x}", value);
        full[..self.config.random_hex_len].to_string()
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn optional_parent(parent_id: Option<&str>) -> IdContext {
    match parent_id {
        Some(parent) => IdContext::derived_from(parent),
        None => IdContext::new(),
    }
}

fn required<'a>(value: Option<&'a str>, field: &'static str) -> IdResult<&'a str> {
    value.ok_or(IdError::MissingCorrelationContext {
        id_type: IdType::Client,
        field,
    })
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
