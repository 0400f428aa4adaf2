//! Context bag passed to the generator

/// Correlation context for a new id.
///
/// ```
/// use id_correlation::{IdContext, IdGenerator, IdType};
///
/// let generator = IdGenerator::new();
/// let ctx = IdContext::new()
///     .with_service("redis")
///     .with_user("u1")
///     .with_request("r1");
/// let client_id = generator.generate(IdType::Client, &ctx).unwrap();
/// assert!(client_id.starts_with("client_svc-redis_usr-u1_req-r1_"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdContext {
    pub parent_id: Option<String>,
    pub user_id: Option<String>,
    pub service_type: Option<String>,
    pub request_id: Option<String>,
}

impl IdContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for an id derived from `parent_id`.
    pub fn derived_from(parent_id: impl Into<String>) -> Self {
        Self::new().with_parent(parent_id)
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_service(mut self, service_type: impl Into<String>) -> Self {
        self.service_type = Some(service_type.into());
        self
    }

    pub fn with_request(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}
