//! Entity types and their prefixes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Entity types that get their own identifier prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdType {
    User,
    Thread,
    Run,
    Request,
    Session,
    Connection,
    Client,
}

/// Whether an id type embeds a parent id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentRequirement {
    /// Root of a correlation chain; a parent is rejected.
    Forbidden,
    /// Derived when a parent is supplied, root otherwise.
    Optional,
    /// Cannot be minted without a parent.
    Required,
}

impl IdType {
    pub const ALL: [IdType; 7] = [
        IdType::User,
        IdType::Thread,
        IdType::Run,
        IdType::Request,
        IdType::Session,
        IdType::Connection,
        IdType::Client,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            IdType::User => "user",
            IdType::Thread => "thread",
            IdType::Run => "run",
            IdType::Request => "request",
            IdType::Session => "session",
            IdType::Connection => "connection",
            IdType::Client => "client",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        IdType::ALL.into_iter().find(|t| t.prefix() == prefix)
    }

    /// Client ids take the request id as their parent.
    pub fn parent_requirement(self) -> ParentRequirement {
        match self {
            IdType::User | IdType::Thread => ParentRequirement::Forbidden,
            IdType::Run | IdType::Client => ParentRequirement::Required,
            IdType::Request | IdType::Session | IdType::Connection => ParentRequirement::Optional,
        }
    }
}

impl fmt::Display for IdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Prefixes for ids minted by factories, execution contexts, and agents.
///
/// These embed their parent after an escaped label, so the parent is
/// recovered exactly once the label's terminating `_` is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Factory,
    Context,
    Agent,
}

impl Scope {
    pub const ALL: [Scope; 3] = [Scope::Factory, Scope::Context, Scope::Agent];

    pub fn prefix(self) -> &'static str {
        match self {
            Scope::Factory => "factory",
            Scope::Context => "context",
            Scope::Agent => "agent",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Scope::ALL.into_iter().find(|s| s.prefix() == prefix)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}
