//! Generator configuration

use crate::error::{IdError, IdResult};

/// Smallest random suffix accepted; 8 hex chars = 32 bits of entropy.
pub const MIN_RANDOM_HEX_LEN: usize = 8;
/// Largest random suffix accepted; a full u128.
pub const MAX_RANDOM_HEX_LEN: usize = 32;

/// Configuration for id generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdGeneratorConfig {
    /// Length of the random hex suffix
    pub random_hex_len: usize,
    /// Maximum length of any embedded value (parent, user, service, request)
    pub max_parent_len: usize,
}

impl Default for IdGeneratorConfig {
    fn default() -> Self {
        Self {
            random_hex_len: 8,
            max_parent_len: 512,
        }
    }
}

impl IdGeneratorConfig {
    /// Build configuration from environment variables, falling back to defaults
    ///
    /// - `ID_RANDOM_HEX_LEN`
    /// - `ID_MAX_PARENT_LEN`
    pub fn from_env() -> IdResult<Self> {
        let defaults = Self::default();
        let config = Self {
            random_hex_len: std::env::var("ID_RANDOM_HEX_LEN")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.random_hex_len),
            max_parent_len: std::env::var("ID_MAX_PARENT_LEN")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_parent_len),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> IdResult<()> {
        if !(MIN_RANDOM_HEX_LEN..=MAX_RANDOM_HEX_LEN).contains(&self.random_hex_len) {
            return Err(IdError::Configuration(format!(
                "random_hex_len must be between {} and {}, got {}",
                MIN_RANDOM_HEX_LEN, MAX_RANDOM_HEX_LEN, self.random_hex_len
            )));
        }
        if self.max_parent_len == 0 {
            return Err(IdError::Configuration(
                "max_parent_len must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
