//! Tracker configuration

use crate::error::{TrackerError, TrackerResult};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Component name attached to violation logs and metrics
    pub component: String,
    /// Number of leak events retained for inspection
    pub leak_history_capacity: usize,
    /// Leaked records older than this are reaped
    pub leak_max_age: Duration,
    pub sweep_interval: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            component: "resource-tracker".to_string(),
            leak_history_capacity: 1024,
            leak_max_age: Duration::from_secs(15 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl TrackerConfig {
    pub fn for_component(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            ..Default::default()
        }
    }

    /// Load configuration from environment variables, falling back to defaults
    ///
    /// - `TRACKER_COMPONENT`
    /// - `TRACKER_LEAK_HISTORY`
    /// - `TRACKER_LEAK_MAX_AGE_SECS`
    /// - `TRACKER_SWEEP_INTERVAL_SECS`
    pub fn from_env() -> TrackerResult<Self> {
        let defaults = Self::default();

        let component = std::env::var("TRACKER_COMPONENT").unwrap_or(defaults.component);

        let leak_history_capacity = std::env::var("TRACKER_LEAK_HISTORY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.leak_history_capacity);

        let leak_max_age = std::env::var("TRACKER_LEAK_MAX_AGE_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.leak_max_age);

        let sweep_interval = std::env::var("TRACKER_SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.sweep_interval);

        let config = Self {
            component,
            leak_history_capacity,
            leak_max_age,
            sweep_interval,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TrackerResult<()> {
        if self.component.trim().is_empty() {
            return Err(TrackerError::Configuration(
                "component must not be empty".to_string(),
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(TrackerError::Configuration(
                "sweep_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
