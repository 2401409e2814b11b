//! Animator configuration

use crate::error::{AnimationError, Result};
use glide_core::ExceptionPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for an [`Animator`](crate::Animator).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimatorConfig {
    /// Time between passes of the background timer (ms).
    pub interval_ms: u64,
    /// Longest wait for an animation's update lock before skipping the tick (ms).
    pub lock_timeout_ms: u64,
    /// Whether timer passes run ticks on the worker pool.
    pub update_on_pool: bool,
    /// Worker pool size; 0 lets rayon decide.
    pub worker_threads: usize,
    /// When false, `animate` writes the target immediately.
    pub enabled: bool,
    /// Treat single-core hosts as disabled.
    pub disable_on_single_core: bool,
    /// Start the background timer on the first `animate`.
    pub auto_start: bool,
    /// Capacity of the diagnostics ring buffer.
    pub max_diagnostics: usize,
    /// Policy for requests that don't set one.
    pub default_policy: ExceptionPolicy,
}

impl Default for AnimatorConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl AnimatorConfig {
    /// Standard configuration for general use.
    pub fn standard() -> Self {
        Self {
            interval_ms: 22,
            lock_timeout_ms: 7_000,
            update_on_pool: true,
            worker_threads: 0,
            enabled: true,
            disable_on_single_core: true,
            auto_start: true,
            max_diagnostics: 256,
            default_policy: ExceptionPolicy::Log,
        }
    }

    /// Testing configuration: inline ticks, no timer, no host checks.
    pub fn testing() -> Self {
        Self {
            interval_ms: 16,
            lock_timeout_ms: 2_000,
            update_on_pool: false,
            worker_threads: 2,
            enabled: true,
            disable_on_single_core: false,
            auto_start: false,
            max_diagnostics: 1_024,
            default_policy: ExceptionPolicy::Log,
        }
    }

    /// Parse from TOML; missing keys take their standard values.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| AnimationError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| AnimationError::Config(e.to_string()))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Whether animations actually run on this host
    pub fn animations_enabled(&self) -> bool {
        if !self.enabled {
            return false;
        }
        if self.disable_on_single_core {
            let cores = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1);
            return cores > 1;
        }
        true
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_update_on_pool(mut self, on_pool: bool) -> Self {
        self.update_on_pool = on_pool;
        self
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_disable_on_single_core(mut self, disable: bool) -> Self {
        self.disable_on_single_core = disable;
        self
    }

    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    pub fn with_max_diagnostics(mut self, max: usize) -> Self {
        self.max_diagnostics = max;
        self
    }

    pub fn with_default_policy(mut self, policy: ExceptionPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(AnimationError::Config("interval_ms must be positive".into()));
        }
        Ok(())
    }

    /// Validated copy, for builders that accept user input
    pub fn checked(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_defaults() {
        let config = AnimatorConfig::default();
        assert_eq!(config.interval(), Duration::from_millis(22));
        assert_eq!(config.lock_timeout(), Duration::from_secs(7));
        assert!(config.update_on_pool);
        assert_eq!(config.default_policy, ExceptionPolicy::Log);
    }

    #[test]
    fn test_from_toml_partial() {
        let config = AnimatorConfig::from_toml_str(
            r#"
            interval_ms = 10
            update_on_pool = false
            default_policy = "silent"
            "#,
        )
        .unwrap();

        assert_eq!(config.interval_ms, 10);
        assert!(!config.update_on_pool);
        assert_eq!(config.default_policy, ExceptionPolicy::Silent);
        assert_eq!(config.lock_timeout_ms, 7_000);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = AnimatorConfig::testing().with_max_diagnostics(8);
        let text = config.to_toml_string().unwrap();
        assert_eq!(AnimatorConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid_toml() {
        let err = AnimatorConfig::from_toml_str("interval_ms = \"fast\"").unwrap_err();
        assert!(matches!(err, AnimationError::Config(_)));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = AnimatorConfig::testing()
            .with_interval(Duration::ZERO)
            .checked()
            .unwrap_err();
        assert!(matches!(err, AnimationError::Config(_)));
    }

    #[test]
    fn test_disabled() {
        assert!(!AnimatorConfig::testing().with_enabled(false).animations_enabled());
        assert!(AnimatorConfig::testing().animations_enabled());
    }
}
