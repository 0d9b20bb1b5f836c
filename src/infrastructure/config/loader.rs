use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::collections::HashSet;
use thiserror::Error;

use crate::domain::models::config::{Config, DegradationThresholds, PipelineConfig};

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No worker kinds configured")]
    NoWorkerKinds,

    #[error("Worker kind '{0}' is configured more than once")]
    DuplicateWorkerKind(String),

    #[error("fallback_priority does not cover worker kind '{0}'")]
    PriorityMissingKind(String),

    #[error("Invalid {0}: must be greater than 0")]
    ZeroValue(&'static str),

    #[error("Invalid degradation thresholds: need 1 >= full > partial > degraded > 0 (got {full}, {partial}, {degraded})")]
    InvalidThresholds { full: f64, partial: f64, degraded: f64 },

    #[error("Deadline nesting violated: {inner} ({inner_secs}s) must be {relation} {outer} ({outer_secs}s)")]
    DeadlineNesting {
        inner: &'static str,
        inner_secs: u64,
        relation: &'static str,
        outer: &'static str,
        outer_secs: u64,
    },

    #[error("Invalid rate limit: {0}. Must be positive")]
    InvalidRateLimit(f64),

    #[error("Invalid burst_size: {0}. Must be at least 1")]
    InvalidBurstSize(u32),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be positive and not exceed max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Environment variable holding an explicit config file path
    pub const PATH_ENV: &'static str = "TOUR_GUIDE_CONFIG_PATH";

    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .tour-guide/config.yaml (project config)
    /// 3. .tour-guide/local.yaml (local overrides, optional)
    /// 4. Environment variables (TOUR_GUIDE_* prefix, `__` separates nested keys)
    pub fn load() -> Result<Config> {
        if let Ok(path) = std::env::var(Self::PATH_ENV) {
            return Self::load_from_file(path);
        }

        let config: Config = Self::base()
            .merge(Yaml::file(".tour-guide/config.yaml"))
            .merge(Yaml::file(".tour-guide/local.yaml"))
            .merge(Self::env())
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file; environment overrides still apply
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }

        let config: Config = Self::base()
            .merge(Yaml::file(path))
            .merge(Self::env())
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn base() -> Figment {
        Figment::new().merge(Serialized::defaults(Config::default()))
    }

    fn env() -> Env {
        Env::prefixed("TOUR_GUIDE_")
            .ignore(&["CONFIG_PATH"])
            .split("__")
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        Self::validate_pipeline(&config.pipeline)?;
        Self::validate_thresholds(&config.degradation)?;

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidLogRotation(config.logging.rotation.clone()));
        }

        if config.logging.max_files == 0 {
            return Err(ConfigError::ZeroValue("logging.max_files"));
        }

        if config.substrate.claude_path.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "substrate.claude_path cannot be empty".to_string(),
            ));
        }

        if config.substrate.timeout_secs == 0 {
            return Err(ConfigError::ZeroValue("substrate.timeout_secs"));
        }

        if !(config.rate_limit.requests_per_second.is_finite()
            && config.rate_limit.requests_per_second > 0.0)
        {
            return Err(ConfigError::InvalidRateLimit(
                config.rate_limit.requests_per_second,
            ));
        }

        if config.rate_limit.burst_size == 0 {
            return Err(ConfigError::InvalidBurstSize(config.rate_limit.burst_size));
        }

        if config.retry.initial_backoff_ms == 0
            || config.retry.initial_backoff_ms > config.retry.max_backoff_ms
        {
            return Err(ConfigError::InvalidBackoff(
                config.retry.initial_backoff_ms,
                config.retry.max_backoff_ms,
            ));
        }

        Ok(())
    }

    fn validate_pipeline(pipeline: &PipelineConfig) -> Result<(), ConfigError> {
        if pipeline.kinds.is_empty() {
            return Err(ConfigError::NoWorkerKinds);
        }

        let mut seen = HashSet::new();
        for kind in &pipeline.kinds {
            if !seen.insert(kind) {
                return Err(ConfigError::DuplicateWorkerKind(kind.to_string()));
            }
        }

        if let Some(missing) = pipeline
            .kinds
            .iter()
            .find(|k| !pipeline.fallback_priority.contains(k))
        {
            return Err(ConfigError::PriorityMissingKind(missing.to_string()));
        }

        let non_zero = [
            ("pipeline.run_timeout_secs", pipeline.run_timeout_secs),
            ("pipeline.discovery_timeout_secs", pipeline.discovery_timeout_secs),
            ("pipeline.generation_timeout_secs", pipeline.generation_timeout_secs),
            ("pipeline.evaluation_timeout_secs", pipeline.evaluation_timeout_secs),
            ("pipeline.collection_timeout_secs", pipeline.collection_timeout_secs),
            ("pipeline.send_timeout_secs", pipeline.send_timeout_secs),
            ("pipeline.poll_interval_ms", pipeline.poll_interval_ms),
        ];
        for (name, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::ZeroValue(name));
            }
        }

        let capacities = [
            ("pipeline.intake_capacity", pipeline.intake_capacity),
            ("pipeline.collection_capacity", pipeline.collection_capacity),
            ("pipeline.max_waypoints", pipeline.max_waypoints),
        ];
        for (name, value) in capacities {
            if value == 0 {
                return Err(ConfigError::ZeroValue(name));
            }
        }

        let nesting = [
            (
                ("generation_timeout_secs", pipeline.generation_timeout_secs),
                "less than",
                ("discovery_timeout_secs", pipeline.discovery_timeout_secs),
                pipeline.generation_timeout_secs < pipeline.discovery_timeout_secs,
            ),
            (
                ("evaluation_timeout_secs", pipeline.evaluation_timeout_secs),
                "less than",
                ("discovery_timeout_secs", pipeline.discovery_timeout_secs),
                pipeline.evaluation_timeout_secs < pipeline.discovery_timeout_secs,
            ),
            (
                ("discovery_timeout_secs", pipeline.discovery_timeout_secs),
                "at most",
                ("run_timeout_secs", pipeline.run_timeout_secs),
                pipeline.discovery_timeout_secs <= pipeline.run_timeout_secs,
            ),
            (
                ("generation_timeout_secs", pipeline.generation_timeout_secs),
                "at most",
                ("collection_timeout_secs", pipeline.collection_timeout_secs),
                pipeline.generation_timeout_secs <= pipeline.collection_timeout_secs,
            ),
            (
                ("generation_timeout_secs", pipeline.generation_timeout_secs),
                "at most",
                ("send_timeout_secs", pipeline.send_timeout_secs),
                pipeline.generation_timeout_secs <= pipeline.send_timeout_secs,
            ),
            (
                (
                    "discovery_timeout_secs + shutdown_grace_secs",
                    pipeline
                        .discovery_timeout_secs
                        .saturating_add(pipeline.shutdown_grace_secs),
                ),
                "at most",
                ("run_timeout_secs", pipeline.run_timeout_secs),
                pipeline
                    .discovery_timeout_secs
                    .saturating_add(pipeline.shutdown_grace_secs)
                    <= pipeline.run_timeout_secs,
            ),
        ];
        for ((inner, inner_secs), relation, (outer, outer_secs), holds) in nesting {
            if !holds {
                return Err(ConfigError::DeadlineNesting {
                    inner,
                    inner_secs,
                    relation,
                    outer,
                    outer_secs,
                });
            }
        }

        Ok(())
    }

    fn validate_thresholds(t: &DegradationThresholds) -> Result<(), ConfigError> {
        let ordered = t.full <= 1.0 && t.full > t.partial && t.partial > t.degraded && t.degraded > 0.0;
        if ordered {
            Ok(())
        } else {
            Err(ConfigError::InvalidThresholds {
                full: t.full,
                partial: t.partial,
                degraded: t.degraded,
            })
        }
    }
}
