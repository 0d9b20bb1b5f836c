use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::generation::WorkerKind;

/// Main configuration structure for the tour guide
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Pipeline deadlines, capacities and selection policy
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Degradation classification thresholds
    #[serde(default)]
    pub degradation: DegradationThresholds,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Reasoning service (claude CLI) configuration
    #[serde(default)]
    pub substrate: SubstrateConfig,

    /// Retry policy for reasoning service calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Rate limiting for reasoning service calls
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// Policy applied when the evaluator cannot be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// First presented kind in `fallback_priority` order
    #[default]
    Priority,
    /// Highest relevance score, priority order breaks ties
    HighestScore,
}

impl fmt::Display for FallbackStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Priority => write!(f, "priority"),
            Self::HighestScore => write!(f, "highest_score"),
        }
    }
}

/// Pipeline configuration
///
/// Deadlines nest from outer to inner: run, discovery, collection,
/// generation and evaluation. The loader checks the nesting at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// Worker kinds to run, one isolated worker each
    #[serde(default = "default_kinds")]
    pub kinds: Vec<WorkerKind>,

    /// Preference order used by fallback and tie-breaking
    #[serde(default = "default_fallback_priority")]
    pub fallback_priority: Vec<WorkerKind>,

    #[serde(default)]
    pub fallback_strategy: FallbackStrategy,

    /// Overall run deadline
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,

    /// Content discovery stage deadline (dispatch + generation)
    #[serde(default = "default_discovery_timeout_secs")]
    pub discovery_timeout_secs: u64,

    /// Per-unit generation deadline
    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,

    /// Per-unit evaluation deadline
    #[serde(default = "default_evaluation_timeout_secs")]
    pub evaluation_timeout_secs: u64,

    /// Per-unit collection deadline, counted from the last kind to pick the unit up
    #[serde(default = "default_collection_timeout_secs")]
    pub collection_timeout_secs: u64,

    /// Grace period between closing intakes and force-terminating workers
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// How long a producer waits for channel capacity
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,

    /// Worker receive poll interval, doubles as heartbeat period
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_intake_capacity")]
    pub intake_capacity: usize,

    #[serde(default = "default_collection_capacity")]
    pub collection_capacity: usize,

    /// Largest route accepted by a single run
    #[serde(default = "default_max_waypoints")]
    pub max_waypoints: usize,
}

fn default_kinds() -> Vec<WorkerKind> {
    WorkerKind::ALL.to_vec()
}

fn default_fallback_priority() -> Vec<WorkerKind> {
    vec![WorkerKind::History, WorkerKind::Video, WorkerKind::Music]
}

const fn default_run_timeout_secs() -> u64 {
    180
}

const fn default_discovery_timeout_secs() -> u64 {
    150
}

const fn default_generation_timeout_secs() -> u64 {
    30
}

const fn default_evaluation_timeout_secs() -> u64 {
    10
}

const fn default_collection_timeout_secs() -> u64 {
    35
}

const fn default_shutdown_grace_secs() -> u64 {
    5
}

const fn default_send_timeout_secs() -> u64 {
    35
}

const fn default_poll_interval_ms() -> u64 {
    250
}

const fn default_intake_capacity() -> usize {
    10
}

const fn default_collection_capacity() -> usize {
    30
}

const fn default_max_waypoints() -> usize {
    10
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            kinds: default_kinds(),
            fallback_priority: default_fallback_priority(),
            fallback_strategy: FallbackStrategy::default(),
            run_timeout_secs: default_run_timeout_secs(),
            discovery_timeout_secs: default_discovery_timeout_secs(),
            generation_timeout_secs: default_generation_timeout_secs(),
            evaluation_timeout_secs: default_evaluation_timeout_secs(),
            collection_timeout_secs: default_collection_timeout_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            send_timeout_secs: default_send_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            intake_capacity: default_intake_capacity(),
            collection_capacity: default_collection_capacity(),
            max_waypoints: default_max_waypoints(),
        }
    }
}

impl PipelineConfig {
    pub const fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    pub const fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }

    pub const fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    pub const fn evaluation_timeout(&self) -> Duration {
        Duration::from_secs(self.evaluation_timeout_secs)
    }

    pub const fn collection_timeout(&self) -> Duration {
        Duration::from_secs(self.collection_timeout_secs)
    }

    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub const fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Fallback order restricted to the configured kinds.
    ///
    /// Kinds missing from `fallback_priority` are appended in configured order.
    pub fn effective_priority(&self) -> Vec<WorkerKind> {
        let mut order: Vec<WorkerKind> = self
            .fallback_priority
            .iter()
            .copied()
            .filter(|k| self.kinds.contains(k))
            .collect();
        for kind in &self.kinds {
            if !order.contains(kind) {
                order.push(*kind);
            }
        }
        order
    }
}

/// Thresholds on the ratio of units with content
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DegradationThresholds {
    #[serde(default = "default_full_threshold")]
    pub full: f64,

    #[serde(default = "default_partial_threshold")]
    pub partial: f64,

    #[serde(default = "default_degraded_threshold")]
    pub degraded: f64,
}

const fn default_full_threshold() -> f64 {
    0.9
}

const fn default_partial_threshold() -> f64 {
    0.7
}

const fn default_degraded_threshold() -> f64 {
    0.5
}

impl Default for DegradationThresholds {
    fn default() -> Self {
        Self {
            full: default_full_threshold(),
            partial: default_partial_threshold(),
            degraded: default_degraded_threshold(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,

    /// Also write to stdout when a log directory is set
    #[serde(default = "default_enable_stdout")]
    pub enable_stdout: bool,

    /// Rotation: daily, hourly, never
    #[serde(default = "default_rotation")]
    pub rotation: String,

    /// Number of rotated files to keep
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

const fn default_enable_stdout() -> bool {
    true
}

fn default_rotation() -> String {
    "daily".to_string()
}

const fn default_max_files() -> usize {
    5
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            enable_stdout: default_enable_stdout(),
            rotation: default_rotation(),
            max_files: default_max_files(),
        }
    }
}

/// Claude CLI substrate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SubstrateConfig {
    /// Path to claude CLI executable
    #[serde(default = "default_claude_path")]
    pub claude_path: String,

    /// Model override passed as `--model`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Working directory for claude execution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,

    /// Per-invocation timeout in seconds
    #[serde(default = "default_claude_timeout")]
    pub timeout_secs: u64,

    /// Wait between SIGTERM and kill for a timed-out invocation
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,

    /// Prompt template overrides
    #[serde(default)]
    pub prompts: PromptTemplates,
}

fn default_claude_path() -> String {
    "claude".to_string()
}

const fn default_claude_timeout() -> u64 {
    25
}

const fn default_kill_grace_ms() -> u64 {
    2000
}

impl Default for SubstrateConfig {
    fn default() -> Self {
        Self {
            claude_path: default_claude_path(),
            model: None,
            working_dir: None,
            timeout_secs: default_claude_timeout(),
            kill_grace_ms: default_kill_grace_ms(),
            prompts: PromptTemplates::default(),
        }
    }
}

/// Prompt template overrides, one per worker kind plus the evaluator.
///
/// Templates use `{name}`, `{category}`, `{lat}`, `{lon}`, `{description}`
/// and, for the evaluator, `{candidates}` placeholders. Unset entries fall
/// back to the built-in templates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PromptTemplates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<String>,
}

impl PromptTemplates {
    pub fn for_kind(&self, kind: WorkerKind) -> Option<&str> {
        match kind {
            WorkerKind::Video => self.video.as_deref(),
            WorkerKind::Music => self.music.as_deref(),
            WorkerKind::History => self.history.as_deref(),
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RateLimitConfig {
    /// Requests per second allowed
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,

    /// Burst size for token bucket
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,
}

const fn default_requests_per_second() -> f64 {
    2.0
}

const fn default_burst_size() -> u32 {
    6
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
            burst_size: default_burst_size(),
        }
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_retries() -> u32 {
    2
}

const fn default_initial_backoff_ms() -> u64 {
    500
}

const fn default_max_backoff_ms() -> u64 {
    5_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}
