//! Claude Code substrate
//!
//! Shells out to the Claude Code CLI (`claude -p <prompt>`) for every
//! generation and evaluation call. The CLI must be installed and
//! authenticated separately.
//!
//! Every invocation is rate limited, retried on transient failures, and
//! bounded by a per-call timeout. A timed-out child receives SIGTERM, then
//! a kill after a short grace. Children are spawned with `kill_on_drop`, so
//! a caller that abandons the future never leaks a process.

use backoff::ExponentialBackoffBuilder;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use crate::domain::errors::CollaboratorError;
use crate::domain::models::{RateLimitConfig, RetryConfig, SubstrateConfig};

/// Errors from a single CLI invocation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubstrateError {
    #[error("Claude CLI unavailable: {0}")]
    Unavailable(String),

    #[error("Claude CLI execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Claude CLI timed out after {0:?}")]
    Timeout(Duration),

    #[error("Claude CLI returned an empty response")]
    EmptyResponse,
}

impl SubstrateError {
    /// Whether another attempt might succeed
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::ExecutionFailed(_) | Self::EmptyResponse)
    }
}

impl From<SubstrateError> for CollaboratorError {
    fn from(err: SubstrateError) -> Self {
        match err {
            SubstrateError::Unavailable(msg) => Self::Unavailable(msg),
            SubstrateError::ExecutionFailed(msg) => Self::Failed(msg),
            SubstrateError::Timeout(after) => Self::Timeout(after),
            SubstrateError::EmptyResponse => Self::Malformed("empty response".to_string()),
        }
    }
}

/// Runtime settings for the CLI substrate
#[derive(Debug, Clone)]
pub struct ClaudeCodeConfig {
    /// Path to claude CLI executable (defaults to "claude" in PATH)
    pub claude_path: String,

    /// Optional `--model` argument
    pub model: Option<String>,

    /// Working directory for claude execution (defaults to current dir)
    pub working_dir: Option<PathBuf>,

    pub call_timeout: Duration,
    pub kill_grace: Duration,
}

impl Default for ClaudeCodeConfig {
    fn default() -> Self {
        Self::from(&SubstrateConfig::default())
    }
}

impl From<&SubstrateConfig> for ClaudeCodeConfig {
    fn from(config: &SubstrateConfig) -> Self {
        Self {
            claude_path: config.claude_path.clone(),
            model: config.model.clone(),
            working_dir: config.working_dir.as_ref().map(PathBuf::from),
            call_timeout: Duration::from_secs(config.timeout_secs),
            kill_grace: Duration::from_millis(config.kill_grace_ms),
        }
    }
}

/// Claude Code CLI substrate shared by every worker and the evaluator
pub struct ClaudeCodeSubstrate {
    config: ClaudeCodeConfig,
    retry: RetryConfig,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl ClaudeCodeSubstrate {
    pub fn new(config: ClaudeCodeConfig, retry: RetryConfig, rate_limit: &RateLimitConfig) -> Self {
        Self {
            config,
            retry,
            limiter: Arc::new(RateLimiter::direct(quota_for(rate_limit))),
        }
    }

    pub fn from_settings(
        substrate: &SubstrateConfig,
        retry: &RetryConfig,
        rate_limit: &RateLimitConfig,
    ) -> Self {
        Self::new(ClaudeCodeConfig::from(substrate), retry.clone(), rate_limit)
    }

    pub const fn config(&self) -> &ClaudeCodeConfig {
        &self.config
    }

    /// Check if claude CLI is available
    pub async fn is_available(&self) -> bool {
        Command::new(&self.config.claude_path)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    /// Send a prompt and return the trimmed stdout of the CLI.
    ///
    /// Transient failures are retried with exponential backoff up to
    /// `max_retries` extra attempts.
    pub async fn complete(&self, prompt: &str) -> Result<String, SubstrateError> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.retry.initial_backoff_ms))
            .with_max_interval(Duration::from_millis(self.retry.max_backoff_ms))
            .with_max_elapsed_time(None)
            .build();

        let max_attempts = self.retry.max_retries.saturating_add(1);
        let mut attempt = 0u32;

        backoff::future::retry(policy, || {
            attempt += 1;
            let current = attempt;
            async move {
                self.limiter.until_ready().await;
                match self.invoke(prompt).await {
                    Ok(output) => Ok(output),
                    Err(err) if err.is_transient() && current < max_attempts => {
                        warn!(attempt = current, error = %err, "Claude CLI call failed, retrying");
                        Err(backoff::Error::transient(err))
                    }
                    Err(err) => Err(backoff::Error::permanent(err)),
                }
            }
        })
        .await
    }

    fn build_command(&self, prompt: &str) -> Command {
        let mut cmd = Command::new(&self.config.claude_path);

        if let Some(ref wd) = self.config.working_dir {
            cmd.current_dir(wd);
        }
        if let Some(ref model) = self.config.model {
            cmd.arg("--model").arg(model);
        }

        cmd.arg("-p")
            .arg(prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        cmd
    }

    async fn invoke(&self, prompt: &str) -> Result<String, SubstrateError> {
        debug!(prompt_len = prompt.len(), "Calling Claude CLI");

        let mut child = self.build_command(prompt).spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SubstrateError::Unavailable(format!(
                    "Claude CLI not found at: {}. Please install Claude Code CLI.",
                    self.config.claude_path
                ))
            } else {
                SubstrateError::ExecutionFailed(format!("Failed to spawn claude CLI: {e}"))
            }
        })?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| SubstrateError::ExecutionFailed("Failed to get stdout handle".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| SubstrateError::ExecutionFailed("Failed to get stderr handle".to_string()))?;

        let result = timeout(self.config.call_timeout, async {
            let mut out = Vec::new();
            let mut err = Vec::new();
            let (read_out, read_err) =
                tokio::join!(stdout.read_to_end(&mut out), stderr.read_to_end(&mut err));
            read_out
                .and(read_err)
                .map_err(|e| SubstrateError::ExecutionFailed(format!("Failed to read output: {e}")))?;

            let status = child.wait().await.map_err(|e| {
                SubstrateError::ExecutionFailed(format!("Failed to wait for process: {e}"))
            })?;
            Ok::<_, SubstrateError>((status, out, err))
        })
        .await;

        match result {
            Ok(Ok((status, out, err))) => {
                if !status.success() {
                    return Err(SubstrateError::ExecutionFailed(format!(
                        "Claude CLI exited with code {:?}. Stderr: {}",
                        status.code(),
                        String::from_utf8_lossy(&err).trim()
                    )));
                }
                let response = String::from_utf8_lossy(&out).trim().to_string();
                if response.is_empty() {
                    return Err(SubstrateError::EmptyResponse);
                }
                debug!(response_len = response.len(), "Claude CLI responded");
                Ok(response)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(timeout = ?self.config.call_timeout, "Claude CLI timed out, terminating");
                terminate(&mut child, self.config.kill_grace).await;
                Err(SubstrateError::Timeout(self.config.call_timeout))
            }
        }
    }
}

/// SIGTERM first, kill if the child is still around after `grace`
async fn terminate(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    if let Some(pid) = child.id().and_then(|id| i32::try_from(id).ok()) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if kill(Pid::from_raw(pid), Signal::SIGTERM).is_ok()
            && timeout(grace, child.wait()).await.is_ok()
        {
            return;
        }
    }

    if let Err(e) = child.kill().await {
        warn!(error = %e, "Failed to kill Claude CLI process");
    }
}

fn quota_for(rate_limit: &RateLimitConfig) -> Quota {
    let burst = NonZeroU32::new(rate_limit.burst_size).unwrap_or(NonZeroU32::MIN);
    let period = if rate_limit.requests_per_second.is_finite() && rate_limit.requests_per_second > 0.0 {
        Duration::from_secs_f64(1.0 / rate_limit.requests_per_second)
    } else {
        Duration::from_secs(1)
    };

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
        .allow_burst(burst)
}
