use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::waypoint::WorkUnitId;
use crate::domain::errors::DomainError;

/// Content generation strategy a worker runs
///
/// The set is fixed; each kind runs in its own isolated worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerKind {
    /// A video suggestion for the waypoint
    Video,
    /// A song or album that fits the waypoint
    Music,
    /// A historical narrative about the waypoint
    History,
}

impl WorkerKind {
    /// All kinds in declaration order
    pub const ALL: [Self; 3] = [Self::Video, Self::Music, Self::History];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Music => "music",
            Self::History => "history",
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "video" | "youtube" => Ok(Self::Video),
            "music" | "spotify" => Ok(Self::Music),
            "history" => Ok(Self::History),
            _ => Err(DomainError::ValidationFailed(format!(
                "Invalid worker kind: {s}"
            ))),
        }
    }
}

/// Outcome of one generation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Success,
    Failure,
    Timeout,
}

impl fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Content produced for a waypoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPayload {
    pub title: String,

    /// Description, or the full text for narrative content
    pub body: String,

    /// Kind-specific extras (channel, artist, key facts, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ContentPayload {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            metadata: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// What the generation collaborator hands back on success
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub payload: ContentPayload,

    /// Relevance to the waypoint, 0-100
    pub relevance_score: f64,
}

impl GeneratedContent {
    pub fn new(payload: ContentPayload, relevance_score: f64) -> Self {
        Self {
            payload,
            relevance_score: clamp_score(relevance_score),
        }
    }
}

/// Clamp a relevance score into 0-100, mapping NaN to 0
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 100.0)
    }
}

/// Exactly one of these exists per (work unit, worker kind) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub unit_id: WorkUnitId,
    pub kind: WorkerKind,
    pub status: GenerationStatus,

    /// Present only on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<GeneratedContent>,

    /// Present on failure and timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(with = "duration_millis")]
    pub elapsed: Duration,

    /// Produced by the supervisor or aggregator rather than by the worker itself
    #[serde(default)]
    pub synthetic: bool,
}

impl GenerationResult {
    pub fn success(
        unit_id: WorkUnitId,
        kind: WorkerKind,
        content: GeneratedContent,
        elapsed: Duration,
    ) -> Self {
        Self {
            unit_id,
            kind,
            status: GenerationStatus::Success,
            content: Some(content),
            error: None,
            elapsed,
            synthetic: false,
        }
    }

    pub fn failure(
        unit_id: WorkUnitId,
        kind: WorkerKind,
        error: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            unit_id,
            kind,
            status: GenerationStatus::Failure,
            content: None,
            error: Some(error.into()),
            elapsed,
            synthetic: false,
        }
    }

    pub fn timeout(
        unit_id: WorkUnitId,
        kind: WorkerKind,
        error: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            unit_id,
            kind,
            status: GenerationStatus::Timeout,
            content: None,
            error: Some(error.into()),
            elapsed,
            synthetic: false,
        }
    }

    #[must_use]
    pub const fn into_synthetic(mut self) -> Self {
        self.synthetic = true;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == GenerationStatus::Success && self.content.is_some()
    }

    pub fn relevance_score(&self) -> f64 {
        self.content.as_ref().map_or(0.0, |c| c.relevance_score)
    }
}

/// What a worker puts on the collection channel
///
/// `Started` marks the moment a kind picked a unit up; the unit's collection
/// deadline is only armed once every kind has done so.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMessage {
    Started { unit_id: WorkUnitId, kind: WorkerKind },
    Finished(GenerationResult),
}

impl From<GenerationResult> for WorkerMessage {
    fn from(result: GenerationResult) -> Self {
        Self::Finished(result)
    }
}

/// Serialize a `Duration` as integer milliseconds
pub mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
