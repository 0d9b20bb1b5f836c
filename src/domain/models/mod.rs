pub mod config;
pub mod decision;
pub mod event;
pub mod generation;
pub mod report;
pub mod waypoint;

pub use config::{
    Config, DegradationThresholds, FallbackStrategy, LoggingConfig, PipelineConfig,
    PromptTemplates, RateLimitConfig, RetryConfig, SubstrateConfig,
};
pub use decision::{
    Decision, DegradationLevel, Evaluation, SelectionMethod, RATIONALE_ALL_FAILED,
    RATIONALE_ONLY_SUCCESS,
};
pub use event::{PipelineEvent, ShutdownReason, WorkerExit};
pub use generation::{
    clamp_score, ContentPayload, GeneratedContent, GenerationResult, GenerationStatus, WorkerKind,
    WorkerMessage,
};
pub use report::{RunReport, UnitTiming};
pub use waypoint::{Coordinates, Waypoint, WaypointCategory, WorkUnit, WorkUnitId};
