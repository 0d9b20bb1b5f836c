//! Tour Guide - parallel content curation for route waypoints
//!
//! For every waypoint of a route, one isolated worker per content kind
//! (video, music, history) generates a candidate under a deadline. An
//! aggregator groups the candidates per waypoint, asks an evaluator to pick
//! the best one, and falls back to a fixed priority when the evaluator
//! cannot be trusted. A supervisor owns the deadlines and guarantees one
//! decision per waypoint, whatever the collaborators do.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, errors and the collaborator ports
//! - **Application Layer** (`application`): channels, dispatcher, workers,
//!   aggregator and supervisor
//! - **Adapters** (`adapters`): scripted in-process collaborators
//! - **Infrastructure Layer** (`infrastructure`): configuration, logging and
//!   the Claude CLI substrate
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tour_guide::adapters::substrates::{EvaluatorScript, ScriptedEvaluator, ScriptedGenerator};
//! use tour_guide::domain::models::{Config, Coordinates, Waypoint, WaypointCategory};
//! use tour_guide::Supervisor;
//!
//! # async fn example() -> Result<(), tour_guide::PipelineError> {
//! let config = Config::default();
//! let supervisor = Supervisor::new(
//!     config.pipeline,
//!     config.degradation,
//!     Arc::new(ScriptedGenerator::new()),
//!     Arc::new(ScriptedEvaluator::new(EvaluatorScript::PickFirst)),
//! );
//! let route = vec![Waypoint::new(
//!     "Masada",
//!     Coordinates::new(31.3156, 35.3536),
//!     WaypointCategory::Historical,
//!     "Herod's desert fortress",
//! )];
//! let report = supervisor.run(&route).await?;
//! assert_eq!(report.decisions.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use application::Supervisor;
pub use domain::models::{
    Config, Decision, DegradationLevel, GenerationResult, PipelineConfig, PipelineEvent,
    RunReport, Waypoint, WorkerKind,
};
pub use domain::ports::{ContentEvaluator, ContentGenerator};
pub use domain::{CollaboratorError, PipelineError};
pub use infrastructure::config::{ConfigError, ConfigLoader};
