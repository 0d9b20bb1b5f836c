//! In-process collaborator implementations.

pub mod mock;

pub use mock::{EvaluatorScript, ScriptedBehavior, ScriptedEvaluator, ScriptedGenerator};
