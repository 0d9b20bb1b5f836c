//! Port trait definitions (Hexagonal Architecture)
//!
//! The pipeline reaches its two external collaborators only through these traits:
//! - ContentGenerator: produce content for one waypoint and worker kind
//! - ContentEvaluator: pick the best of several successful contents
//!
//! The Claude CLI adapters and the scripted test doubles both implement them.

pub mod evaluator;
pub mod generator;

pub use evaluator::ContentEvaluator;
pub use generator::ContentGenerator;
