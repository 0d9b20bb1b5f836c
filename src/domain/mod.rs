//! Domain layer for the tour guide pipeline
//!
//! Waypoints, generation results, decisions and the collaborator ports the
//! pipeline depends on. Nothing in here touches the runtime or the outside world.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{CollaboratorError, DomainError, PipelineError};
