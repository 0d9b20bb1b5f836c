//! Infrastructure layer module
//!
//! Adapters to the outside world:
//! - Configuration management (figment)
//! - Logging infrastructure (tracing)
//! - Claude CLI substrate and the collaborators built on it

pub mod config;
pub mod logging;
pub mod substrates;
