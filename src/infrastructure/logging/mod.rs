//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - JSON or pretty console output
//! - Rolling JSON log files with bounded retention

pub mod logger;

pub use logger::LoggerImpl;
