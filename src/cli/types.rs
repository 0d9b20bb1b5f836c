//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tour-guide")]
#[command(about = "Tour Guide - parallel content curation for route waypoints", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to .tour-guide/config.yaml + local.yaml)
    #[arg(short, long, global = true, env = "TOUR_GUIDE_CONFIG_PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Curate content for every waypoint in a route file using the Claude CLI
    Run {
        /// Route file: a JSON or YAML list of waypoints
        waypoints: PathBuf,
    },

    /// Run the pipeline against scripted collaborators
    Demo {
        /// Collaborator behaviour to simulate
        #[arg(short, long, value_enum, default_value_t = Scenario::Healthy)]
        scenario: Scenario,

        /// Number of built-in waypoints to curate
        #[arg(short, long, default_value = "5")]
        waypoints: usize,
    },

    /// Configuration commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Load and validate the configuration
    Validate,
}

/// Scripted collaborator behaviour for the demo command
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Every kind succeeds and the evaluator answers
    Healthy,
    /// Some kinds fail or hang, the evaluator sometimes reports a tie
    Flaky,
    /// The evaluator is down and one kind never answers
    Outage,
}
