//! CLI command implementations.

pub mod config;
pub mod demo;
pub mod run;

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use crate::application::Supervisor;
use crate::cli::output::{create_progress_bar, track_run, CommandOutput, ReportFormatter};
use crate::domain::models::{Config, RunReport, Waypoint};
use crate::infrastructure::config::ConfigLoader;

/// Load the explicit config file if given, the project hierarchy otherwise
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// A finished run, printed as a decision table or as the full JSON report
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct RunOutput {
    pub report: RunReport,
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        ReportFormatter::new().format_report(&self.report)
    }
}

/// Run the supervisor with a progress bar fed by its event stream
pub async fn execute_pipeline(
    supervisor: Supervisor,
    waypoints: &[Waypoint],
    json_mode: bool,
) -> Result<RunReport> {
    let visible = !json_mode && console::Term::stderr().is_term();
    let pb = create_progress_bar(waypoints.len() as u64, visible);
    let tracker = track_run(supervisor.subscribe(), pb);

    let result = supervisor.run(waypoints).await;
    // Closing the event stream ends the tracker on the error path
    drop(supervisor);
    let _ = tracker.await;

    result.context("Pipeline run failed")
}
