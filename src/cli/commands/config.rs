//! Implementation of the `tour-guide config` commands.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use super::load_config;
use crate::cli::output::{output, CommandOutput};
use crate::cli::types::ConfigCommands;
use crate::domain::models::Config;

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct ConfigShowOutput {
    pub config: Config,
}

impl CommandOutput for ConfigShowOutput {
    fn to_human(&self) -> String {
        serde_yaml::to_string(&self.config)
            .unwrap_or_else(|e| format!("Failed to render configuration: {e}"))
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigValidateOutput {
    pub valid: bool,
    pub source: String,
    pub kinds: Vec<String>,
    pub run_timeout_secs: u64,
    pub discovery_timeout_secs: u64,
    pub generation_timeout_secs: u64,
    pub evaluation_timeout_secs: u64,
}

impl CommandOutput for ConfigValidateOutput {
    fn to_human(&self) -> String {
        format!(
            "Configuration is valid ({})\n  kinds: {}\n  deadlines: run {}s > discovery {}s > generation {}s, evaluation {}s",
            self.source,
            self.kinds.join(", "),
            self.run_timeout_secs,
            self.discovery_timeout_secs,
            self.generation_timeout_secs,
            self.evaluation_timeout_secs
        )
    }
}

pub fn execute(command: &ConfigCommands, config_path: Option<&Path>, json_mode: bool) -> Result<()> {
    let config = load_config(config_path).context("Configuration is invalid")?;

    match command {
        ConfigCommands::Show => output(&ConfigShowOutput { config }, json_mode),
        ConfigCommands::Validate => {
            let source = config_path.map_or_else(
                || ".tour-guide/config.yaml (+ local.yaml, TOUR_GUIDE_* env)".to_string(),
                |p| p.display().to_string(),
            );
            let pipeline = &config.pipeline;
            output(
                &ConfigValidateOutput {
                    valid: true,
                    source,
                    kinds: pipeline.kinds.iter().map(ToString::to_string).collect(),
                    run_timeout_secs: pipeline.run_timeout_secs,
                    discovery_timeout_secs: pipeline.discovery_timeout_secs,
                    generation_timeout_secs: pipeline.generation_timeout_secs,
                    evaluation_timeout_secs: pipeline.evaluation_timeout_secs,
                },
                json_mode,
            );
        }
    }
    Ok(())
}
