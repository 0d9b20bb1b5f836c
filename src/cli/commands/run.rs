//! Implementation of the `tour-guide run` command.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::{execute_pipeline, load_config, RunOutput};
use crate::application::Supervisor;
use crate::cli::output::output;
use crate::domain::models::Waypoint;
use crate::infrastructure::substrates::{
    ClaudeCodeSubstrate, ClaudeContentEvaluator, ClaudeContentGenerator,
};

/// A route file is either a bare list or an object with a `waypoints` list
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RouteFile {
    List(Vec<Waypoint>),
    Route { waypoints: Vec<Waypoint> },
}

impl RouteFile {
    fn into_waypoints(self) -> Vec<Waypoint> {
        match self {
            Self::List(waypoints) | Self::Route { waypoints } => waypoints,
        }
    }
}

/// Read waypoints from JSON (`.json`) or YAML (anything else)
pub fn load_waypoints(path: &Path) -> Result<Vec<Waypoint>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read route file {}", path.display()))?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let route: RouteFile = if is_json {
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid JSON route file {}", path.display()))?
    } else {
        serde_yaml::from_str(&raw)
            .with_context(|| format!("Invalid YAML route file {}", path.display()))?
    };

    Ok(route.into_waypoints())
}

pub async fn execute(waypoints_path: &Path, config_path: Option<&Path>, json_mode: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let waypoints = load_waypoints(waypoints_path)?;

    let substrate = Arc::new(ClaudeCodeSubstrate::from_settings(
        &config.substrate,
        &config.retry,
        &config.rate_limit,
    ));
    if !substrate.is_available().await {
        anyhow::bail!(
            "Claude CLI not found at '{}'. Install Claude Code or set substrate.claude_path.",
            config.substrate.claude_path
        );
    }

    info!(
        route = %waypoints_path.display(),
        waypoints = waypoints.len(),
        "Curating route with the Claude CLI"
    );

    let supervisor = Supervisor::new(
        config.pipeline.clone(),
        config.degradation,
        Arc::new(ClaudeContentGenerator::new(
            Arc::clone(&substrate),
            &config.substrate.prompts,
        )),
        Arc::new(ClaudeContentEvaluator::new(substrate, &config.substrate.prompts)),
    );

    let report = execute_pipeline(supervisor, &waypoints, json_mode).await?;
    output(&RunOutput { report }, json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        write!(file, "{contents}").unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_json_list() {
        let file = write_file(
            ".json",
            r#"[{"name": "Masada", "coordinates": {"lat": 31.3156, "lon": 35.3536}, "category": "historical"}]"#,
        );
        let waypoints = load_waypoints(file.path()).unwrap();
        assert_eq!(waypoints.len(), 1);
        assert_eq!(waypoints[0].name, "Masada");
        assert!(waypoints[0].description.is_empty());
    }

    #[test]
    fn test_load_yaml_route_object() {
        let file = write_file(
            ".yaml",
            "waypoints:\n  - name: Ein Gedi\n    coordinates: {lat: 31.4617, lon: 35.3878}\n    category: natural\n    distance_from_start_km: 95.5\n",
        );
        let waypoints = load_waypoints(file.path()).unwrap();
        assert_eq!(waypoints[0].name, "Ein Gedi");
        assert!((waypoints[0].distance_from_start_km - 95.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let file = write_file(".json", "{\"route\": 5}");
        assert!(load_waypoints(file.path()).is_err());
        assert!(load_waypoints(Path::new("/no/such/route.json")).is_err());
    }
}
