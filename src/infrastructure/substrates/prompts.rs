//! Built-in prompt templates and placeholder rendering.

use std::collections::BTreeMap;

use crate::domain::models::{ContentPayload, WorkUnit, WorkerKind};

pub const VIDEO_PROMPT: &str = r#"You are a video content curator. Find the most relevant video for someone visiting this location.

Location:
- Name: {name}
- Category: {category}
- Coordinates: {lat}, {lon}
- Description: {description}

Suggest ONE highly relevant video (documentary, travel guide, cultural feature or architectural tour).

Respond with JSON only:
{"video": {"title": "...", "channel": "...", "duration_estimate": "...", "relevance_score": 0-100, "description": "...", "why_relevant": "..."}}"#;

pub const MUSIC_PROMPT: &str = r#"You are a music curator. Suggest the music that best captures the essence of this location.

Location:
- Name: {name}
- Category: {category}
- Coordinates: {lat}, {lon}
- Description: {description}

Consider local traditions, the historical era and the atmosphere of the setting. Suggest ONE song or album.

Respond with JSON only:
{"music": {"title": "...", "artist": "...", "type": "song", "genre": "...", "relevance_score": 0-100, "description": "...", "why_relevant": "..."}}"#;

pub const HISTORY_PROMPT: &str = r#"You are a historical storyteller. Write an engaging historical narrative (300-500 words) about this location.

Location:
- Name: {name}
- Category: {category}
- Coordinates: {lat}, {lon}
- Description: {description}

Include specific dates, people and events.

Respond with JSON only:
{"story": {"title": "...", "narrative": "...", "key_facts": ["..."], "relevance_score": 0-100, "time_period": "...", "historical_figures": ["..."]}}"#;

pub const EVALUATION_PROMPT: &str = r#"You are a content judge. Evaluate these content options for the location "{name}" ({category}) and select the single best one.

{candidates}

Criteria: relevance to this exact location (40), educational value (25), entertainment value (20), quality and uniqueness (15).

Respond with JSON only. "selected" must be one of the option kinds above, or "tie" if two or more are equally good:
{"selected": "<kind>", "reasoning": "2-3 sentences", "scores": {"<kind>": 0-100}}"#;

/// Longest candidate description shown to the evaluator
const DESCRIPTION_PREVIEW_CHARS: usize = 200;

/// Built-in template for a worker kind
pub const fn default_for(kind: WorkerKind) -> &'static str {
    match kind {
        WorkerKind::Video => VIDEO_PROMPT,
        WorkerKind::Music => MUSIC_PROMPT,
        WorkerKind::History => HISTORY_PROMPT,
    }
}

/// Fill the waypoint placeholders of a template
pub fn render(template: &str, unit: &WorkUnit) -> String {
    let waypoint = &unit.waypoint;
    template
        .replace("{name}", &waypoint.name)
        .replace("{category}", &waypoint.category.to_string())
        .replace("{lat}", &format!("{:.4}", waypoint.coordinates.lat))
        .replace("{lon}", &format!("{:.4}", waypoint.coordinates.lon))
        .replace("{description}", &waypoint.description)
}

/// Render the evaluation template. Only the presented candidates appear.
pub fn render_evaluation(
    template: &str,
    unit: &WorkUnit,
    candidates: &BTreeMap<WorkerKind, ContentPayload>,
) -> String {
    let options = candidates
        .iter()
        .enumerate()
        .map(|(i, (kind, payload))| {
            format!(
                "OPTION {} - {kind}:\nTitle: {}\nDescription: {}",
                i + 1,
                payload.title,
                preview(&payload.body)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    render(template, unit).replace("{candidates}", &options)
}

fn preview(text: &str) -> String {
    if text.chars().count() > DESCRIPTION_PREVIEW_CHARS {
        let cut: String = text.chars().take(DESCRIPTION_PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}
