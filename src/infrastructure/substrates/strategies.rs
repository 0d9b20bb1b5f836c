//! Per-kind content strategies: how to ask for content and how to read the answer.

use serde_json::{Map, Value};

use super::prompts;
use crate::domain::errors::CollaboratorError;
use crate::domain::models::{
    ContentPayload, GeneratedContent, PromptTemplates, WorkUnit, WorkerKind,
};

/// Score used when a response omits `relevance_score`
pub const DEFAULT_RELEVANCE_SCORE: f64 = 50.0;

/// Prompt construction and response parsing for one worker kind
pub trait ContentStrategy: Send + Sync {
    fn kind(&self) -> WorkerKind;

    fn build_prompt(&self, unit: &WorkUnit) -> String;

    fn parse_response(&self, raw: &str) -> Result<GeneratedContent, CollaboratorError>;
}

/// Select the strategy for a kind, applying any configured template override
pub fn strategy_for(kind: WorkerKind, templates: &PromptTemplates) -> Box<dyn ContentStrategy> {
    let template = templates
        .for_kind(kind)
        .unwrap_or_else(|| prompts::default_for(kind))
        .to_string();

    match kind {
        WorkerKind::Video => Box::new(VideoStrategy { template }),
        WorkerKind::Music => Box::new(MusicStrategy { template }),
        WorkerKind::History => Box::new(HistoryStrategy { template }),
    }
}

pub struct VideoStrategy {
    template: String,
}

impl ContentStrategy for VideoStrategy {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Video
    }

    fn build_prompt(&self, unit: &WorkUnit) -> String {
        prompts::render(&self.template, unit)
    }

    fn parse_response(&self, raw: &str) -> Result<GeneratedContent, CollaboratorError> {
        let video = section(raw, "video")?;
        let payload = ContentPayload::new(title(&video)?, text(&video, "description"))
            .with_metadata("channel", field(&video, "channel"))
            .with_metadata("duration_estimate", field(&video, "duration_estimate"))
            .with_metadata("why_relevant", field(&video, "why_relevant"));
        Ok(GeneratedContent::new(payload, relevance(&video)))
    }
}

pub struct MusicStrategy {
    template: String,
}

impl ContentStrategy for MusicStrategy {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Music
    }

    fn build_prompt(&self, unit: &WorkUnit) -> String {
        prompts::render(&self.template, unit)
    }

    fn parse_response(&self, raw: &str) -> Result<GeneratedContent, CollaboratorError> {
        let music = section(raw, "music")?;
        let payload = ContentPayload::new(title(&music)?, text(&music, "description"))
            .with_metadata("artist", field(&music, "artist"))
            .with_metadata("type", field(&music, "type"))
            .with_metadata("genre", field(&music, "genre"))
            .with_metadata("why_relevant", field(&music, "why_relevant"));
        Ok(GeneratedContent::new(payload, relevance(&music)))
    }
}

pub struct HistoryStrategy {
    template: String,
}

impl ContentStrategy for HistoryStrategy {
    fn kind(&self) -> WorkerKind {
        WorkerKind::History
    }

    fn build_prompt(&self, unit: &WorkUnit) -> String {
        prompts::render(&self.template, unit)
    }

    fn parse_response(&self, raw: &str) -> Result<GeneratedContent, CollaboratorError> {
        let story = section(raw, "story")?;
        let payload = ContentPayload::new(title(&story)?, text(&story, "narrative"))
            .with_metadata("key_facts", field(&story, "key_facts"))
            .with_metadata("time_period", field(&story, "time_period"))
            .with_metadata("historical_figures", field(&story, "historical_figures"));
        Ok(GeneratedContent::new(payload, relevance(&story)))
    }
}

/// Strip a surrounding ``` or ```json fence if the response has one
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };

    // First fence wins; its info string (`json`, `JSON`, ...) is dropped
    let after = &trimmed[start + 3..];
    let tag_len = after
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(after.len());
    let body = &after[tag_len..];
    body.find("```").map_or(body, |end| &body[..end]).trim()
}

/// Parse a (possibly fenced) JSON object
pub fn parse_json_object(raw: &str) -> Result<Map<String, Value>, CollaboratorError> {
    match serde_json::from_str::<Value>(strip_code_fence(raw)) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(CollaboratorError::Malformed(format!(
            "expected a JSON object, got {other}"
        ))),
        Err(e) => Err(CollaboratorError::Malformed(format!(
            "Failed to parse response as JSON: {e}"
        ))),
    }
}

fn section(raw: &str, key: &str) -> Result<Map<String, Value>, CollaboratorError> {
    let mut root = parse_json_object(raw)?;
    match root.remove(key) {
        Some(Value::Object(inner)) => Ok(inner),
        _ => Err(CollaboratorError::Malformed(format!(
            "Response missing '{key}' field"
        ))),
    }
}

fn title(section: &Map<String, Value>) -> Result<String, CollaboratorError> {
    section
        .get("title")
        .and_then(Value::as_str)
        .filter(|t| !t.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| CollaboratorError::Malformed("Response missing 'title'".to_string()))
}

fn text(section: &Map<String, Value>, key: &str) -> String {
    section
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn field(section: &Map<String, Value>, key: &str) -> Value {
    section.get(key).cloned().unwrap_or(Value::Null)
}

fn relevance(section: &Map<String, Value>) -> f64 {
    section
        .get("relevance_score")
        .and_then(Value::as_f64)
        .unwrap_or(DEFAULT_RELEVANCE_SCORE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("here:\n```\n{}\n```\nthanks"), "{}");
        assert_eq!(strip_code_fence("  {\"a\": 1} "), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```JSON\n{}\n```"), "{}");
    }

    #[test]
    fn test_first_fence_wins_over_later_json_fence() {
        let raw = "```\n{\"first\": 1}\n```\nor:\n```json\n{\"second\": 2}\n```";
        assert_eq!(strip_code_fence(raw), "{\"first\": 1}");
        assert!(parse_json_object(raw).unwrap().contains_key("first"));
    }

    #[test]
    fn test_video_response() {
        let strategy = strategy_for(WorkerKind::Video, &PromptTemplates::default());
        let raw = r#"```json
{"video": {"title": "The Siege of Masada", "channel": "History Channel", "relevance_score": 95, "description": "Documentary"}}
```"#;
        let content = strategy.parse_response(raw).unwrap();
        assert_eq!(content.payload.title, "The Siege of Masada");
        assert_eq!(content.payload.body, "Documentary");
        assert!((content.relevance_score - 95.0).abs() < f64::EPSILON);
        assert_eq!(content.payload.metadata["channel"], "History Channel");
    }

    #[test]
    fn test_missing_score_defaults_and_out_of_range_clamps() {
        let strategy = strategy_for(WorkerKind::Music, &PromptTemplates::default());
        let content = strategy
            .parse_response(r#"{"music": {"title": "Jerusalem of Gold"}}"#)
            .unwrap();
        assert!((content.relevance_score - DEFAULT_RELEVANCE_SCORE).abs() < f64::EPSILON);

        let content = strategy
            .parse_response(r#"{"music": {"title": "Loud", "relevance_score": 140}}"#)
            .unwrap();
        assert!((content.relevance_score - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_history_uses_narrative_as_body() {
        let strategy = strategy_for(WorkerKind::History, &PromptTemplates::default());
        let content = strategy
            .parse_response(r#"{"story": {"title": "960 Souls", "narrative": "In 73 CE...", "key_facts": ["Herod"]}}"#)
            .unwrap();
        assert_eq!(content.payload.body, "In 73 CE...");
        assert!(content.payload.metadata["key_facts"].is_array());
    }

    #[test]
    fn test_malformed_responses() {
        let strategy = strategy_for(WorkerKind::History, &PromptTemplates::default());
        assert!(matches!(
            strategy.parse_response("not json"),
            Err(CollaboratorError::Malformed(_))
        ));
        assert!(matches!(
            strategy.parse_response(r#"{"video": {"title": "wrong section"}}"#),
            Err(CollaboratorError::Malformed(_))
        ));
    }

    #[test]
    fn test_template_override() {
        let templates = PromptTemplates {
            music: Some("Song for {name}?".to_string()),
            ..PromptTemplates::default()
        };
        let strategy = strategy_for(WorkerKind::Music, &templates);
        let unit = crate::domain::models::WorkUnit::new(
            crate::domain::models::WorkUnitId(0),
            crate::domain::models::Waypoint::new(
                "Haifa",
                crate::domain::models::Coordinates::new(32.79, 34.98),
                crate::domain::models::WaypointCategory::Cultural,
                "",
            ),
        );
        assert_eq!(strategy.build_prompt(&unit), "Song for Haifa?");
        assert_eq!(strategy.kind(), WorkerKind::Music);
    }
}
