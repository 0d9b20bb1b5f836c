//! Generator and evaluator collaborators backed by the Claude CLI substrate.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::claude_code::ClaudeCodeSubstrate;
use super::prompts;
use super::strategies::{parse_json_object, strategy_for, ContentStrategy};
use crate::domain::errors::CollaboratorError;
use crate::domain::models::{
    ContentPayload, Evaluation, GeneratedContent, PromptTemplates, WorkUnit, WorkerKind,
};
use crate::domain::ports::{ContentEvaluator, ContentGenerator};

/// Generates content for every configured kind through one shared substrate
pub struct ClaudeContentGenerator {
    substrate: Arc<ClaudeCodeSubstrate>,
    strategies: BTreeMap<WorkerKind, Box<dyn ContentStrategy>>,
}

impl ClaudeContentGenerator {
    pub fn new(substrate: Arc<ClaudeCodeSubstrate>, templates: &PromptTemplates) -> Self {
        let strategies = WorkerKind::ALL
            .iter()
            .map(|kind| (*kind, strategy_for(*kind, templates)))
            .collect();
        Self {
            substrate,
            strategies,
        }
    }
}

#[async_trait]
impl ContentGenerator for ClaudeContentGenerator {
    async fn generate(
        &self,
        kind: WorkerKind,
        unit: &WorkUnit,
    ) -> Result<GeneratedContent, CollaboratorError> {
        let strategy = self.strategies.get(&kind).ok_or_else(|| {
            CollaboratorError::Unavailable(format!("no strategy registered for {kind}"))
        })?;

        let prompt = strategy.build_prompt(unit);
        let response = self.substrate.complete(&prompt).await?;
        let content = strategy.parse_response(&response)?;

        debug!(
            unit_id = %unit.id,
            kind = %kind,
            title = %content.payload.title,
            score = content.relevance_score,
            "Generated content"
        );
        Ok(content)
    }
}

/// Asks the CLI to judge the presented candidates
pub struct ClaudeContentEvaluator {
    substrate: Arc<ClaudeCodeSubstrate>,
    template: String,
}

impl ClaudeContentEvaluator {
    pub fn new(substrate: Arc<ClaudeCodeSubstrate>, templates: &PromptTemplates) -> Self {
        let template = templates
            .evaluation
            .clone()
            .unwrap_or_else(|| prompts::EVALUATION_PROMPT.to_string());
        Self {
            substrate,
            template,
        }
    }
}

#[async_trait]
impl ContentEvaluator for ClaudeContentEvaluator {
    async fn evaluate(
        &self,
        unit: &WorkUnit,
        candidates: &BTreeMap<WorkerKind, ContentPayload>,
    ) -> Result<Evaluation, CollaboratorError> {
        let prompt = prompts::render_evaluation(&self.template, unit, candidates);
        let response = self.substrate.complete(&prompt).await?;
        parse_evaluation(&response)
    }
}

/// Parse `{selected, reasoning, scores}`; `selected` may be `"tie"`
pub fn parse_evaluation(raw: &str) -> Result<Evaluation, CollaboratorError> {
    let root = parse_json_object(raw)?;

    let selected = root
        .get("selected")
        .and_then(Value::as_str)
        .ok_or_else(|| CollaboratorError::Malformed("Response missing 'selected'".to_string()))?;
    let rationale = root
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut scores = BTreeMap::new();
    if let Some(Value::Object(raw_scores)) = root.get("scores") {
        for (key, value) in raw_scores {
            match (key.parse::<WorkerKind>(), value.as_f64()) {
                (Ok(kind), Some(score)) => {
                    scores.insert(kind, score);
                }
                _ => warn!(key = %key, "Ignoring unrecognised evaluation score"),
            }
        }
    }

    let evaluation = if selected.trim().eq_ignore_ascii_case("tie") {
        Evaluation::tie(rationale)
    } else {
        let kind = selected.parse::<WorkerKind>().map_err(|_| {
            CollaboratorError::Malformed(format!("Unknown selection '{selected}'"))
        })?;
        Evaluation::pick(kind, rationale)
    };

    Ok(evaluation.with_scores(scores))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pick_with_aliases() {
        let evaluation = parse_evaluation(
            r#"{"selected": "youtube", "reasoning": "Best fit", "scores": {"youtube": 80, "history": 70}}"#,
        )
        .unwrap();
        assert_eq!(evaluation.selected, Some(WorkerKind::Video));
        assert_eq!(evaluation.rationale, "Best fit");
        assert_eq!(evaluation.scores.len(), 2);
    }

    #[test]
    fn test_parse_tie() {
        let evaluation =
            parse_evaluation("```json\n{\"selected\": \"tie\", \"reasoning\": \"Equal\"}\n```")
                .unwrap();
        assert_eq!(evaluation.selected, None);
    }

    #[test]
    fn test_parse_rejects_unknown_selection() {
        assert!(matches!(
            parse_evaluation(r#"{"selected": "podcast"}"#),
            Err(CollaboratorError::Malformed(_))
        ));
        assert!(matches!(
            parse_evaluation(r#"{"reasoning": "no pick"}"#),
            Err(CollaboratorError::Malformed(_))
        ));
    }

    #[test]
    fn test_unknown_score_keys_are_dropped() {
        let evaluation =
            parse_evaluation(r#"{"selected": "music", "scores": {"music": 90, "radio": 10}}"#)
                .unwrap();
        assert_eq!(evaluation.scores.keys().collect::<Vec<_>>(), vec![&WorkerKind::Music]);
    }
}
