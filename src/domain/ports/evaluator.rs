//! Evaluator port - chooses between candidate contents.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::domain::errors::CollaboratorError;
use crate::domain::models::{ContentPayload, Evaluation, WorkUnit, WorkerKind};

/// Content evaluation collaborator.
#[async_trait]
pub trait ContentEvaluator: Send + Sync {
    /// Pick the best candidate for a unit.
    ///
    /// Only successful kinds are presented. The returned selection is not
    /// trusted: a kind outside `candidates` triggers the fallback policy.
    async fn evaluate(
        &self,
        unit: &WorkUnit,
        candidates: &BTreeMap<WorkerKind, ContentPayload>,
    ) -> Result<Evaluation, CollaboratorError>;
}
