//! Generator port - produces content for a waypoint.

use async_trait::async_trait;

use crate::domain::errors::CollaboratorError;
use crate::domain::models::{GeneratedContent, WorkUnit, WorkerKind};

/// Content generation collaborator.
///
/// Calls may block arbitrarily long; the worker enforces the deadline and
/// abandons the call when it elapses. Implementations must therefore be safe
/// to drop mid-flight.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Generate content of the given kind for one work unit.
    async fn generate(
        &self,
        kind: WorkerKind,
        unit: &WorkUnit,
    ) -> Result<GeneratedContent, CollaboratorError>;
}
