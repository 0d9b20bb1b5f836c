//! Claude CLI substrate and the collaborators built on it.

pub mod claude_code;
pub mod content;
pub mod prompts;
pub mod strategies;

pub use claude_code::{ClaudeCodeConfig, ClaudeCodeSubstrate, SubstrateError};
pub use content::{ClaudeContentEvaluator, ClaudeContentGenerator};
pub use strategies::{strategy_for, ContentStrategy};
