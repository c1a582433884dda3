//! LLM-backed narrative insights over flattened report text.

mod backend;
mod generator;

pub use backend::{ChatBackend, CompletionOptions, OpenAiBackend};
pub use generator::{AnswerResult, InsightEngine, InsightResult};
