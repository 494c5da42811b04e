//! Services layer for vocabmatch
//!
//! Provides the LLM client and the usage judge built on top of it.

pub mod judge;
pub mod llm;

pub use judge::{
    parse_judgment, JudgePolicy, JudgeRequest, JudgeResult, JudgeRunner, LlmUsageJudge, UsageJudge,
};
pub use llm::{LlmConfig, LlmService};
