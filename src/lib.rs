//! vocabmatch - vocabulary mastery and reading-text matching
//!
//! A batch pipeline that reads grade-level word lists, classroom transcripts
//! and essays, and:
//! - finds every target-word usage in each student's own language
//! - has an LLM judge whether each word was used correctly
//! - builds per-student vocabulary profiles with deterministic baseline knowledge
//! - scores corpus texts for each student and for the class as a whole
//!
//! # Architecture
//!
//! - **Catalog / NLP**: word lists, lemmatizer, transcript attribution, matcher
//! - **Services**: LLM client and the usage judge with retry and throttling
//! - **Profile / Scoring / Class**: pure computation over loaded data
//! - **Storage**: SQLite result store behind the `ResultStore` trait
//! - **Pipeline**: orchestration and run bookkeeping
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use vocabmatch_core::{LlmService, LlmConfig, LlmUsageJudge, Pipeline, PipelineConfig, SqliteStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig::from_file("vocabmatch.toml".as_ref())?.with_env_overrides();
//!     let store = Arc::new(SqliteStore::new(&config.database.path, config.database.pool_size)?);
//!     let judge = LlmUsageJudge::new(LlmService::new(LlmConfig::from_judge_config(&config.judge)?)?);
//!
//!     let summary = Pipeline::new(config, store).run(Arc::new(judge)).await?;
//!     println!("{} students profiled", summary.students_processed);
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod class;
pub mod config;
pub mod corpus;
pub mod error;
pub mod input;
pub mod nlp;
pub mod pipeline;
pub mod profile;
pub mod scoring;
pub mod services;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use catalog::VocabularyCatalog;
pub use class::{ClassAggregator, ClassStats};
pub use config::PipelineConfig;
pub use corpus::{CorpusIndex, CorpusIndexer, SkipReason};
pub use error::{Result, VocabError};
pub use nlp::{Lemmatize, RuleLemmatizer, TextNormalizer};
pub use pipeline::{class_report, dismiss_word, student_report, ClassReport, Pipeline, RunSummary};
pub use profile::{ProfileBuilder, ProfileReport};
pub use scoring::{Scorer, TextScore};
pub use services::{JudgeRunner, LlmConfig, LlmService, LlmUsageJudge, UsageJudge};
pub use storage::{ResultStore, SqliteStore};
pub use types::{
    DismissalReason, Judgment, Recommendation, Student, StudentId, Subject, TextId,
    TextVocabularyIndex, UsageMatch, VocabularyProfile, VocabularyWord, WordId,
};
