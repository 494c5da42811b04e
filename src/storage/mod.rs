//! Storage layer for vocabmatch
//!
//! Persists catalog, roster, corpus index, profiles, recommendations, class
//! statistics and run bookkeeping. Every write is keyed so reruns update in
//! place instead of duplicating rows.

pub mod sqlite;

use crate::class::ClassStats;
use crate::error::Result;
use crate::pipeline::RunSummary;
use crate::types::{
    DismissalReason, Recommendation, Student, StudentId, Subject, TextVocabularyIndex,
    VocabularyProfile, VocabularyWord, WordId,
};
use async_trait::async_trait;
use std::collections::HashMap;

pub use sqlite::SqliteStore;

/// A pair the judge could not classify, kept for operator follow-up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnjudgedRecord {
    pub run_id: String,
    pub student_id: StudentId,
    pub word_id: WordId,
    pub reason: String,
}

/// Storage backend for pipeline results
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Create tables and indexes if missing
    async fn init_schema(&self) -> Result<()>;

    /// Make `words` the active catalog. Words missing from it are retired,
    /// not deleted, so their ids are never reused.
    async fn save_catalog(&self, words: &[VocabularyWord]) -> Result<()>;

    /// Active catalog words
    async fn load_catalog(&self) -> Result<Vec<VocabularyWord>>;

    /// Surface form → id for every word ever stored, retired ones included
    async fn known_word_ids(&self) -> Result<HashMap<String, WordId>>;

    /// Upsert roster rows
    async fn save_students(&self, students: &[Student]) -> Result<()>;

    async fn load_students(&self) -> Result<Vec<Student>>;

    /// Delete students not in `keep`, with their profiles and
    /// recommendations. Returns how many were removed.
    async fn prune_students(&self, keep: &[StudentId]) -> Result<usize>;

    /// Replace the stored corpus index
    async fn save_text_indexes(&self, texts: &[TextVocabularyIndex]) -> Result<()>;

    async fn load_text_indexes(&self) -> Result<Vec<TextVocabularyIndex>>;

    /// Upsert one profile. Dismissal flags on existing rows are preserved.
    async fn save_profile(&self, profile: &VocabularyProfile) -> Result<()>;

    /// Load one profile including dismissal flags
    async fn load_profile(&self, student_id: StudentId) -> Result<Option<VocabularyProfile>>;

    async fn load_profiles(&self) -> Result<Vec<VocabularyProfile>>;

    /// Replace the recommendation set for one subject
    async fn replace_recommendations(
        &self,
        subject: Subject,
        recommendations: &[Recommendation],
    ) -> Result<()>;

    async fn load_recommendations(&self, subject: Subject) -> Result<Vec<Recommendation>>;

    /// Overwrite the class statistics row
    async fn save_class_stats(&self, stats: &ClassStats) -> Result<()>;

    async fn load_class_stats(&self) -> Result<Option<ClassStats>>;

    /// Hide a profile row. Counts are untouched.
    async fn dismiss(
        &self,
        student_id: StudentId,
        word_id: WordId,
        reason: DismissalReason,
    ) -> Result<()>;

    async fn log_unjudged(&self, records: &[UnjudgedRecord]) -> Result<()>;

    async fn save_run_summary(&self, summary: &RunSummary) -> Result<()>;

    async fn latest_run_summary(&self) -> Result<Option<RunSummary>>;

    /// Row counts per table, for status reporting
    async fn table_counts(&self) -> Result<Vec<(String, i64)>>;
}
