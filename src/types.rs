//! Core data types for the vocabmatch pipeline
//!
//! This module defines the records that flow between pipeline stages:
//! catalog words, students, usage matches, judgments, vocabulary profiles,
//! per-text vocabulary indexes and recommendations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use crate::error::VocabError;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Identifier of a catalog word
    WordId
);
id_type!(
    /// Identifier of a student on the roster
    StudentId
);
id_type!(
    /// Identifier of a candidate reading text
    TextId
);

/// A target word in the vocabulary catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyWord {
    pub id: WordId,
    /// Canonical lowercase form; unique across the catalog
    pub surface_form: String,
    /// Highest grade list the word appeared in
    pub grade_level: u8,
}

/// A student on the class roster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    pub assigned_grade: u8,
    pub reading_level: f64,
}

/// One occurrence of a catalog word in a student's own text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMatch {
    pub word_id: WordId,
    pub student_id: StudentId,
    /// Sentence exactly as the student produced it
    pub original_sentence: String,
    /// Token as it appeared before lemmatization
    pub original_surface_form: String,
}

/// Correctness judgment for a (student, word) pair
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judgment {
    pub correct_count: u32,
    pub incorrect_count: u32,
    #[serde(default)]
    pub misuse_examples: Vec<String>,
}

/// Outcome of judging one (student, word) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JudgeOutcome {
    Judged(Judgment),
    /// Retries exhausted or permanent failure; excluded from mastery
    Unjudged { reason: String },
}

/// Why a teacher hid a misused word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DismissalReason {
    /// Teacher already addressed the misuse with the student
    Addressed,
    /// The judge was wrong
    AiError,
}

impl DismissalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DismissalReason::Addressed => "addressed",
            DismissalReason::AiError => "ai_error",
        }
    }
}

impl std::fmt::Display for DismissalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DismissalReason {
    type Err = VocabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "addressed" => Ok(DismissalReason::Addressed),
            "ai_error" => Ok(DismissalReason::AiError),
            other => Err(VocabError::InvalidDismissalReason(other.to_string())),
        }
    }
}

/// Visibility flag set by a teacher on a profile row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dismissal {
    pub reason: DismissalReason,
    pub dismissed_at: DateTime<Utc>,
}

/// One row of a student's vocabulary profile, keyed by (student_id, word_id)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileEntry {
    pub student_id: StudentId,
    pub word_id: WordId,
    pub usage_count: u32,
    pub correct_count: u32,
    pub incorrect_count: u32,
    pub misuse_examples: Vec<String>,
    /// False when the judge never produced a verdict for this pair
    pub judged: bool,
    /// Known through the deterministic baseline rather than evidence
    pub baseline_known: bool,
    pub dismissal: Option<Dismissal>,
}

impl ProfileEntry {
    pub fn baseline(student_id: StudentId, word_id: WordId) -> Self {
        Self {
            student_id,
            word_id,
            usage_count: 0,
            correct_count: 0,
            incorrect_count: 0,
            misuse_examples: Vec::new(),
            judged: false,
            baseline_known: true,
            dismissal: None,
        }
    }

    /// Mastered by evidence or assumed via baseline
    pub fn is_known(&self) -> bool {
        self.correct_count > 0 || self.baseline_known
    }

    /// Misused and still visible to the teacher
    pub fn is_visible_misuse(&self) -> bool {
        self.incorrect_count > 0 && self.dismissal.is_none()
    }
}

/// A student's complete vocabulary profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyProfile {
    pub student_id: StudentId,
    pub assigned_grade: u8,
    pub reading_level: f64,
    pub entries: BTreeMap<WordId, ProfileEntry>,
    pub total_grade_level_words: usize,
    pub words_mastered: usize,
    /// Always within [0, 100]
    pub mastery_percent: f64,
    /// Catalog words at or below the assigned grade not known
    pub missing_words: Vec<WordId>,
}

impl VocabularyProfile {
    pub fn known_words(&self) -> BTreeSet<WordId> {
        self.entries
            .values()
            .filter(|e| e.is_known())
            .map(|e| e.word_id)
            .collect()
    }

    pub fn misused_entries(&self) -> impl Iterator<Item = &ProfileEntry> {
        self.entries.values().filter(|e| e.is_visible_misuse())
    }
}

/// Metadata for a candidate text in the external corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextMetadata {
    pub id: TextId,
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub downloads: u64,
    #[serde(default)]
    pub reading_level: Option<f64>,
    #[serde(default)]
    pub available: Option<bool>,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_category() -> String {
    "Text".to_string()
}

/// Catalog-word occurrence counts for one text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextVocabularyIndex {
    pub text_id: TextId,
    pub title: String,
    pub author: Option<String>,
    pub total_word_count: u64,
    pub reading_level: Option<f64>,
    pub occurrences: BTreeMap<WordId, u64>,
}

impl TextVocabularyIndex {
    /// Distinct catalog words occurring in the text
    pub fn vocabulary_size(&self) -> usize {
        self.occurrences.values().filter(|c| **c > 0).count()
    }
}

/// Who a recommendation is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "id")]
pub enum Subject {
    Student(StudentId),
    Class,
}

impl Subject {
    /// Storage key, e.g. `student:7` or `class`
    pub fn key(&self) -> String {
        self.to_string()
    }

    pub fn parse_key(key: &str) -> Result<Self, VocabError> {
        if key == "class" {
            return Ok(Subject::Class);
        }
        key.strip_prefix("student:")
            .and_then(|id| id.parse::<i64>().ok())
            .map(|id| Subject::Student(StudentId(id)))
            .ok_or_else(|| VocabError::InvalidInput(format!("bad subject key '{}'", key)))
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Subject::Student(id) => write!(f, "student:{}", id),
            Subject::Class => write!(f, "class"),
        }
    }
}

/// A text recommended to a student or to the whole class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub subject: Subject,
    pub text_id: TextId,
    pub rank: u32,
    pub match_score: f64,
    /// Percentage in [0, 100], not a fraction
    pub known_words_percent: f64,
    pub new_words_count: u32,
    /// Only set for class-wide rows
    pub students_recommended_count: Option<u32>,
    pub created_at: DateTime<Utc>,
}
