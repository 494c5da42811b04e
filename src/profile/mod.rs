//! Profile builder
//!
//! Folds a student's usage matches and judge results into a vocabulary
//! profile, adds deterministic baseline knowledge and derives mastery and
//! missing words. A student with no observed text gets a baseline-only
//! profile.

pub mod baseline;

pub use baseline::{stable_fraction, Baseline};

use crate::catalog::VocabularyCatalog;
use crate::config::BaselineConfig;
use crate::services::judge::JudgeResult;
use crate::types::{
    JudgeOutcome, ProfileEntry, Recommendation, Student, UsageMatch, VocabularyProfile, WordId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Builds vocabulary profiles against one catalog
pub struct ProfileBuilder<'a> {
    catalog: &'a VocabularyCatalog,
    baseline: Baseline,
}

impl<'a> ProfileBuilder<'a> {
    pub fn new(catalog: &'a VocabularyCatalog, config: &BaselineConfig) -> Self {
        Self {
            catalog,
            baseline: Baseline::new(config.clone()),
        }
    }

    /// Build one student's profile.
    ///
    /// `matches` and `results` may contain other students' rows; only this
    /// student's are used. Unjudged pairs keep their usage count but add no
    /// correct or incorrect evidence.
    pub fn build(
        &self,
        student: &Student,
        matches: &[UsageMatch],
        results: &[JudgeResult],
    ) -> VocabularyProfile {
        let mut entries: BTreeMap<WordId, ProfileEntry> = BTreeMap::new();

        for m in matches.iter().filter(|m| m.student_id == student.id) {
            entries
                .entry(m.word_id)
                .or_insert_with(|| empty_entry(student, m.word_id))
                .usage_count += 1;
        }

        for result in results.iter().filter(|r| r.student_id == student.id) {
            let entry = entries
                .entry(result.word_id)
                .or_insert_with(|| empty_entry(student, result.word_id));
            if let JudgeOutcome::Judged(judgment) = &result.outcome {
                entry.correct_count = judgment.correct_count;
                entry.incorrect_count = judgment.incorrect_count;
                entry.misuse_examples = judgment.misuse_examples.clone();
                entry.judged = true;
            }
        }

        for word in self.catalog.words_at_or_below(student.assigned_grade) {
            if !self.baseline.assumes_known(student, word) {
                continue;
            }
            match entries.get_mut(&word.id) {
                // Observed misuse with no correct use outweighs the assumption
                Some(e) if e.incorrect_count > 0 && e.correct_count == 0 => {}
                Some(e) => e.baseline_known = true,
                None => {
                    entries.insert(word.id, ProfileEntry::baseline(student.id, word.id));
                }
            }
        }

        let grade_words: Vec<WordId> = self
            .catalog
            .words_at_grade(student.assigned_grade)
            .map(|w| w.id)
            .collect();
        let total_grade_level_words = grade_words.len();
        let words_mastered = grade_words
            .iter()
            .filter(|id| entries.get(id).map(ProfileEntry::is_known).unwrap_or(false))
            .count();
        let mastery_percent = if total_grade_level_words == 0 {
            0.0
        } else {
            (words_mastered as f64 / total_grade_level_words as f64 * 100.0).clamp(0.0, 100.0)
        };

        // Catalog order is (grade, word), which is the report order
        let missing_words: Vec<WordId> = self
            .catalog
            .words_at_or_below(student.assigned_grade)
            .filter(|w| !entries.get(&w.id).map(ProfileEntry::is_known).unwrap_or(false))
            .map(|w| w.id)
            .collect();

        debug!(
            "Profile for student {}: {} entries, {}/{} grade words mastered, {} missing",
            student.id,
            entries.len(),
            words_mastered,
            total_grade_level_words,
            missing_words.len()
        );

        VocabularyProfile {
            student_id: student.id,
            assigned_grade: student.assigned_grade,
            reading_level: student.reading_level,
            entries,
            total_grade_level_words,
            words_mastered,
            mastery_percent,
            missing_words,
        }
    }
}

fn empty_entry(student: &Student, word_id: WordId) -> ProfileEntry {
    ProfileEntry {
        student_id: student.id,
        word_id,
        usage_count: 0,
        correct_count: 0,
        incorrect_count: 0,
        misuse_examples: Vec::new(),
        judged: false,
        baseline_known: false,
        dismissal: None,
    }
}

/// A misused word as shown to the teacher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MisusedWord {
    pub word_id: WordId,
    pub word: String,
    pub correct_count: u32,
    pub incorrect_count: u32,
    pub example: Option<String>,
}

/// Read-side rendering of a stored profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileReport {
    pub student_id: crate::types::StudentId,
    pub name: String,
    pub assigned_grade: u8,
    pub reading_level: f64,
    pub total_grade_level_words: usize,
    pub words_mastered: usize,
    pub mastery_percent: f64,
    pub missing_words: Vec<String>,
    pub misused_words: Vec<MisusedWord>,
    pub recommendations: Vec<Recommendation>,
}

impl ProfileReport {
    /// Dismissed rows are left out of `misused_words`
    pub fn new(
        student: &Student,
        profile: &VocabularyProfile,
        catalog: &VocabularyCatalog,
        mut recommendations: Vec<Recommendation>,
    ) -> Self {
        let surface = |id: WordId| {
            catalog
                .get(id)
                .map(|w| w.surface_form.clone())
                .unwrap_or_else(|| format!("#{}", id))
        };

        let mut misused_words: Vec<MisusedWord> = profile
            .misused_entries()
            .map(|e| MisusedWord {
                word_id: e.word_id,
                word: surface(e.word_id),
                correct_count: e.correct_count,
                incorrect_count: e.incorrect_count,
                example: e.misuse_examples.first().cloned(),
            })
            .collect();
        misused_words.sort_by(|a, b| {
            b.incorrect_count
                .cmp(&a.incorrect_count)
                .then(a.word_id.cmp(&b.word_id))
        });

        recommendations.sort_by_key(|r| r.rank);

        Self {
            student_id: student.id,
            name: student.name.clone(),
            assigned_grade: student.assigned_grade,
            reading_level: student.reading_level,
            total_grade_level_words: profile.total_grade_level_words,
            words_mastered: profile.words_mastered,
            mastery_percent: profile.mastery_percent,
            missing_words: profile.missing_words.iter().map(|id| surface(*id)).collect(),
            misused_words,
            recommendations,
        }
    }
}
