//! Deterministic baseline knowledge
//!
//! Observed text under-samples what a student knows, so each student is
//! credited with most lower-grade words and a reading-level dependent share of
//! their own grade's words. Which words are credited comes from a SHA-256 of
//! the (student, word) pair, so reruns always pick the same set.

use crate::config::BaselineConfig;
use crate::types::{Student, StudentId, VocabularyWord, WordId};
use sha2::{Digest, Sha256};

/// Baseline policy for one configuration
#[derive(Debug, Clone)]
pub struct Baseline {
    config: BaselineConfig,
}

impl Baseline {
    pub fn new(config: BaselineConfig) -> Self {
        Self { config }
    }

    /// Share of own-grade words assumed known for this student
    pub fn own_grade_fraction(&self, student: &Student) -> f64 {
        let offset = student.reading_level - student.assigned_grade as f64;
        (self.config.own_grade_base + self.config.own_grade_slope * offset)
            .clamp(self.config.own_grade_min, self.config.own_grade_max)
    }

    /// Whether `word` is credited to `student` without evidence
    pub fn assumes_known(&self, student: &Student, word: &VocabularyWord) -> bool {
        let threshold = if word.grade_level < student.assigned_grade {
            self.config.lower_grade_fraction
        } else if word.grade_level == student.assigned_grade {
            self.own_grade_fraction(student)
        } else {
            return false;
        };
        stable_fraction(student.id, word.id) < threshold
    }
}

/// Map a (student, word) pair onto [0, 1) with a stable hash
pub fn stable_fraction(student_id: StudentId, word_id: WordId) -> f64 {
    let mut hasher = Sha256::new();
    hasher.update(student_id.0.to_be_bytes());
    hasher.update(b":");
    hasher.update(word_id.0.to_be_bytes());
    let digest = hasher.finalize();

    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    // 53 bits keep the value exactly representable
    (u64::from_be_bytes(head) >> 11) as f64 / (1u64 << 53) as f64
}
