//! Student/text matcher and scorer
//!
//! Scores how well a text's catalog vocabulary challenges one student:
//! - closeness of known-word share to the target band (40%)
//! - amount of new vocabulary, saturating (40%)
//! - reading-level proximity (20%)
//!
//! minus a penalty when the text is far too easy or too hard. Scores are
//! clamped to [0, 1]. Texts with no catalog words are never ranked.

use crate::config::ScoringConfig;
use crate::types::{Recommendation, Subject, TextId, TextVocabularyIndex, VocabularyProfile, WordId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Score of one (student, text) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextScore {
    pub text_id: TextId,
    pub match_score: f64,
    /// Known share of the text's catalog words, as a percentage
    pub known_words_percent: f64,
    pub new_words_count: u32,
    /// Absolute reading-level gap; `None` when the text has no level
    pub reading_level_diff: Option<f64>,
}

impl TextScore {
    pub fn into_recommendation(
        self,
        subject: Subject,
        rank: u32,
        created_at: DateTime<Utc>,
    ) -> Recommendation {
        Recommendation {
            subject,
            text_id: self.text_id,
            rank,
            match_score: self.match_score,
            known_words_percent: self.known_words_percent,
            new_words_count: self.new_words_count,
            students_recommended_count: None,
            created_at,
        }
    }
}

/// Challenge-optimizing scorer
#[derive(Debug, Clone)]
pub struct Scorer {
    config: ScoringConfig,
}

impl Scorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Score one text for a student with the given known-word set.
    ///
    /// Returns `None` for a text with no catalog words.
    pub fn score(
        &self,
        known: &BTreeSet<WordId>,
        reading_level: f64,
        text: &TextVocabularyIndex,
    ) -> Option<TextScore> {
        let vocabulary: Vec<WordId> = text
            .occurrences
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(id, _)| *id)
            .collect();
        if vocabulary.is_empty() {
            return None;
        }

        let known_count = vocabulary.iter().filter(|id| known.contains(id)).count();
        let known_percent = known_count as f64 / vocabulary.len() as f64;
        let new_words_count = (vocabulary.len() - known_count) as u32;
        let reading_level_diff = text.reading_level.map(|rl| (rl - reading_level).abs());

        let c = &self.config;
        let raw = c.known_weight * self.known_closeness(known_percent)
            + c.new_words_weight * new_words_factor(new_words_count)
            + c.reading_level_weight * reading_level_bonus(reading_level_diff)
            - self.penalty(known_percent);

        Some(TextScore {
            text_id: text.text_id,
            match_score: raw.clamp(0.0, 1.0),
            known_words_percent: known_percent * 100.0,
            new_words_count,
            reading_level_diff,
        })
    }

    /// Rank every eligible text for a profile and keep the top `top_k`
    pub fn rank(&self, profile: &VocabularyProfile, texts: &[TextVocabularyIndex]) -> Vec<TextScore> {
        let known = profile.known_words();
        let mut scored: Vec<TextScore> = texts
            .iter()
            .filter_map(|t| self.score(&known, profile.reading_level, t))
            .collect();
        scored.sort_by(compare_scores);
        scored.truncate(self.config.top_k);
        scored
    }

    /// 1.0 inside the target band, decaying linearly to 0 at either extreme
    fn known_closeness(&self, known_percent: f64) -> f64 {
        let low = self.config.target_band_low;
        let high = self.config.target_band_high;
        let closeness = if known_percent < low {
            if low <= 0.0 {
                1.0
            } else {
                1.0 - (low - known_percent) / low
            }
        } else if known_percent > high {
            if high >= 1.0 {
                1.0
            } else {
                1.0 - (known_percent - high) / (1.0 - high)
            }
        } else {
            1.0
        };
        closeness.clamp(0.0, 1.0)
    }

    /// Proportional penalty outside [too_hard_below, too_easy_above]
    fn penalty(&self, known_percent: f64) -> f64 {
        let c = &self.config;
        if known_percent > c.too_easy_above {
            (known_percent - c.too_easy_above) * c.penalty_rate
        } else if known_percent < c.too_hard_below {
            (c.too_hard_below - known_percent) * c.penalty_rate
        } else {
            0.0
        }
    }
}

/// Saturating reward for new vocabulary.
///
/// - fewer than 10 → linear up to 0.9
/// - 10 to 30 → 1.0
/// - above 30 → decays toward 0.75, never below
pub fn new_words_factor(new_words: u32) -> f64 {
    let n = new_words as f64;
    if n < 10.0 {
        n / 10.0 * 0.9
    } else if n <= 30.0 {
        1.0
    } else {
        1.0 - 0.25 * (1.0 - (-(n - 30.0) / 40.0).exp())
    }
}

/// `max(0, 1 - diff/2)`, neutral 0.5 when the text has no reading level
pub fn reading_level_bonus(diff: Option<f64>) -> f64 {
    match diff {
        Some(d) => (1.0 - d / 2.0).max(0.0),
        None => 0.5,
    }
}

/// Score desc, then smaller reading-level gap, then text id
fn compare_scores(a: &TextScore, b: &TextScore) -> Ordering {
    b.match_score
        .total_cmp(&a.match_score)
        .then_with(|| match (a.reading_level_diff, b.reading_level_diff) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then(a.text_id.cmp(&b.text_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ProfileEntry, StudentId};
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn text(id: i64, words: std::ops::Range<i64>, reading_level: Option<f64>) -> TextVocabularyIndex {
        TextVocabularyIndex {
            text_id: TextId(id),
            title: format!("Text {}", id),
            author: None,
            total_word_count: 10_000,
            reading_level,
            occurrences: words.map(|w| (WordId(w), 2)).collect(),
        }
    }

    fn known(range: std::ops::Range<i64>) -> BTreeSet<WordId> {
        range.map(WordId).collect()
    }

    fn profile(known_words: std::ops::Range<i64>, reading_level: f64) -> VocabularyProfile {
        let entries: BTreeMap<WordId, ProfileEntry> = known_words
            .map(|w| (WordId(w), ProfileEntry::baseline(StudentId(1), WordId(w))))
            .collect();
        VocabularyProfile {
            student_id: StudentId(1),
            assigned_grade: 7,
            reading_level,
            entries,
            total_grade_level_words: 0,
            words_mastered: 0,
            mastery_percent: 0.0,
            missing_words: vec![],
        }
    }

    #[test]
    fn test_new_words_factor_saturates() {
        assert_eq!(new_words_factor(0), 0.0);
        assert!((new_words_factor(5) - 0.45).abs() < 1e-9);
        assert_eq!(new_words_factor(10), 1.0);
        assert_eq!(new_words_factor(30), 1.0);
        assert!(new_words_factor(31) < 1.0);
        assert!(new_words_factor(10_000) >= 0.75);
        assert!(new_words_factor(60) > new_words_factor(120));
    }

    #[test]
    fn test_reading_level_bonus() {
        assert_eq!(reading_level_bonus(Some(0.0)), 1.0);
        assert_eq!(reading_level_bonus(Some(1.0)), 0.5);
        assert_eq!(reading_level_bonus(Some(5.0)), 0.0);
        assert_eq!(reading_level_bonus(None), 0.5);
    }

    #[test]
    fn test_in_band_text_beats_easy_and_hard() {
        let scorer = Scorer::new(ScoringConfig::default());
        // 60 catalog words; student knows 36 of them → 60%, 24 new
        let ideal = text(1, 0..60, Some(7.0));
        let easy = text(2, 0..40, Some(7.0));
        let hard = text(3, 30..90, Some(7.0));
        let k = known(0..36);

        let s_ideal = scorer.score(&k, 7.0, &ideal).unwrap();
        let s_easy = scorer.score(&k, 7.0, &easy).unwrap();
        let s_hard = scorer.score(&k, 7.0, &hard).unwrap();

        assert_eq!(s_ideal.new_words_count, 24);
        assert!((s_ideal.known_words_percent - 60.0).abs() < 1e-9);
        assert!((s_ideal.match_score - 1.0).abs() < 1e-9);
        assert!(s_ideal.match_score > s_easy.match_score);
        assert!(s_ideal.match_score > s_hard.match_score);
    }

    #[test]
    fn test_no_known_words_still_scores() {
        let scorer = Scorer::new(ScoringConfig::default());
        let k = BTreeSet::new();
        let small = scorer.score(&k, 6.0, &text(1, 0..3, Some(6.0))).unwrap();
        let large = scorer.score(&k, 6.0, &text(2, 0..20, Some(6.0))).unwrap();
        assert_eq!(small.known_words_percent, 0.0);
        assert!((0.0..=1.0).contains(&small.match_score));
        assert!(large.match_score >= small.match_score);
    }

    #[test]
    fn test_empty_text_excluded() {
        let scorer = Scorer::new(ScoringConfig::default());
        let mut empty = text(1, 0..0, Some(6.0));
        assert!(scorer.score(&known(0..5), 6.0, &empty).is_none());
        empty.occurrences.insert(WordId(1), 0);
        assert!(scorer.score(&known(0..5), 6.0, &empty).is_none());
    }

    #[test]
    fn test_rank_top_three_with_tie_breaks() {
        let scorer = Scorer::new(ScoringConfig::default());
        let p = profile(0..36, 7.0);
        let texts = vec![
            text(9, 0..60, Some(8.0)),
            text(4, 0..60, Some(7.0)),
            text(2, 0..60, Some(7.0)),
            text(7, 0..60, None),
            text(5, 0..0, Some(7.0)),
        ];

        let ranked = scorer.rank(&p, &texts);
        let ids: Vec<TextId> = ranked.iter().map(|s| s.text_id).collect();
        // 2 and 4 tie on score and gap; 9 has a smaller bonus
        assert_eq!(ids, vec![TextId(2), TextId(4), TextId(9)]);
    }

    #[test]
    fn test_rank_returns_fewer_when_corpus_is_small() {
        let scorer = Scorer::new(ScoringConfig::default());
        let p = profile(0..5, 6.0);
        let ranked = scorer.rank(&p, &[text(1, 0..10, Some(6.0)), text(2, 0..0, None)]);
        assert_eq!(ranked.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_score_in_unit_interval(
            vocab in 1i64..200,
            known_n in 0i64..200,
            student_rl in 0.0f64..14.0,
            text_rl in proptest::option::of(0.0f64..14.0),
        ) {
            let scorer = Scorer::new(ScoringConfig::default());
            let s = scorer.score(&known(0..known_n), student_rl, &text(1, 0..vocab, text_rl)).unwrap();
            prop_assert!(s.match_score >= 0.0 && s.match_score <= 1.0);
            prop_assert!(s.known_words_percent >= 0.0 && s.known_words_percent <= 100.0);
        }

        #[test]
        fn prop_band_beats_outside(
            in_known_pct in 50u32..=75,
            out_known_pct in prop_oneof![0u32..50, 77u32..=100],
        ) {
            let scorer = Scorer::new(ScoringConfig::default());
            // Same text, only the known set differs
            let size = 80i64;
            let inside = known(0..(size * in_known_pct as i64 / 100));
            let outside = known(0..(size * out_known_pct as i64 / 100));
            let t = text(1, 0..size, Some(7.0));
            let a = scorer.score(&inside, 7.0, &t).unwrap();
            let b = scorer.score(&outside, 7.0, &t).unwrap();
            prop_assume!(a.new_words_count >= 10 && a.new_words_count <= 30);
            prop_assert!(a.match_score > b.match_score);
        }
    }
}
