//! Class aggregator
//!
//! Rolls individual profiles and top-K picks up into class statistics and
//! the class-wide text recommendations. Output is fully determined by the
//! inputs, so rewriting the stored class rows on every run is idempotent.

use crate::catalog::VocabularyCatalog;
use crate::config::ClassConfig;
use crate::scoring::TextScore;
use crate::types::{Recommendation, StudentId, Subject, TextId, VocabularyProfile, WordId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingWordStat {
    pub word_id: WordId,
    pub word: String,
    pub students_missing: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MisusedWordStat {
    pub word_id: WordId,
    pub word: String,
    pub total_incorrect: u64,
    pub students_affected: usize,
}

/// A text chosen for the whole class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassPick {
    pub text_id: TextId,
    pub students_recommended_count: u32,
    pub avg_match_score: f64,
    pub avg_known_words_percent: f64,
    pub avg_new_words_count: f64,
}

impl ClassPick {
    pub fn into_recommendation(&self, rank: u32, created_at: DateTime<Utc>) -> Recommendation {
        Recommendation {
            subject: Subject::Class,
            text_id: self.text_id,
            rank,
            match_score: self.avg_match_score,
            known_words_percent: self.avg_known_words_percent,
            new_words_count: self.avg_new_words_count.round() as u32,
            students_recommended_count: Some(self.students_recommended_count),
            created_at,
        }
    }
}

/// Class-wide statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassStats {
    pub total_students: usize,
    pub avg_mastery_percent: f64,
    /// Floor of reading level → number of students
    pub reading_level_distribution: BTreeMap<i64, usize>,
    pub top_missing_words: Vec<MissingWordStat>,
    pub commonly_misused_words: Vec<MisusedWordStat>,
    pub class_recommendations: Vec<ClassPick>,
}

pub struct ClassAggregator<'a> {
    catalog: &'a VocabularyCatalog,
    config: &'a ClassConfig,
}

impl<'a> ClassAggregator<'a> {
    pub fn new(catalog: &'a VocabularyCatalog, config: &'a ClassConfig) -> Self {
        Self { catalog, config }
    }

    pub fn aggregate(
        &self,
        profiles: &[VocabularyProfile],
        picks: &BTreeMap<StudentId, Vec<TextScore>>,
    ) -> ClassStats {
        let total_students = profiles.len();
        let avg_mastery_percent = if total_students == 0 {
            0.0
        } else {
            profiles.iter().map(|p| p.mastery_percent).sum::<f64>() / total_students as f64
        };

        let mut reading_level_distribution = BTreeMap::new();
        for p in profiles {
            *reading_level_distribution
                .entry(p.reading_level.floor() as i64)
                .or_insert(0) += 1;
        }

        ClassStats {
            total_students,
            avg_mastery_percent,
            reading_level_distribution,
            top_missing_words: self.top_missing_words(profiles),
            commonly_misused_words: self.commonly_misused_words(profiles),
            class_recommendations: self.class_recommendations(picks),
        }
    }

    /// Words missed by the most students, ties by word id
    pub fn top_missing_words(&self, profiles: &[VocabularyProfile]) -> Vec<MissingWordStat> {
        let mut counts: BTreeMap<WordId, usize> = BTreeMap::new();
        for p in profiles {
            for id in &p.missing_words {
                *counts.entry(*id).or_default() += 1;
            }
        }

        let mut ranked: Vec<(WordId, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked
            .into_iter()
            .take(self.config.top_missing)
            .map(|(word_id, students_missing)| MissingWordStat {
                word_id,
                word: self.surface(word_id),
                students_missing,
            })
            .collect()
    }

    /// Words by total incorrect uses; dismissed rows do not count
    pub fn commonly_misused_words(&self, profiles: &[VocabularyProfile]) -> Vec<MisusedWordStat> {
        let mut totals: BTreeMap<WordId, (u64, usize)> = BTreeMap::new();
        for p in profiles {
            for entry in p.misused_entries() {
                let slot = totals.entry(entry.word_id).or_default();
                slot.0 += entry.incorrect_count as u64;
                slot.1 += 1;
            }
        }

        let mut ranked: Vec<(WordId, (u64, usize))> = totals.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1 .0
                .cmp(&a.1 .0)
                .then(b.1 .1.cmp(&a.1 .1))
                .then(a.0.cmp(&b.0))
        });
        ranked
            .into_iter()
            .take(self.config.top_misused)
            .map(|(word_id, (total_incorrect, students_affected))| MisusedWordStat {
                word_id,
                word: self.surface(word_id),
                total_incorrect,
                students_affected,
            })
            .collect()
    }

    /// Texts appearing in the most individual top-K lists.
    ///
    /// Ties: higher average score, then lower text id.
    pub fn class_recommendations(&self, picks: &BTreeMap<StudentId, Vec<TextScore>>) -> Vec<ClassPick> {
        #[derive(Default)]
        struct Tally {
            students: u32,
            score: f64,
            known: f64,
            new_words: f64,
        }

        let mut tallies: BTreeMap<TextId, Tally> = BTreeMap::new();
        for scores in picks.values() {
            for s in scores {
                let t = tallies.entry(s.text_id).or_default();
                t.students += 1;
                t.score += s.match_score;
                t.known += s.known_words_percent;
                t.new_words += s.new_words_count as f64;
            }
        }

        let mut ranked: Vec<ClassPick> = tallies
            .into_iter()
            .map(|(text_id, t)| {
                let n = t.students as f64;
                ClassPick {
                    text_id,
                    students_recommended_count: t.students,
                    avg_match_score: t.score / n,
                    avg_known_words_percent: t.known / n,
                    avg_new_words_count: t.new_words / n,
                }
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.students_recommended_count
                .cmp(&a.students_recommended_count)
                .then(b.avg_match_score.total_cmp(&a.avg_match_score))
                .then(a.text_id.cmp(&b.text_id))
        });
        ranked.truncate(self.config.class_picks);
        ranked
    }

    fn surface(&self, id: WordId) -> String {
        self.catalog
            .get(id)
            .map(|w| w.surface_form.clone())
            .unwrap_or_else(|| format!("#{}", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Dismissal, DismissalReason, ProfileEntry};

    fn catalog() -> VocabularyCatalog {
        VocabularyCatalog::from_grade_lists(vec![(6, vec!["abide", "brisk", "candor", "dwell"])])
    }

    fn id(catalog: &VocabularyCatalog, word: &str) -> WordId {
        catalog.lookup(word).unwrap().id
    }

    fn profile(student: i64, reading_level: f64, mastery: f64, missing: Vec<WordId>) -> VocabularyProfile {
        VocabularyProfile {
            student_id: StudentId(student),
            assigned_grade: 6,
            reading_level,
            entries: BTreeMap::new(),
            total_grade_level_words: 4,
            words_mastered: 0,
            mastery_percent: mastery,
            missing_words: missing,
        }
    }

    fn misuse(p: &mut VocabularyProfile, word_id: WordId, incorrect: u32, dismissed: bool) {
        let mut entry = ProfileEntry::baseline(p.student_id, word_id);
        entry.baseline_known = false;
        entry.incorrect_count = incorrect;
        entry.usage_count = incorrect;
        entry.judged = true;
        if dismissed {
            entry.dismissal = Some(Dismissal {
                reason: DismissalReason::Addressed,
                dismissed_at: Utc::now(),
            });
        }
        p.entries.insert(word_id, entry);
    }

    fn pick(text: i64, score: f64) -> TextScore {
        TextScore {
            text_id: TextId(text),
            match_score: score,
            known_words_percent: 60.0,
            new_words_count: 12,
            reading_level_diff: Some(0.0),
        }
    }

    #[test]
    fn test_top_missing_words_ties_by_id() {
        let c = catalog();
        let config = ClassConfig {
            top_missing: 2,
            ..Default::default()
        };
        let agg = ClassAggregator::new(&c, &config);
        let (abide, brisk, candor) = (id(&c, "abide"), id(&c, "brisk"), id(&c, "candor"));
        let profiles = vec![
            profile(1, 6.2, 50.0, vec![candor, brisk]),
            profile(2, 6.9, 70.0, vec![candor, abide]),
        ];

        let missing = agg.top_missing_words(&profiles);
        assert_eq!(missing.len(), 2);
        assert_eq!(missing[0].word, "candor");
        assert_eq!(missing[0].students_missing, 2);
        assert_eq!(missing[1].word, "abide");
    }

    #[test]
    fn test_misused_excludes_dismissed() {
        let c = catalog();
        let config = ClassConfig::default();
        let agg = ClassAggregator::new(&c, &config);
        let (abide, dwell) = (id(&c, "abide"), id(&c, "dwell"));

        let mut a = profile(1, 6.0, 50.0, vec![]);
        let mut b = profile(2, 6.0, 50.0, vec![]);
        misuse(&mut a, abide, 1, false);
        misuse(&mut b, abide, 1, false);
        misuse(&mut a, dwell, 2, false);
        misuse(&mut b, dwell, 5, true);

        let misused = agg.commonly_misused_words(&[a, b]);
        // abide: 2 incorrect across 2 students; dwell: 2 from one student
        assert_eq!(misused[0].word, "abide");
        assert_eq!(misused[0].students_affected, 2);
        assert_eq!(misused[1].word, "dwell");
        assert_eq!(misused[1].total_incorrect, 2);
    }

    #[test]
    fn test_class_picks_two_by_count_then_score() {
        let c = catalog();
        let config = ClassConfig::default();
        let agg = ClassAggregator::new(&c, &config);
        let mut picks = BTreeMap::new();
        picks.insert(StudentId(1), vec![pick(10, 0.9), pick(20, 0.8), pick(30, 0.7)]);
        picks.insert(StudentId(2), vec![pick(20, 0.6), pick(30, 0.9), pick(40, 0.5)]);
        picks.insert(StudentId(3), vec![pick(50, 0.95)]);

        let chosen = agg.class_recommendations(&picks);
        assert_eq!(chosen.len(), 2);
        // 20 and 30 both have two students; 30 averages 0.8 vs 0.7
        assert_eq!(chosen[0].text_id, TextId(30));
        assert_eq!(chosen[1].text_id, TextId(20));
        assert_eq!(chosen[0].students_recommended_count, 2);

        let row = chosen[0].into_recommendation(1, Utc::now());
        assert_eq!(row.subject, Subject::Class);
        assert_eq!(row.students_recommended_count, Some(2));
    }

    #[test]
    fn test_aggregate_distribution_and_average() {
        let c = catalog();
        let config = ClassConfig::default();
        let agg = ClassAggregator::new(&c, &config);
        let profiles = vec![
            profile(1, 6.2, 40.0, vec![]),
            profile(2, 6.9, 60.0, vec![]),
            profile(3, 8.1, 80.0, vec![]),
        ];

        let stats = agg.aggregate(&profiles, &BTreeMap::new());
        assert_eq!(stats.total_students, 3);
        assert!((stats.avg_mastery_percent - 60.0).abs() < 1e-9);
        assert_eq!(stats.reading_level_distribution[&6], 2);
        assert_eq!(stats.reading_level_distribution[&8], 1);
        assert!(stats.class_recommendations.is_empty());

        let empty = agg.aggregate(&[], &BTreeMap::new());
        assert_eq!(empty.avg_mastery_percent, 0.0);
    }
}
