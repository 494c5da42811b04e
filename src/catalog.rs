//! Vocabulary catalog
//!
//! The immutable set of target words with grade levels. Built once from
//! grade-labelled word lists and passed by reference into every stage.

use crate::error::{Result, VocabError};
use crate::types::{VocabularyWord, WordId};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info, warn};

static GRADE_IN_FILENAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d{1,2})(?:st|nd|rd|th)?[_\-]?grade").unwrap());

/// On-disk shape of one grade list
#[derive(Debug, Deserialize)]
struct GradeListFile {
    #[serde(default)]
    grade: Option<u8>,
    words: Vec<String>,
}

/// A word whose grade was raised because it appeared in a higher list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradeUpgrade {
    pub word: String,
    pub from_grade: u8,
    pub to_grade: u8,
}

/// Canonical target vocabulary
#[derive(Debug, Clone)]
pub struct VocabularyCatalog {
    words: Vec<VocabularyWord>,
    by_form: HashMap<String, usize>,
    by_id: HashMap<WordId, usize>,
    upgrades: Vec<GradeUpgrade>,
}

impl VocabularyCatalog {
    /// Build from `(grade, words)` lists. Duplicates keep the highest grade.
    pub fn from_grade_lists<I, S>(lists: I) -> Self
    where
        I: IntoIterator<Item = (u8, Vec<S>)>,
        S: AsRef<str>,
    {
        let mut grades: BTreeMap<String, u8> = BTreeMap::new();
        let mut upgrades = Vec::new();

        for (grade, words) in lists {
            for raw in words {
                let word = raw.as_ref().trim().to_lowercase();
                if word.is_empty() {
                    continue;
                }
                match grades.get_mut(&word) {
                    Some(existing) if grade > *existing => {
                        upgrades.push(GradeUpgrade {
                            word: word.clone(),
                            from_grade: *existing,
                            to_grade: grade,
                        });
                        *existing = grade;
                    }
                    Some(_) => {}
                    None => {
                        grades.insert(word, grade);
                    }
                }
            }
        }

        let mut ordered: Vec<(u8, String)> = grades.into_iter().map(|(w, g)| (g, w)).collect();
        ordered.sort();

        let words: Vec<VocabularyWord> = ordered
            .into_iter()
            .enumerate()
            .map(|(i, (grade_level, surface_form))| VocabularyWord {
                id: WordId(i as i64 + 1),
                surface_form,
                grade_level,
            })
            .collect();

        let mut catalog = Self::from_words(words);
        catalog.upgrades = upgrades;
        catalog
    }

    /// Rebuild from stored words, keeping their ids
    pub fn from_words(mut words: Vec<VocabularyWord>) -> Self {
        words.sort_by(|a, b| {
            a.grade_level
                .cmp(&b.grade_level)
                .then_with(|| a.surface_form.cmp(&b.surface_form))
        });
        let by_form = words
            .iter()
            .enumerate()
            .map(|(i, w)| (w.surface_form.clone(), i))
            .collect();
        let by_id = words.iter().enumerate().map(|(i, w)| (w.id, i)).collect();

        Self {
            words,
            by_form,
            by_id,
            upgrades: Vec::new(),
        }
    }

    /// Reuse previously assigned ids so stored rows keep pointing at the
    /// same words across catalog edits.
    ///
    /// `known` maps every surface form ever stored to its id, including
    /// words since removed from the lists. Words seen for the first time get
    /// ids above the largest known id, so an id is never handed to a
    /// different word.
    pub fn with_known_ids(self, known: &HashMap<String, WordId>) -> Self {
        let mut next = known.values().map(|id| id.0).max().unwrap_or(0);
        let mut fresh = 0usize;
        let words: Vec<VocabularyWord> = self
            .words
            .into_iter()
            .map(|w| {
                let id = match known.get(&w.surface_form) {
                    Some(id) => *id,
                    None => {
                        next += 1;
                        fresh += 1;
                        WordId(next)
                    }
                };
                VocabularyWord { id, ..w }
            })
            .collect();
        if !known.is_empty() {
            debug!("Reused stored word ids; {} new words", fresh);
        }

        let mut catalog = Self::from_words(words);
        catalog.upgrades = self.upgrades;
        catalog
    }

    /// Load every `*.json` grade list in a directory
    pub fn load_dir(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(VocabError::MissingCatalog(format!(
                "{} is not a directory",
                dir.display()
            )));
        }

        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .collect();
        paths.sort();

        let mut lists = Vec::new();
        for path in paths {
            let contents = std::fs::read_to_string(&path)?;
            let file: GradeListFile = match serde_json::from_str(&contents) {
                Ok(f) => f,
                Err(e) => {
                    warn!("Skipping unreadable grade list {}: {}", path.display(), e);
                    continue;
                }
            };
            let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            let Some(grade) = file.grade.or_else(|| grade_from_filename(file_name)) else {
                warn!("Skipping {}: no grade in file or file name", path.display());
                continue;
            };
            debug!("Loaded {} words from {}", file.words.len(), file_name);
            lists.push((grade, file.words));
        }

        let catalog = Self::from_grade_lists(lists);
        if catalog.is_empty() {
            return Err(VocabError::MissingCatalog(format!(
                "no vocabulary words found in {}",
                dir.display()
            )));
        }

        info!(
            "Loaded {} catalog words ({} upgraded to a higher grade)",
            catalog.len(),
            catalog.upgrades.len()
        );
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn words(&self) -> &[VocabularyWord] {
        &self.words
    }

    pub fn get(&self, id: WordId) -> Option<&VocabularyWord> {
        self.by_id.get(&id).map(|&i| &self.words[i])
    }

    pub fn lookup(&self, surface_form: &str) -> Option<&VocabularyWord> {
        self.by_form.get(surface_form).map(|&i| &self.words[i])
    }

    pub fn contains_form(&self, surface_form: &str) -> bool {
        self.by_form.contains_key(surface_form)
    }

    pub fn words_at_grade(&self, grade: u8) -> impl Iterator<Item = &VocabularyWord> {
        self.words.iter().filter(move |w| w.grade_level == grade)
    }

    pub fn words_at_or_below(&self, grade: u8) -> impl Iterator<Item = &VocabularyWord> {
        self.words.iter().filter(move |w| w.grade_level <= grade)
    }

    pub fn upgrades(&self) -> &[GradeUpgrade] {
        &self.upgrades
    }
}

fn grade_from_filename(name: &str) -> Option<u8> {
    GRADE_IN_FILENAME
        .captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_duplicate_keeps_highest_grade() {
        let catalog = VocabularyCatalog::from_grade_lists(vec![
            (5, vec!["Endure", "prevail"]),
            (7, vec!["endure", "thorough"]),
            (6, vec!["endure"]),
        ]);

        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.lookup("endure").unwrap().grade_level, 7);
        assert_eq!(catalog.upgrades().len(), 1);
        assert_eq!(catalog.upgrades()[0].from_grade, 5);
    }

    #[test]
    fn test_ids_are_stable_by_grade_then_word() {
        let a = VocabularyCatalog::from_grade_lists(vec![(6, vec!["zeal", "abide"]), (5, vec!["keen"])]);
        let b = VocabularyCatalog::from_grade_lists(vec![(5, vec!["keen"]), (6, vec!["abide", "zeal"])]);

        assert_eq!(a.words(), b.words());
        assert_eq!(a.lookup("keen").unwrap().id, WordId(1));
        assert_eq!(a.lookup("abide").unwrap().id, WordId(2));
        assert_eq!(a.lookup("zeal").unwrap().id, WordId(3));
    }

    #[test]
    fn test_from_words_keeps_ids() {
        let built = VocabularyCatalog::from_grade_lists(vec![(6, vec!["zeal", "abide"]), (5, vec!["keen"])]);
        let mut stored = built.words().to_vec();
        stored.reverse();
        let restored = VocabularyCatalog::from_words(stored);
        assert_eq!(restored.words(), built.words());
        assert_eq!(restored.lookup("zeal").unwrap().id, WordId(3));
    }

    #[test]
    fn test_known_ids_survive_list_edits() {
        let first = VocabularyCatalog::from_grade_lists(vec![
            (5, vec!["abide", "keen"]),
            (7, vec!["thorough"]),
        ]);
        let known: HashMap<String, WordId> = first
            .words()
            .iter()
            .map(|w| (w.surface_form.clone(), w.id))
            .collect();

        // "abide" removed, "aaa" added ahead of everything in sort order
        let edited = VocabularyCatalog::from_grade_lists(vec![
            (5, vec!["aaa", "keen"]),
            (7, vec!["thorough"]),
        ])
        .with_known_ids(&known);

        assert_eq!(edited.lookup("keen").unwrap().id, known["keen"]);
        assert_eq!(edited.lookup("thorough").unwrap().id, known["thorough"]);
        assert_eq!(edited.lookup("aaa").unwrap().id, WordId(4));
        assert!(edited.get(known["abide"]).is_none());
        // Catalog order is still (grade, word)
        assert_eq!(edited.words()[0].surface_form, "aaa");
    }

    #[test]
    fn test_grade_filters() {
        let catalog = VocabularyCatalog::from_grade_lists(vec![
            (5, vec!["keen"]),
            (6, vec!["abide"]),
            (7, vec!["zeal"]),
        ]);
        assert_eq!(catalog.words_at_grade(6).count(), 1);
        assert_eq!(catalog.words_at_or_below(6).count(), 2);
    }

    #[test]
    fn test_grade_from_filename() {
        assert_eq!(grade_from_filename("5th_grade.json"), Some(5));
        assert_eq!(grade_from_filename("grade_list.json"), None);
        assert_eq!(grade_from_filename("8th-grade.json"), Some(8));
    }

    #[test]
    fn test_load_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("5th_grade.json"), r#"{"words": ["keen", " "]}"#).unwrap();
        std::fs::write(dir.path().join("extra.json"), r#"{"grade": 7, "words": ["keen"]}"#).unwrap();
        std::fs::write(dir.path().join("broken.json"), "not json").unwrap();

        let catalog = VocabularyCatalog::load_dir(dir.path()).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.lookup("keen").unwrap().grade_level, 7);
    }

    #[test]
    fn test_load_empty_dir_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = VocabularyCatalog::load_dir(dir.path()).unwrap_err();
        assert!(err.is_fatal());
    }
}
