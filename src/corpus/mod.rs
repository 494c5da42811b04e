//! Corpus indexer
//!
//! Reads candidate-text metadata and per-text frequency tables, applies the
//! configured filters and keeps only catalog-word counts. A text that is
//! filtered out or lacks a usable table is tallied and skipped; only an
//! entirely missing or empty corpus is fatal.

use crate::catalog::VocabularyCatalog;
use crate::config::CorpusConfig;
use crate::error::{Result, VocabError};
use crate::nlp::Lemmatize;
use crate::types::{TextId, TextMetadata, TextVocabularyIndex, WordId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const METADATA_FILE: &str = "metadata.json";
pub const COUNTS_DIR: &str = "counts";

/// Why a text was left out of the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    FilteredLanguage,
    FilteredCategory,
    FilteredPopularity,
    Unavailable,
    MissingCounts,
    UnreadableCounts,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::FilteredLanguage => "filtered_language",
            SkipReason::FilteredCategory => "filtered_category",
            SkipReason::FilteredPopularity => "filtered_popularity",
            SkipReason::Unavailable => "unavailable",
            SkipReason::MissingCounts => "missing_counts",
            SkipReason::UnreadableCounts => "unreadable_counts",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Indexed texts plus the failure tally
#[derive(Debug, Clone, Default)]
pub struct CorpusIndex {
    pub texts: Vec<TextVocabularyIndex>,
    pub skipped: BTreeMap<SkipReason, usize>,
}

impl CorpusIndex {
    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }

    /// Tally keyed by the reason's string form, as stored in run summaries
    pub fn skipped_by_name(&self) -> BTreeMap<String, usize> {
        self.skipped
            .iter()
            .map(|(reason, count)| (reason.as_str().to_string(), *count))
            .collect()
    }
}

/// Builds text vocabulary indexes from a corpus directory
pub struct CorpusIndexer<'a> {
    catalog: &'a VocabularyCatalog,
    lemmatizer: &'a dyn Lemmatize,
    config: &'a CorpusConfig,
}

impl<'a> CorpusIndexer<'a> {
    pub fn new(
        catalog: &'a VocabularyCatalog,
        lemmatizer: &'a dyn Lemmatize,
        config: &'a CorpusConfig,
    ) -> Self {
        Self {
            catalog,
            lemmatizer,
            config,
        }
    }

    /// Index `<dir>/metadata.json` against `<dir>/counts/`
    pub fn index_dir(&self, dir: &Path) -> Result<CorpusIndex> {
        let metadata_path = dir.join(METADATA_FILE);
        if !metadata_path.is_file() {
            return Err(VocabError::MissingCorpus(format!(
                "{} not found",
                metadata_path.display()
            )));
        }
        let contents = std::fs::read_to_string(&metadata_path)?;
        let metadata: Vec<TextMetadata> = serde_json::from_str(&contents).map_err(|e| {
            VocabError::MissingCorpus(format!("{}: {}", metadata_path.display(), e))
        })?;

        let index = self.index(metadata, &dir.join(COUNTS_DIR))?;
        info!(
            "Indexed {} texts from {} ({} skipped)",
            index.texts.len(),
            dir.display(),
            index.skipped_total()
        );
        Ok(index)
    }

    /// Index already-loaded metadata against a counts directory
    pub fn index(&self, metadata: Vec<TextMetadata>, counts_dir: &Path) -> Result<CorpusIndex> {
        if metadata.is_empty() {
            return Err(VocabError::MissingCorpus("corpus metadata is empty".into()));
        }

        let mut index = CorpusIndex::default();
        let mut eligible = Vec::new();
        for meta in metadata {
            match self.filter(&meta) {
                Some(reason) => {
                    debug!("Skipping text {} ({}): {}", meta.id, meta.title, reason);
                    *index.skipped.entry(reason).or_default() += 1;
                }
                None => eligible.push(meta),
            }
        }

        if let Some(limit) = self.config.max_texts {
            eligible.sort_by(|a, b| b.downloads.cmp(&a.downloads).then(a.id.cmp(&b.id)));
            if eligible.len() > limit {
                debug!("Keeping the {} most downloaded of {} eligible texts", limit, eligible.len());
                eligible.truncate(limit);
            }
        }

        for meta in eligible {
            let Some(path) = counts_path(counts_dir, meta.id) else {
                warn!("No frequency table for text {} ({})", meta.id, meta.title);
                *index.skipped.entry(SkipReason::MissingCounts).or_default() += 1;
                continue;
            };
            match self.read_counts(&path) {
                Ok((total_word_count, occurrences)) => index.texts.push(TextVocabularyIndex {
                    text_id: meta.id,
                    title: meta.title,
                    author: meta.author,
                    total_word_count,
                    reading_level: meta.reading_level,
                    occurrences,
                }),
                Err(e) => {
                    warn!("Unreadable frequency table {}: {}", path.display(), e);
                    *index.skipped.entry(SkipReason::UnreadableCounts).or_default() += 1;
                }
            }
        }

        if index.texts.is_empty() {
            return Err(VocabError::MissingCorpus(format!(
                "no usable texts ({} skipped)",
                index.skipped_total()
            )));
        }
        index.texts.sort_by_key(|t| t.text_id);
        Ok(index)
    }

    fn filter(&self, meta: &TextMetadata) -> Option<SkipReason> {
        if !self
            .config
            .languages
            .iter()
            .any(|l| l.eq_ignore_ascii_case(&meta.language))
        {
            return Some(SkipReason::FilteredLanguage);
        }
        if !meta.category.eq_ignore_ascii_case(&self.config.category) {
            return Some(SkipReason::FilteredCategory);
        }
        if meta.downloads < self.config.min_downloads {
            return Some(SkipReason::FilteredPopularity);
        }
        if meta.available == Some(false) {
            return Some(SkipReason::Unavailable);
        }
        None
    }

    /// Parse `token count` lines, returning the total token count and the
    /// catalog-word intersection
    fn read_counts(&self, path: &Path) -> Result<(u64, BTreeMap<WordId, u64>)> {
        let contents = std::fs::read_to_string(path)?;
        let mut total = 0u64;
        let mut parsed_lines = 0usize;
        let mut occurrences: BTreeMap<WordId, u64> = BTreeMap::new();

        for line in contents.lines() {
            let mut fields = line.split_whitespace();
            let (Some(token), Some(count)) = (fields.next(), fields.next()) else {
                continue;
            };
            let Ok(count) = count.parse::<u64>() else {
                continue;
            };
            parsed_lines += 1;
            total = total.saturating_add(count);

            if count == 0 || !token.chars().all(char::is_alphabetic) {
                continue;
            }
            let lemma = self.lemmatizer.lemmatize(&token.to_lowercase());
            if let Some(word) = self.catalog.lookup(&lemma) {
                let slot = occurrences.entry(word.id).or_default();
                *slot = slot.saturating_add(count);
            }
        }

        if parsed_lines == 0 {
            return Err(VocabError::InvalidInput(format!(
                "no `token count` lines in {}",
                path.display()
            )));
        }
        Ok((total, occurrences))
    }
}

/// First existing table among `PG<id>_counts.txt`, `<id>_counts.txt`, `<id>.txt`
fn counts_path(counts_dir: &Path, id: TextId) -> Option<PathBuf> {
    [
        format!("PG{}_counts.txt", id),
        format!("{}_counts.txt", id),
        format!("{}.txt", id),
    ]
    .into_iter()
    .map(|name| counts_dir.join(name))
    .find(|p| p.is_file())
}
