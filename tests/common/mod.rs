//! Common test utilities and helpers

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use vocabmatch_core::{
    Judgment, Pipeline, PipelineConfig, Result, SqliteStore, UsageJudge, VocabError,
};

const TRANSCRIPT: &str = "\
[09:15 AM]
Teacher: Today we ponder how people endure hardship and prevail.
Student_Maya: I think the explorers had to endure a meager winter.
Student_Leo: I was thorough the door before the bell.
[09:17 AM]
Teacher: Leo, did you mean \"through\"?
Student_Maya: Kindness prevails when people are resilient.
";

const ROSTER: &str = r#"[
    {"id": 1, "name": "Maya Chen", "assigned_grade": 7, "reading_level": 7.5},
    {"id": 2, "name": "Leo Park", "assigned_grade": 7, "reading_level": 6.0},
    {"id": 3, "name": "Ana Ruiz", "assigned_grade": 7, "reading_level": 8.0}
]"#;

const METADATA: &str = r#"[
    {"id": 101, "title": "Ice Trail", "language": "en", "category": "Text", "downloads": 900, "reading_level": 7.0},
    {"id": 102, "title": "River Days", "language": "en", "category": "Text", "downloads": 400, "reading_level": 6.5},
    {"id": 103, "title": "Stars Over Nowhere", "language": "en", "category": "Text", "downloads": 300, "reading_level": 8.5},
    {"id": 104, "title": "Quiet", "language": "en", "category": "Text", "downloads": 50, "reading_level": 7.0},
    {"id": 105, "title": "Le Voyage", "language": "fr", "category": "Text", "downloads": 800},
    {"id": 106, "title": "Lost Pages", "language": "en", "category": "Text", "downloads": 100}
]"#;

/// Classroom inputs written to a temp directory
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let root = dir.path();

        let vocab = root.join("vocab");
        std::fs::create_dir(&vocab).unwrap();
        write(&vocab.join("5th_grade.json"), r#"{"words": ["keen", "abide", "brisk", "dwell"]}"#);
        write(&vocab.join("6th_grade.json"), r#"{"words": ["endure", "vivid", "candid"]}"#);
        write(
            &vocab.join("7th_grade.json"),
            r#"{"words": ["prevail", "thorough", "ponder", "resilient", "meager", "scrutiny"]}"#,
        );
        write(&vocab.join("8th_grade.json"), r#"{"words": ["ubiquitous", "Keen"]}"#);

        write(&root.join("students.json"), ROSTER);
        write(&root.join("transcript.txt"), TRANSCRIPT);

        let essays = root.join("essays");
        std::fs::create_dir(&essays).unwrap();
        write(
            &essays.join("1_mystery.txt"),
            "We must examine every clue with scrutiny. My keen eye helped.",
        );
        write(&essays.join("2.txt"), "He threw the ball. The painting was vivid.");
        write(&essays.join("notes.txt"), "Teacher notes, not an essay.");

        let corpus = root.join("corpus");
        let counts = corpus.join("counts");
        std::fs::create_dir_all(&counts).unwrap();
        write(&corpus.join("metadata.json"), METADATA);
        write(
            &counts.join("PG101_counts.txt"),
            "the\t900\nendured\t4\nprevail\t2\nmeager\t3\nponder\t1\nkeen\t5\nbrisk\t2\ndwell\t1\nthorough\t2\nubiquitous\t1\n",
        );
        write(
            &counts.join("102_counts.txt"),
            "the 500\nkeen 2\nabide 1\nbrisk 1\nvivid 3\n",
        );
        write(
            &counts.join("103.txt"),
            "the\t800\nscrutiny\t2\nresilient\t1\nubiquitous\t3\ncandid\t2\npondered\t1\n",
        );
        write(&counts.join("104.txt"), "the\t100\nand\t50\n");
        write(&counts.join("105.txt"), "le\t100\n");

        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Overwrite a fixture file, e.g. `vocab/5th_grade.json`
    pub fn rewrite(&self, relative: &str, contents: &str) {
        write(&self.path().join(relative), contents);
    }

    pub fn db_path(&self) -> PathBuf {
        self.path().join("db").join("vocabmatch.db")
    }

    /// Configuration pointing at the fixture with a fast retry policy
    pub fn config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.database.path = self.db_path();
        config.database.pool_size = 2;
        config.inputs.vocab_dir = self.path().join("vocab");
        config.inputs.roster = self.path().join("students.json");
        config.inputs.transcript = Some(self.path().join("transcript.txt"));
        config.inputs.essays_dir = Some(self.path().join("essays"));
        config.inputs.corpus_dir = self.path().join("corpus");
        config.judge.max_retries = 2;
        config.judge.backoff_base_ms = 1;
        config.judge.max_backoff_ms = 2;
        config.judge.timeout_secs = 5;
        config
    }

    pub fn store(&self) -> Arc<SqliteStore> {
        Arc::new(SqliteStore::new(self.db_path(), 2).expect("Failed to open test store"))
    }

    pub fn pipeline(&self, store: Arc<SqliteStore>) -> Pipeline {
        Pipeline::new(self.config(), store)
    }
}

fn write(path: &Path, contents: &str) {
    std::fs::write(path, contents).expect("Failed to write fixture file");
}

/// Deterministic judge: listed words are misused, failing words always
/// hit a rate limit, everything else is used correctly
#[derive(Default)]
pub struct ScriptedJudge {
    misused: HashSet<String>,
    failing: HashSet<String>,
    calls: AtomicUsize,
}

impl ScriptedJudge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn misusing(mut self, words: &[&str]) -> Self {
        self.misused.extend(words.iter().map(|w| w.to_string()));
        self
    }

    pub fn failing(mut self, words: &[&str]) -> Self {
        self.failing.extend(words.iter().map(|w| w.to_string()));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UsageJudge for ScriptedJudge {
    async fn classify(&self, word: &str, sentences: &[String]) -> Result<Judgment> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(word) {
            return Err(VocabError::RateLimitExceeded(format!("scripted failure for {}", word)));
        }
        let n = sentences.len() as u32;
        Ok(if self.misused.contains(word) {
            Judgment {
                correct_count: 0,
                incorrect_count: n,
                misuse_examples: sentences.to_vec(),
            }
        } else {
            Judgment {
                correct_count: n,
                incorrect_count: 0,
                misuse_examples: vec![],
            }
        })
    }
}
