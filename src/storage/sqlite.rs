//! SQLite result store
//!
//! rusqlite behind a deadpool-sqlite connection pool. Statements run inside
//! `interact` on the pool's blocking threads; multi-row replacements use one
//! transaction so readers never see half a set.

use crate::class::ClassStats;
use crate::error::{Result, VocabError};
use crate::pipeline::RunSummary;
use crate::storage::{ResultStore, UnjudgedRecord};
use crate::types::{
    Dismissal, DismissalReason, ProfileEntry, Recommendation, Student, StudentId, Subject, TextId,
    TextVocabularyIndex, VocabularyProfile, VocabularyWord, WordId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_sqlite::{Config, Pool, PoolConfig, Runtime};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, info};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS vocabulary_words (
    id INTEGER PRIMARY KEY,
    surface_form TEXT NOT NULL UNIQUE,
    grade_level INTEGER NOT NULL,
    active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS students (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    assigned_grade INTEGER NOT NULL,
    reading_level REAL NOT NULL,
    total_grade_level_words INTEGER NOT NULL DEFAULT 0,
    words_mastered INTEGER NOT NULL DEFAULT 0,
    mastery_percent REAL NOT NULL DEFAULT 0,
    missing_words TEXT NOT NULL DEFAULT '[]',
    profiled_at TEXT
);

CREATE TABLE IF NOT EXISTS texts (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    author TEXT,
    total_word_count INTEGER NOT NULL,
    reading_level REAL
);

CREATE TABLE IF NOT EXISTS text_vocabulary (
    text_id INTEGER NOT NULL,
    word_id INTEGER NOT NULL,
    occurrence_count INTEGER NOT NULL,
    UNIQUE(text_id, word_id)
);

CREATE TABLE IF NOT EXISTS student_vocabulary (
    student_id INTEGER NOT NULL,
    word_id INTEGER NOT NULL,
    usage_count INTEGER NOT NULL,
    correct_count INTEGER NOT NULL,
    incorrect_count INTEGER NOT NULL,
    misuse_examples TEXT NOT NULL DEFAULT '[]',
    judged INTEGER NOT NULL DEFAULT 0,
    baseline_known INTEGER NOT NULL DEFAULT 0,
    dismissal_reason TEXT,
    dismissed_at TEXT,
    updated_at TEXT NOT NULL,
    UNIQUE(student_id, word_id)
);

CREATE TABLE IF NOT EXISTS recommendations (
    subject TEXT NOT NULL,
    text_id INTEGER NOT NULL,
    rank INTEGER NOT NULL,
    match_score REAL NOT NULL,
    known_words_percent REAL NOT NULL,
    new_words_count INTEGER NOT NULL,
    students_recommended_count INTEGER,
    created_at TEXT NOT NULL,
    UNIQUE(subject, text_id)
);

CREATE TABLE IF NOT EXISTS class_stats (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    stats TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS unjudged_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    student_id INTEGER NOT NULL,
    word_id INTEGER NOT NULL,
    reason TEXT NOT NULL,
    logged_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS run_summaries (
    run_id TEXT PRIMARY KEY,
    started_at TEXT NOT NULL,
    summary TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_student_vocabulary_word ON student_vocabulary(word_id);
CREATE INDEX IF NOT EXISTS idx_recommendations_subject ON recommendations(subject, rank);
"#;

const TABLES: [&str; 9] = [
    "vocabulary_words",
    "students",
    "texts",
    "text_vocabulary",
    "student_vocabulary",
    "recommendations",
    "class_stats",
    "unjudged_log",
    "run_summaries",
];

/// SQLite-backed `ResultStore`
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `db_path`
    pub fn new<P: AsRef<Path>>(db_path: P, pool_size: usize) -> Result<Self> {
        let path = db_path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!(
            "Opening result store at {} (pool_size: {})",
            path.display(),
            pool_size
        );

        let mut config = Config::new(path);
        config.pool = Some(PoolConfig::new(pool_size.max(1)));
        let pool = config.create_pool(Runtime::Tokio1).map_err(|e| {
            VocabError::Database(format!("Failed to create connection pool: {}", e))
        })?;

        Ok(Self { pool })
    }

    /// Run `f` on a pooled connection
    async fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.pool.get().await.map_err(|e| {
            VocabError::Database(format!("Failed to get connection from pool: {}", e))
        })?;
        conn.interact(f)
            .await
            .map_err(|e| VocabError::Database(format!("Pool interaction failed: {}", e)))?
    }
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| VocabError::Database(format!("bad timestamp '{}': {}", raw, e)))
}

fn read_profile(conn: &Connection, student_id: StudentId) -> Result<Option<VocabularyProfile>> {
    let header = conn
        .query_row(
            "SELECT assigned_grade, reading_level, total_grade_level_words, words_mastered,
                    mastery_percent, missing_words
             FROM students WHERE id = ?1 AND profiled_at IS NOT NULL",
            params![student_id.0],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()?;
    let Some((grade, reading_level, total, mastered, mastery_percent, missing_json)) = header else {
        return Ok(None);
    };

    let mut stmt = conn.prepare_cached(
        "SELECT word_id, usage_count, correct_count, incorrect_count, misuse_examples,
                judged, baseline_known, dismissal_reason, dismissed_at
         FROM student_vocabulary WHERE student_id = ?1 ORDER BY word_id",
    )?;
    let rows = stmt
        .query_map(params![student_id.0], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, bool>(5)?,
                row.get::<_, bool>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, Option<String>>(8)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut entries = BTreeMap::new();
    for (word, usage, correct, incorrect, examples, judged, baseline_known, reason, at) in rows {
        let dismissal = match (reason, at) {
            (Some(reason), Some(at)) => Some(Dismissal {
                reason: reason.parse()?,
                dismissed_at: parse_time(&at)?,
            }),
            _ => None,
        };
        entries.insert(
            WordId(word),
            ProfileEntry {
                student_id,
                word_id: WordId(word),
                usage_count: usage as u32,
                correct_count: correct as u32,
                incorrect_count: incorrect as u32,
                misuse_examples: serde_json::from_str(&examples)?,
                judged,
                baseline_known,
                dismissal,
            },
        );
    }

    Ok(Some(VocabularyProfile {
        student_id,
        assigned_grade: grade as u8,
        reading_level,
        entries,
        total_grade_level_words: total as usize,
        words_mastered: mastered as usize,
        mastery_percent,
        missing_words: serde_json::from_str(&missing_json)?,
    }))
}

#[async_trait]
impl ResultStore for SqliteStore {
    async fn init_schema(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        info!("Result store schema ready");
        Ok(())
    }

    async fn save_catalog(&self, words: &[VocabularyWord]) -> Result<()> {
        let words = words.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("UPDATE vocabulary_words SET active = 0", [])?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO vocabulary_words (id, surface_form, grade_level, active)
                     VALUES (?1, ?2, ?3, 1)
                     ON CONFLICT(surface_form) DO UPDATE SET
                        grade_level = excluded.grade_level,
                        active = 1",
                )?;
                for w in &words {
                    stmt.execute(params![w.id.0, w.surface_form, w.grade_level as i64])?;
                }
            }
            let retired: i64 = tx.query_row(
                "SELECT COUNT(*) FROM vocabulary_words WHERE active = 0",
                [],
                |row| row.get(0),
            )?;
            tx.commit()?;
            if retired > 0 {
                debug!("{} stored words are no longer in the catalog", retired);
            }
            Ok(())
        })
        .await
    }

    async fn load_catalog(&self) -> Result<Vec<VocabularyWord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, surface_form, grade_level FROM vocabulary_words
                 WHERE active = 1 ORDER BY id",
            )?;
            let words = stmt
                .query_map([], |row| {
                    Ok(VocabularyWord {
                        id: WordId(row.get(0)?),
                        surface_form: row.get(1)?,
                        grade_level: row.get::<_, i64>(2)? as u8,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(words)
        })
        .await
    }

    async fn known_word_ids(&self) -> Result<HashMap<String, WordId>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached("SELECT surface_form, id FROM vocabulary_words")?;
            let ids = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, WordId(row.get(1)?))))?
                .collect::<rusqlite::Result<HashMap<_, _>>>()?;
            Ok(ids)
        })
        .await
    }

    async fn save_students(&self, students: &[Student]) -> Result<()> {
        let students = students.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO students (id, name, assigned_grade, reading_level)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(id) DO UPDATE SET
                        name = excluded.name,
                        assigned_grade = excluded.assigned_grade,
                        reading_level = excluded.reading_level",
                )?;
                for s in &students {
                    stmt.execute(params![s.id.0, s.name, s.assigned_grade as i64, s.reading_level])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn load_students(&self) -> Result<Vec<Student>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, name, assigned_grade, reading_level FROM students ORDER BY id",
            )?;
            let students = stmt
                .query_map([], |row| {
                    Ok(Student {
                        id: StudentId(row.get(0)?),
                        name: row.get(1)?,
                        assigned_grade: row.get::<_, i64>(2)? as u8,
                        reading_level: row.get(3)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(students)
        })
        .await
    }

    async fn prune_students(&self, keep: &[StudentId]) -> Result<usize> {
        let keep: BTreeSet<i64> = keep.iter().map(|id| id.0).collect();
        let removed = self
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                let stored: Vec<i64> = {
                    let mut stmt = tx.prepare_cached("SELECT id FROM students")?;
                    let ids = stmt
                        .query_map([], |row| row.get(0))?
                        .collect::<rusqlite::Result<Vec<i64>>>()?;
                    ids
                };
                let mut removed = 0usize;
                for id in stored.into_iter().filter(|id| !keep.contains(id)) {
                    tx.execute("DELETE FROM student_vocabulary WHERE student_id = ?1", params![id])?;
                    tx.execute(
                        "DELETE FROM recommendations WHERE subject = ?1",
                        params![Subject::Student(StudentId(id)).key()],
                    )?;
                    tx.execute("DELETE FROM students WHERE id = ?1", params![id])?;
                    removed += 1;
                }
                tx.commit()?;
                Ok(removed)
            })
            .await?;
        if removed > 0 {
            info!("Removed {} students no longer on the roster", removed);
        }
        Ok(removed)
    }

    async fn save_text_indexes(&self, texts: &[TextVocabularyIndex]) -> Result<()> {
        let texts = texts.to_vec();
        let count = texts.len();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM text_vocabulary", [])?;
            tx.execute("DELETE FROM texts", [])?;
            {
                let mut text_stmt = tx.prepare_cached(
                    "INSERT INTO texts (id, title, author, total_word_count, reading_level)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                let mut vocab_stmt = tx.prepare_cached(
                    "INSERT INTO text_vocabulary (text_id, word_id, occurrence_count)
                     VALUES (?1, ?2, ?3)",
                )?;
                for t in &texts {
                    text_stmt.execute(params![
                        t.text_id.0,
                        t.title,
                        t.author,
                        t.total_word_count as i64,
                        t.reading_level
                    ])?;
                    for (word, count) in &t.occurrences {
                        vocab_stmt.execute(params![t.text_id.0, word.0, *count as i64])?;
                    }
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await?;
        debug!("Stored {} text vocabulary indexes", count);
        Ok(())
    }

    async fn load_text_indexes(&self) -> Result<Vec<TextVocabularyIndex>> {
        self.with_conn(|conn| {
            let mut texts: BTreeMap<i64, TextVocabularyIndex> = BTreeMap::new();
            {
                let mut stmt = conn.prepare_cached(
                    "SELECT id, title, author, total_word_count, reading_level FROM texts",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(TextVocabularyIndex {
                        text_id: TextId(row.get(0)?),
                        title: row.get(1)?,
                        author: row.get(2)?,
                        total_word_count: row.get::<_, i64>(3)? as u64,
                        reading_level: row.get(4)?,
                        occurrences: BTreeMap::new(),
                    })
                })?;
                for t in rows {
                    let t = t?;
                    texts.insert(t.text_id.0, t);
                }
            }

            let mut stmt = conn.prepare_cached(
                "SELECT text_id, word_id, occurrence_count FROM text_vocabulary",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?))
            })?;
            for row in rows {
                let (text, word, count) = row?;
                if let Some(t) = texts.get_mut(&text) {
                    t.occurrences.insert(WordId(word), count as u64);
                }
            }
            Ok(texts.into_values().collect())
        })
        .await
    }

    async fn save_profile(&self, profile: &VocabularyProfile) -> Result<()> {
        let profile = profile.clone();
        let missing = serde_json::to_string(&profile.missing_words)?;
        let mut examples = Vec::with_capacity(profile.entries.len());
        for entry in profile.entries.values() {
            examples.push(serde_json::to_string(&entry.misuse_examples)?);
        }
        let now = Utc::now().to_rfc3339();

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let updated = tx.execute(
                "UPDATE students SET
                    total_grade_level_words = ?2,
                    words_mastered = ?3,
                    mastery_percent = ?4,
                    missing_words = ?5,
                    profiled_at = ?6
                 WHERE id = ?1",
                params![
                    profile.student_id.0,
                    profile.total_grade_level_words as i64,
                    profile.words_mastered as i64,
                    profile.mastery_percent,
                    missing,
                    now
                ],
            )?;
            if updated == 0 {
                return Err(VocabError::NotFound(format!("student {}", profile.student_id)));
            }

            let existing: BTreeSet<i64> = {
                let mut stmt =
                    tx.prepare_cached("SELECT word_id FROM student_vocabulary WHERE student_id = ?1")?;
                let ids = stmt
                    .query_map(params![profile.student_id.0], |row| row.get(0))?
                    .collect::<rusqlite::Result<BTreeSet<i64>>>()?;
                ids
            };
            for stale in existing.iter().filter(|id| !profile.entries.contains_key(&WordId(**id))) {
                tx.execute(
                    "DELETE FROM student_vocabulary WHERE student_id = ?1 AND word_id = ?2",
                    params![profile.student_id.0, stale],
                )?;
            }

            {
                // Dismissal columns are only written by `dismiss`
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO student_vocabulary (
                        student_id, word_id, usage_count, correct_count, incorrect_count,
                        misuse_examples, judged, baseline_known, updated_at
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     ON CONFLICT(student_id, word_id) DO UPDATE SET
                        usage_count = excluded.usage_count,
                        correct_count = excluded.correct_count,
                        incorrect_count = excluded.incorrect_count,
                        misuse_examples = excluded.misuse_examples,
                        judged = excluded.judged,
                        baseline_known = excluded.baseline_known,
                        updated_at = excluded.updated_at",
                )?;
                for (entry, examples) in profile.entries.values().zip(examples.iter()) {
                    stmt.execute(params![
                        entry.student_id.0,
                        entry.word_id.0,
                        entry.usage_count as i64,
                        entry.correct_count as i64,
                        entry.incorrect_count as i64,
                        examples,
                        entry.judged,
                        entry.baseline_known,
                        now
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn load_profile(&self, student_id: StudentId) -> Result<Option<VocabularyProfile>> {
        self.with_conn(move |conn| read_profile(conn, student_id)).await
    }

    async fn load_profiles(&self) -> Result<Vec<VocabularyProfile>> {
        self.with_conn(|conn| {
            let ids = {
                let mut stmt = conn.prepare_cached(
                    "SELECT id FROM students WHERE profiled_at IS NOT NULL ORDER BY id",
                )?;
                let ids = stmt
                    .query_map([], |row| row.get::<_, i64>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                ids
            };
            let mut profiles = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(p) = read_profile(conn, StudentId(id))? {
                    profiles.push(p);
                }
            }
            Ok(profiles)
        })
        .await
    }

    async fn replace_recommendations(
        &self,
        subject: Subject,
        recommendations: &[Recommendation],
    ) -> Result<()> {
        let rows = recommendations.to_vec();
        let key = subject.key();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM recommendations WHERE subject = ?1", params![key])?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO recommendations (
                        subject, text_id, rank, match_score, known_words_percent,
                        new_words_count, students_recommended_count, created_at
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(subject, text_id) DO UPDATE SET
                        rank = excluded.rank,
                        match_score = excluded.match_score,
                        known_words_percent = excluded.known_words_percent,
                        new_words_count = excluded.new_words_count,
                        students_recommended_count = excluded.students_recommended_count,
                        created_at = excluded.created_at",
                )?;
                for r in &rows {
                    stmt.execute(params![
                        key,
                        r.text_id.0,
                        r.rank as i64,
                        r.match_score,
                        r.known_words_percent,
                        r.new_words_count as i64,
                        r.students_recommended_count.map(|c| c as i64),
                        r.created_at.to_rfc3339()
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn load_recommendations(&self, subject: Subject) -> Result<Vec<Recommendation>> {
        let key = subject.key();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT text_id, rank, match_score, known_words_percent, new_words_count,
                        students_recommended_count, created_at
                 FROM recommendations WHERE subject = ?1 ORDER BY rank, text_id",
            )?;
            let rows = stmt
                .query_map(params![key], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, f64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, Option<i64>>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.into_iter()
                .map(|(text, rank, score, known, new_words, count, created)| {
                    Ok(Recommendation {
                        subject,
                        text_id: TextId(text),
                        rank: rank as u32,
                        match_score: score,
                        known_words_percent: known,
                        new_words_count: new_words as u32,
                        students_recommended_count: count.map(|c| c as u32),
                        created_at: parse_time(&created)?,
                    })
                })
                .collect()
        })
        .await
    }

    async fn save_class_stats(&self, stats: &ClassStats) -> Result<()> {
        let json = serde_json::to_string(stats)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO class_stats (id, stats, updated_at) VALUES (1, ?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET stats = excluded.stats, updated_at = excluded.updated_at",
                params![json, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    async fn load_class_stats(&self) -> Result<Option<ClassStats>> {
        let raw: Option<String> = self
            .with_conn(|conn| {
                Ok(conn
                    .query_row("SELECT stats FROM class_stats WHERE id = 1", [], |row| row.get(0))
                    .optional()?)
            })
            .await?;
        raw.map(|s| serde_json::from_str(&s).map_err(VocabError::from))
            .transpose()
    }

    async fn dismiss(
        &self,
        student_id: StudentId,
        word_id: WordId,
        reason: DismissalReason,
    ) -> Result<()> {
        let updated = self
            .with_conn(move |conn| {
                Ok(conn.execute(
                    "UPDATE student_vocabulary SET dismissal_reason = ?3, dismissed_at = ?4
                     WHERE student_id = ?1 AND word_id = ?2",
                    params![student_id.0, word_id.0, reason.as_str(), Utc::now().to_rfc3339()],
                )?)
            })
            .await?;
        if updated == 0 {
            return Err(VocabError::NotFound(format!(
                "no profile row for student {} word {}",
                student_id, word_id
            )));
        }
        info!("Dismissed word {} for student {} ({})", word_id, student_id, reason);
        Ok(())
    }

    async fn log_unjudged(&self, records: &[UnjudgedRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let records = records.to_vec();
        self.with_conn(move |conn| {
            let now = Utc::now().to_rfc3339();
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO unjudged_log (run_id, student_id, word_id, reason, logged_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for r in &records {
                    stmt.execute(params![r.run_id, r.student_id.0, r.word_id.0, r.reason, now])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn save_run_summary(&self, summary: &RunSummary) -> Result<()> {
        let json = serde_json::to_string(summary)?;
        let run_id = summary.run_id.clone();
        let started_at = summary.started_at.to_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO run_summaries (run_id, started_at, summary) VALUES (?1, ?2, ?3)
                 ON CONFLICT(run_id) DO UPDATE SET summary = excluded.summary",
                params![run_id, started_at, json],
            )?;
            Ok(())
        })
        .await
    }

    async fn latest_run_summary(&self) -> Result<Option<RunSummary>> {
        let raw: Option<String> = self
            .with_conn(|conn| {
                Ok(conn
                    .query_row(
                        "SELECT summary FROM run_summaries ORDER BY started_at DESC LIMIT 1",
                        [],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;
        raw.map(|s| serde_json::from_str(&s).map_err(VocabError::from))
            .transpose()
    }

    async fn table_counts(&self) -> Result<Vec<(String, i64)>> {
        self.with_conn(|conn| {
            let mut counts = Vec::with_capacity(TABLES.len());
            for table in TABLES {
                let n: i64 =
                    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
                counts.push((table.to_string(), n));
            }
            Ok(counts)
        })
        .await
    }
}
