//! Batch input loading
//!
//! Roster, classroom transcript and essay directory. Everything returned is
//! keyed by roster student id; text that cannot be attributed to a roster
//! student is dropped here so later stages only ever see student language.

use crate::error::{Result, VocabError};
use crate::nlp::{parse_transcript, SpeakerDirectory};
use crate::types::{Student, StudentId};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

static ESSAY_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)(?:_[^/]*)?\.txt$").unwrap());

/// Per-student raw text spans
#[derive(Debug, Clone, Default)]
pub struct StudentTexts {
    pub spans: BTreeMap<StudentId, Vec<String>>,
    pub essays_skipped: usize,
}

impl StudentTexts {
    pub fn merge(&mut self, other: BTreeMap<StudentId, Vec<String>>) {
        for (id, spans) in other {
            self.spans.entry(id).or_default().extend(spans);
        }
    }

    pub fn spans_for(&self, id: StudentId) -> &[String] {
        self.spans.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Load and validate the roster
pub fn load_roster(path: &Path) -> Result<Vec<Student>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        VocabError::InvalidInput(format!("cannot read roster {}: {}", path.display(), e))
    })?;
    let mut students: Vec<Student> = serde_json::from_str(&contents)?;

    let mut seen = HashSet::new();
    for s in &mut students {
        s.name = s.name.trim().to_string();
        if !seen.insert(s.id) {
            return Err(VocabError::InvalidInput(format!(
                "duplicate student id {} in roster",
                s.id
            )));
        }
        if !s.reading_level.is_finite() || s.reading_level < 0.0 {
            return Err(VocabError::InvalidInput(format!(
                "student {} has invalid reading level {}",
                s.id, s.reading_level
            )));
        }
    }
    students.sort_by_key(|s| s.id);
    info!("Loaded {} students from {}", students.len(), path.display());
    Ok(students)
}

/// Student turns from a speaker-labelled transcript
pub fn load_transcript(path: &Path, roster: &[Student]) -> Result<BTreeMap<StudentId, Vec<String>>> {
    let contents = std::fs::read_to_string(path)?;
    let turns = parse_transcript(&contents);
    let directory = SpeakerDirectory::new(roster);
    let spans = directory.attribute(&turns);
    info!(
        "Transcript {}: {} turns, {} students speaking",
        path.display(),
        turns.len(),
        spans.len()
    );
    Ok(spans)
}

/// Essays named `<student_id>.txt` or `<student_id>_<anything>.txt`.
///
/// Returns the essays and the number of files skipped.
pub fn load_essays(dir: &Path, roster: &[Student]) -> Result<(BTreeMap<StudentId, Vec<String>>, usize)> {
    let known: HashSet<StudentId> = roster.iter().map(|s| s.id).collect();
    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    let mut essays: BTreeMap<StudentId, Vec<String>> = BTreeMap::new();
    let mut skipped = 0usize;
    for path in paths {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let Some(id) = ESSAY_NAME
            .captures(name)
            .and_then(|c| c[1].parse::<i64>().ok())
            .map(StudentId)
        else {
            warn!("Skipping essay with unrecognised name: {}", path.display());
            skipped += 1;
            continue;
        };
        if !known.contains(&id) {
            warn!("Skipping essay for student {} not on roster", id);
            skipped += 1;
            continue;
        }
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                debug!("Loaded essay {} for student {}", name, id);
                essays.entry(id).or_default().push(text);
            }
            Err(e) => {
                warn!("Skipping unreadable essay {}: {}", path.display(), e);
                skipped += 1;
            }
        }
    }
    info!(
        "Loaded essays for {} students from {} ({} skipped)",
        essays.len(),
        dir.display(),
        skipped
    );
    Ok((essays, skipped))
}
