//! Speaker attribution for classroom transcripts
//!
//! Transcripts interleave timestamp lines with labelled turns:
//!
//! ```text
//! [09:15 AM]
//! Teacher: Who can tell me what "endure" means?
//! Student_Maya: It means you keep going through something hard.
//! ```
//!
//! A turn runs until the next label. Only turns attributed to a roster
//! student are returned for matching.

use crate::types::{Student, StudentId};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

static TIMESTAMP_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\[\d{1,2}:\d{2}(?::\d{2})?(?:\s*[AaPp][Mm])?\]\s*$").unwrap());

static SPEAKER_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?:\[\d{1,2}:\d{2}(?::\d{2})?(?:\s*[AaPp][Mm])?\]\s*)?(Teacher|Student(?:_[A-Za-z'\-]+)+|[A-Z][A-Za-z'\-]*):\s*(.*)$",
    )
    .unwrap()
});

/// One labelled span of transcript text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakerTurn {
    pub speaker: String,
    pub text: String,
}

/// Split a transcript into labelled turns
pub fn parse_transcript(transcript: &str) -> Vec<SpeakerTurn> {
    let mut turns: Vec<SpeakerTurn> = Vec::new();
    let mut current: Option<SpeakerTurn> = None;

    for line in transcript.lines() {
        if TIMESTAMP_LINE.is_match(line) {
            continue;
        }
        if let Some(caps) = SPEAKER_LABEL.captures(line) {
            if let Some(turn) = current.take() {
                turns.push(turn);
            }
            current = Some(SpeakerTurn {
                speaker: caps[1].to_string(),
                text: caps[2].trim().to_string(),
            });
            continue;
        }
        // Unlabelled text before the first label has no speaker and is dropped
        if let Some(turn) = current.as_mut() {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                if !turn.text.is_empty() {
                    turn.text.push(' ');
                }
                turn.text.push_str(trimmed);
            }
        }
    }
    if let Some(turn) = current {
        turns.push(turn);
    }
    turns
}

/// `Student_Maya_Chen` -> `maya chen`
pub fn normalize_speaker(label: &str) -> String {
    let lowered = label.trim().to_lowercase().replace('_', " ");
    let stripped = lowered.strip_prefix("student ").unwrap_or(&lowered);
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolves speaker labels to roster students
#[derive(Debug, Clone)]
pub struct SpeakerDirectory {
    full_names: HashMap<String, StudentId>,
    first_names: HashMap<String, Option<StudentId>>,
}

impl SpeakerDirectory {
    pub fn new(roster: &[Student]) -> Self {
        let mut full_names = HashMap::new();
        let mut first_names: HashMap<String, Option<StudentId>> = HashMap::new();

        for student in roster {
            let name = normalize_speaker(&student.name);
            if let Some(first) = name.split(' ').next() {
                first_names
                    .entry(first.to_string())
                    .and_modify(|slot| {
                        // Ambiguous first names resolve to nobody
                        if *slot != Some(student.id) {
                            *slot = None;
                        }
                    })
                    .or_insert(Some(student.id));
            }
            full_names.insert(name, student.id);
        }

        Self {
            full_names,
            first_names,
        }
    }

    pub fn resolve(&self, label: &str) -> Option<StudentId> {
        let name = normalize_speaker(label);
        if let Some(id) = self.full_names.get(&name) {
            return Some(*id);
        }
        self.first_names.get(&name).copied().flatten()
    }

    /// Group turns by student, dropping teacher and unknown speakers
    pub fn attribute(&self, turns: &[SpeakerTurn]) -> BTreeMap<StudentId, Vec<String>> {
        let mut by_student: BTreeMap<StudentId, Vec<String>> = BTreeMap::new();
        let mut dropped = 0usize;
        for turn in turns {
            match self.resolve(&turn.speaker) {
                Some(id) if !turn.text.is_empty() => {
                    by_student.entry(id).or_default().push(turn.text.clone())
                }
                Some(_) => {}
                None => dropped += 1,
            }
        }
        debug!(
            "Attributed transcript turns to {} students ({} non-student turns dropped)",
            by_student.len(),
            dropped
        );
        by_student
    }
}
