//! Batch pipeline
//!
//! catalog → corpus index → per-student matching, judging and profiling →
//! scoring → class aggregation. All fatal checks (configuration, catalog,
//! corpus, roster) run before any row is written, so an aborted run leaves
//! the store's contents untouched. Word ids already in the store are reused,
//! so profiles and dismissals survive edits to the word lists. Per-unit
//! failures are counted in the `RunSummary`.

use crate::catalog::VocabularyCatalog;
use crate::class::{ClassAggregator, ClassStats};
use crate::config::PipelineConfig;
use crate::corpus::{CorpusIndex, CorpusIndexer};
use crate::error::{Result, VocabError};
use crate::input::{load_essays, load_roster, load_transcript, StudentTexts};
use crate::nlp::{RuleLemmatizer, TextNormalizer};
use crate::profile::{ProfileBuilder, ProfileReport};
use crate::scoring::{Scorer, TextScore};
use crate::services::judge::{JudgePolicy, JudgeRequest, JudgeResult, JudgeRunner, UsageJudge};
use crate::storage::{ResultStore, UnjudgedRecord};
use crate::types::{
    DismissalReason, JudgeOutcome, Recommendation, Student, StudentId, Subject,
    TextVocabularyIndex, UsageMatch, VocabularyProfile, WordId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Counts reported at the end of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub students_processed: usize,
    pub students_without_text: usize,
    pub matches_found: usize,
    pub pairs_judged: usize,
    pub pairs_unjudged: usize,
    /// Pairs whose new judgment differs from the stored one
    pub judge_disagreements: usize,
    pub texts_indexed: usize,
    /// Skip reason → number of texts
    pub texts_skipped: BTreeMap<String, usize>,
    pub essays_skipped: usize,
    pub recommendations_written: usize,
    pub class_recommendations_written: usize,
}

impl RunSummary {
    pub fn start() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            finished_at: None,
            students_processed: 0,
            students_without_text: 0,
            matches_found: 0,
            pairs_judged: 0,
            pairs_unjudged: 0,
            judge_disagreements: 0,
            texts_indexed: 0,
            texts_skipped: BTreeMap::new(),
            essays_skipped: 0,
            recommendations_written: 0,
            class_recommendations_written: 0,
        }
    }

    fn record_corpus(&mut self, index: &CorpusIndex) {
        self.texts_indexed = index.texts.len();
        self.texts_skipped = index.skipped_by_name();
    }
}

/// Class statistics together with the class-wide recommendation rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassReport {
    pub stats: ClassStats,
    pub recommendations: Vec<Recommendation>,
}

/// Validated inputs, loaded before anything is written
struct LoadedInputs {
    catalog: VocabularyCatalog,
    lemmatizer: RuleLemmatizer,
    corpus: CorpusIndex,
    roster: Vec<Student>,
    texts: StudentTexts,
}

pub struct Pipeline {
    config: PipelineConfig,
    store: Arc<dyn ResultStore>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, store: Arc<dyn ResultStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load the word lists and keep ids already assigned in the store
    async fn load_catalog(&self) -> Result<(VocabularyCatalog, RuleLemmatizer)> {
        let catalog = VocabularyCatalog::load_dir(&self.config.inputs.vocab_dir)?;
        self.store.init_schema().await?;
        let known = self.store.known_word_ids().await?;
        let catalog = catalog.with_known_ids(&known);
        let lemmatizer =
            RuleLemmatizer::with_dictionary(catalog.words().iter().map(|w| w.surface_form.clone()));
        Ok((catalog, lemmatizer))
    }

    fn load_corpus(&self, catalog: &VocabularyCatalog, lemmatizer: &RuleLemmatizer) -> Result<CorpusIndex> {
        CorpusIndexer::new(catalog, lemmatizer, &self.config.corpus)
            .index_dir(&self.config.inputs.corpus_dir)
    }

    async fn load_inputs(&self) -> Result<LoadedInputs> {
        self.config.validate()?;
        let (catalog, lemmatizer) = self.load_catalog().await?;
        let corpus = self.load_corpus(&catalog, &lemmatizer)?;
        let roster = load_roster(&self.config.inputs.roster)?;

        let mut texts = StudentTexts::default();
        if let Some(path) = &self.config.inputs.transcript {
            texts.merge(load_transcript(path, &roster)?);
        }
        if let Some(dir) = &self.config.inputs.essays_dir {
            let (essays, skipped) = load_essays(dir, &roster)?;
            texts.merge(essays);
            texts.essays_skipped = skipped;
        }

        Ok(LoadedInputs {
            catalog,
            lemmatizer,
            corpus,
            roster,
            texts,
        })
    }

    /// Index the corpus and store it, without touching profiles
    pub async fn index_corpus(&self) -> Result<RunSummary> {
        let mut summary = RunSummary::start();
        self.config.validate()?;
        let (catalog, lemmatizer) = self.load_catalog().await?;
        let corpus = self.load_corpus(&catalog, &lemmatizer)?;

        self.store.save_catalog(catalog.words()).await?;
        self.store.save_text_indexes(&corpus.texts).await?;

        summary.record_corpus(&corpus);
        self.finish(summary).await
    }

    /// Full run
    pub async fn run(&self, judge: Arc<dyn UsageJudge>) -> Result<RunSummary> {
        let mut summary = RunSummary::start();
        info!("Starting run {}", summary.run_id);

        let inputs = self.load_inputs().await?;
        summary.record_corpus(&inputs.corpus);
        summary.essays_skipped = inputs.texts.essays_skipped;

        self.store.save_catalog(inputs.catalog.words()).await?;
        self.store.save_students(&inputs.roster).await?;
        let roster_ids: Vec<StudentId> = inputs.roster.iter().map(|s| s.id).collect();
        self.store.prune_students(&roster_ids).await?;
        self.store.save_text_indexes(&inputs.corpus.texts).await?;

        // Matching
        let normalizer = TextNormalizer::new(&inputs.catalog, &inputs.lemmatizer);
        let mut matches: Vec<UsageMatch> = Vec::new();
        for student in &inputs.roster {
            let spans = inputs.texts.spans_for(student.id);
            if spans.is_empty() {
                debug!("Student {} has no text; profile will be baseline only", student.id);
                summary.students_without_text += 1;
                continue;
            }
            matches.extend(normalizer.extract_spans(student.id, spans));
        }
        summary.matches_found = matches.len();
        info!("Found {} catalog-word usages", matches.len());

        // Judging
        let requests = self.judge_requests(&inputs.catalog, &matches);
        let runner = JudgeRunner::new(judge, JudgePolicy::from(&self.config.judge));
        let results = runner.judge_all(requests).await;

        let mut unjudged = Vec::new();
        for r in &results {
            match &r.outcome {
                JudgeOutcome::Judged(_) => summary.pairs_judged += 1,
                JudgeOutcome::Unjudged { reason } => {
                    summary.pairs_unjudged += 1;
                    unjudged.push(UnjudgedRecord {
                        run_id: summary.run_id.clone(),
                        student_id: r.student_id,
                        word_id: r.word_id,
                        reason: reason.clone(),
                    });
                }
            }
        }
        self.store.log_unjudged(&unjudged).await?;

        // Profiles
        let builder = ProfileBuilder::new(&inputs.catalog, &self.config.baseline);
        let mut profiles = Vec::with_capacity(inputs.roster.len());
        for student in &inputs.roster {
            let mut profile = builder.build(student, &matches, &results);
            if let Some(prior) = self.store.load_profile(student.id).await? {
                summary.judge_disagreements += count_disagreements(&inputs.catalog, &prior, &results);
                carry_dismissals(&prior, &mut profile);
            }
            self.store.save_profile(&profile).await?;
            profiles.push(profile);
            summary.students_processed += 1;
        }

        self.write_recommendations(&inputs.catalog, &profiles, &inputs.corpus.texts, &mut summary)
            .await?;
        self.finish(summary).await
    }

    /// Rescore stored profiles against the stored corpus index
    pub async fn recommend(&self) -> Result<RunSummary> {
        let mut summary = RunSummary::start();
        self.config.validate()?;

        let catalog = VocabularyCatalog::from_words(self.store.load_catalog().await?);
        if catalog.is_empty() {
            return Err(VocabError::MissingCatalog("no catalog in store; run first".into()));
        }
        let texts = self.store.load_text_indexes().await?;
        if texts.is_empty() {
            return Err(VocabError::MissingCorpus("no corpus index in store".into()));
        }
        let profiles = self.store.load_profiles().await?;
        summary.students_processed = profiles.len();
        summary.texts_indexed = texts.len();

        self.write_recommendations(&catalog, &profiles, &texts, &mut summary)
            .await?;
        self.finish(summary).await
    }

    /// One request per (student, word), with the first distinct sentences
    fn judge_requests(&self, catalog: &VocabularyCatalog, matches: &[UsageMatch]) -> Vec<JudgeRequest> {
        let mut grouped: BTreeMap<(StudentId, WordId), Vec<&UsageMatch>> = BTreeMap::new();
        for m in matches {
            grouped.entry((m.student_id, m.word_id)).or_default().push(m);
        }

        grouped
            .into_iter()
            .filter_map(|((_, word_id), group)| {
                let word = catalog.get(word_id)?;
                JudgeRequest::from_matches(&word.surface_form, &group, self.config.judge.max_examples)
            })
            .collect()
    }

    async fn write_recommendations(
        &self,
        catalog: &VocabularyCatalog,
        profiles: &[VocabularyProfile],
        texts: &[TextVocabularyIndex],
        summary: &mut RunSummary,
    ) -> Result<()> {
        let scorer = Scorer::new(self.config.scoring.clone());
        let now = Utc::now();

        let mut picks: BTreeMap<StudentId, Vec<TextScore>> = BTreeMap::new();
        for profile in profiles {
            let ranked = scorer.rank(profile, texts);
            if ranked.len() < self.config.scoring.top_k {
                warn!(
                    "Only {} eligible texts for student {}",
                    ranked.len(),
                    profile.student_id
                );
            }
            let subject = Subject::Student(profile.student_id);
            let rows: Vec<Recommendation> = ranked
                .iter()
                .cloned()
                .enumerate()
                .map(|(i, s)| s.into_recommendation(subject, i as u32 + 1, now))
                .collect();
            self.store.replace_recommendations(subject, &rows).await?;
            summary.recommendations_written += rows.len();
            picks.insert(profile.student_id, ranked);
        }

        let stats = ClassAggregator::new(catalog, &self.config.class).aggregate(profiles, &picks);
        let class_rows: Vec<Recommendation> = stats
            .class_recommendations
            .iter()
            .enumerate()
            .map(|(i, pick)| pick.into_recommendation(i as u32 + 1, now))
            .collect();
        self.store.replace_recommendations(Subject::Class, &class_rows).await?;
        self.store.save_class_stats(&stats).await?;
        summary.class_recommendations_written = class_rows.len();

        info!(
            "Wrote {} student recommendations and {} class picks",
            summary.recommendations_written, summary.class_recommendations_written
        );
        Ok(())
    }

    async fn finish(&self, mut summary: RunSummary) -> Result<RunSummary> {
        summary.finished_at = Some(Utc::now());
        self.store.save_run_summary(&summary).await?;
        info!(
            "Run {} finished: {} students, {} judged, {} unjudged, {} texts",
            summary.run_id,
            summary.students_processed,
            summary.pairs_judged,
            summary.pairs_unjudged,
            summary.texts_indexed
        );
        Ok(summary)
    }
}

/// Judged pairs whose counts differ from the stored judgment
fn count_disagreements(
    catalog: &VocabularyCatalog,
    prior: &VocabularyProfile,
    results: &[JudgeResult],
) -> usize {
    let mut disagreements = 0;
    for r in results.iter().filter(|r| r.student_id == prior.student_id) {
        let (JudgeOutcome::Judged(now), Some(before)) = (&r.outcome, prior.entries.get(&r.word_id))
        else {
            continue;
        };
        if !before.judged {
            continue;
        }
        if (before.correct_count, before.incorrect_count) != (now.correct_count, now.incorrect_count) {
            let word = catalog
                .get(r.word_id)
                .map(|w| w.surface_form.as_str())
                .unwrap_or("?");
            warn!(
                "Judge disagreement for student {} word '{}': {}/{} before, {}/{} now",
                r.student_id,
                word,
                before.correct_count,
                before.incorrect_count,
                now.correct_count,
                now.incorrect_count
            );
            disagreements += 1;
        }
    }
    disagreements
}

fn carry_dismissals(prior: &VocabularyProfile, profile: &mut VocabularyProfile) {
    for (word_id, entry) in profile.entries.iter_mut() {
        if let Some(dismissal) = prior.entries.get(word_id).and_then(|e| e.dismissal.clone()) {
            entry.dismissal = Some(dismissal);
        }
    }
}

/// Hide a misused word for a student. `word` may be a surface form or an id.
pub async fn dismiss_word(
    store: &dyn ResultStore,
    student_id: StudentId,
    word: &str,
    reason: &str,
) -> Result<()> {
    let reason: DismissalReason = reason.parse()?;
    let catalog = VocabularyCatalog::from_words(store.load_catalog().await?);
    let word_id = match word.trim().parse::<i64>() {
        Ok(id) => WordId(id),
        Err(_) => catalog
            .lookup(&word.trim().to_lowercase())
            .map(|w| w.id)
            .ok_or_else(|| VocabError::NotFound(format!("word '{}' not in catalog", word)))?,
    };
    store.dismiss(student_id, word_id, reason).await
}

pub async fn student_report(store: &dyn ResultStore, student_id: StudentId) -> Result<ProfileReport> {
    let student = store
        .load_students()
        .await?
        .into_iter()
        .find(|s| s.id == student_id)
        .ok_or_else(|| VocabError::NotFound(format!("student {}", student_id)))?;
    let profile = store
        .load_profile(student_id)
        .await?
        .ok_or_else(|| VocabError::NotFound(format!("no profile for student {}", student_id)))?;
    let catalog = VocabularyCatalog::from_words(store.load_catalog().await?);
    let recommendations = store
        .load_recommendations(Subject::Student(student_id))
        .await?;
    Ok(ProfileReport::new(&student, &profile, &catalog, recommendations))
}

pub async fn class_report(store: &dyn ResultStore) -> Result<ClassReport> {
    let stats = store
        .load_class_stats()
        .await?
        .ok_or_else(|| VocabError::NotFound("no class statistics; run first".into()))?;
    let recommendations = store.load_recommendations(Subject::Class).await?;
    Ok(ClassReport {
        stats,
        recommendations,
    })
}
