//! End-to-end pipeline runs against a temp-file store

mod common;

use common::{Fixture, ScriptedJudge};
use std::sync::Arc;
use vocabmatch_core::{
    student_report, Recommendation, ResultStore, StudentId, Subject, TextId, VocabError,
};

fn count(counts: &[(String, i64)], table: &str) -> i64 {
    counts
        .iter()
        .find(|(t, _)| t == table)
        .map(|(_, n)| *n)
        .unwrap_or(-1)
}

#[tokio::test]
async fn test_full_run_summary_and_recommendations() {
    let fixture = Fixture::new();
    let store = fixture.store();
    let judge = Arc::new(ScriptedJudge::new().misusing(&["thorough", "vivid"]));

    let summary = fixture
        .pipeline(store.clone())
        .run(judge.clone())
        .await
        .expect("run failed");

    assert_eq!(summary.students_processed, 3);
    assert_eq!(summary.students_without_text, 1);
    assert_eq!(summary.matches_found, 8);
    assert_eq!(summary.pairs_judged, 8);
    assert_eq!(summary.pairs_unjudged, 0);
    assert_eq!(judge.calls(), 8);
    assert_eq!(summary.texts_indexed, 4);
    assert_eq!(summary.texts_skipped["filtered_language"], 1);
    assert_eq!(summary.texts_skipped["missing_counts"], 1);
    assert_eq!(summary.essays_skipped, 1);
    assert_eq!(summary.recommendations_written, 9);
    assert_eq!(summary.class_recommendations_written, 2);
    assert!(summary.finished_at.is_some());

    for id in 1..=3 {
        let recs = store
            .load_recommendations(Subject::Student(StudentId(id)))
            .await
            .unwrap();
        assert_eq!(recs.len(), 3, "student {} should get three texts", id);
        // Text 104 has no catalog words and is never ranked
        assert!(recs.iter().all(|r| r.text_id != TextId(104)));
        assert!(recs.iter().all(|r| (0.0..=1.0).contains(&r.match_score)));
        let ranks: Vec<u32> = recs.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    let class = store.load_recommendations(Subject::Class).await.unwrap();
    assert_eq!(class.len(), 2);
    assert!(class.iter().all(|r| r.students_recommended_count == Some(3)));

    let latest = store.latest_run_summary().await.unwrap().unwrap();
    assert_eq!(latest.run_id, summary.run_id);
}

#[tokio::test]
async fn test_teacher_speech_is_not_attributed() {
    let fixture = Fixture::new();
    let store = fixture.store();
    fixture
        .pipeline(store.clone())
        .run(Arc::new(ScriptedJudge::new()))
        .await
        .unwrap();

    let catalog = store.load_catalog().await.unwrap();
    let ponder = catalog.iter().find(|w| w.surface_form == "ponder").unwrap().id;
    for profile in store.load_profiles().await.unwrap() {
        if let Some(entry) = profile.entries.get(&ponder) {
            assert_eq!(entry.usage_count, 0, "ponder was only spoken by the teacher");
        }
    }

    // keen appears in grade 5 and grade 8 lists; the higher grade wins
    let keen = catalog.iter().find(|w| w.surface_form == "keen").unwrap();
    assert_eq!(keen.grade_level, 8);
}

#[tokio::test]
async fn test_misuse_reported_with_example() {
    let fixture = Fixture::new();
    let store = fixture.store();
    fixture
        .pipeline(store.clone())
        .run(Arc::new(ScriptedJudge::new().misusing(&["thorough", "vivid"])))
        .await
        .unwrap();

    let report = student_report(store.as_ref(), StudentId(2)).await.unwrap();
    let words: Vec<&str> = report.misused_words.iter().map(|m| m.word.as_str()).collect();
    assert!(words.contains(&"thorough"));
    assert!(words.contains(&"vivid"));
    let thorough = report
        .misused_words
        .iter()
        .find(|m| m.word == "thorough")
        .unwrap();
    assert_eq!(
        thorough.example.as_deref(),
        Some("I was thorough the door before the bell.")
    );
    assert!(report.missing_words.contains(&"thorough".to_string()));
    assert_eq!(report.recommendations.len(), 3);
}

#[tokio::test]
async fn test_zero_text_student_gets_baseline_profile() {
    let fixture = Fixture::new();
    let store = fixture.store();
    fixture
        .pipeline(store.clone())
        .run(Arc::new(ScriptedJudge::new()))
        .await
        .unwrap();

    let ana = store.load_profile(StudentId(3)).await.unwrap().unwrap();
    assert!(ana
        .entries
        .values()
        .all(|e| e.baseline_known && e.usage_count == 0 && !e.judged));
    assert_eq!(ana.total_grade_level_words, 6);
    assert!((0.0..=100.0).contains(&ana.mastery_percent));
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let fixture = Fixture::new();
    let store = fixture.store();
    let pipeline = fixture.pipeline(store.clone());
    let judge = Arc::new(ScriptedJudge::new().misusing(&["thorough"]));

    pipeline.run(judge.clone()).await.unwrap();
    let first = store.load_profiles().await.unwrap();
    let first_recs = store
        .load_recommendations(Subject::Student(StudentId(1)))
        .await
        .unwrap();

    let summary = pipeline.run(judge).await.unwrap();
    let second = store.load_profiles().await.unwrap();
    let second_recs = store
        .load_recommendations(Subject::Student(StudentId(1)))
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(summary.judge_disagreements, 0);
    let ids = |recs: &[Recommendation]| recs.iter().map(|r| r.text_id).collect::<Vec<_>>();
    assert_eq!(ids(&first_recs), ids(&second_recs));

    let counts = store.table_counts().await.unwrap();
    assert_eq!(count(&counts, "recommendations"), 9 + 2);
    assert_eq!(count(&counts, "class_stats"), 1);
    assert_eq!(count(&counts, "run_summaries"), 2);
}

#[tokio::test]
async fn test_changed_judgment_counts_as_disagreement() {
    let fixture = Fixture::new();
    let store = fixture.store();
    let pipeline = fixture.pipeline(store.clone());

    pipeline
        .run(Arc::new(ScriptedJudge::new().misusing(&["thorough", "vivid"])))
        .await
        .unwrap();
    let summary = pipeline
        .run(Arc::new(ScriptedJudge::new().misusing(&["vivid"])))
        .await
        .unwrap();

    assert_eq!(summary.judge_disagreements, 1);
    let leo = store.load_profile(StudentId(2)).await.unwrap().unwrap();
    assert_eq!(leo.misused_entries().count(), 1);
}

#[tokio::test]
async fn test_exhausted_retries_leave_pair_unjudged() {
    let fixture = Fixture::new();
    let store = fixture.store();
    let judge = Arc::new(ScriptedJudge::new().failing(&["thorough"]));

    let summary = fixture
        .pipeline(store.clone())
        .run(judge.clone())
        .await
        .expect("transient failures must not abort the run");

    assert_eq!(summary.pairs_unjudged, 1);
    assert_eq!(summary.pairs_judged, 7);
    // One call plus two retries for the failing pair
    assert_eq!(judge.calls(), 7 + 3);

    let leo = store.load_profile(StudentId(2)).await.unwrap().unwrap();
    let catalog = store.load_catalog().await.unwrap();
    let thorough = catalog.iter().find(|w| w.surface_form == "thorough").unwrap().id;
    let entry = &leo.entries[&thorough];
    assert!(!entry.judged);
    assert_eq!(entry.usage_count, 1);
    assert_eq!(entry.correct_count + entry.incorrect_count, 0);

    let counts = store.table_counts().await.unwrap();
    assert_eq!(count(&counts, "unjudged_log"), 1);
}

#[tokio::test]
async fn test_recommend_rescoring_matches_run() {
    let fixture = Fixture::new();
    let store = fixture.store();
    let pipeline = fixture.pipeline(store.clone());
    pipeline.run(Arc::new(ScriptedJudge::new())).await.unwrap();
    let before = store.load_recommendations(Subject::Class).await.unwrap();

    let summary = pipeline.recommend().await.unwrap();
    let after = store.load_recommendations(Subject::Class).await.unwrap();

    assert_eq!(summary.recommendations_written, 9);
    assert_eq!(summary.pairs_judged, 0);
    assert_eq!(
        before.iter().map(|r| r.text_id).collect::<Vec<_>>(),
        after.iter().map(|r| r.text_id).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_missing_catalog_aborts_before_writes() {
    let fixture = Fixture::new();
    let store = fixture.store();
    let mut config = fixture.config();
    let empty = fixture.path().join("empty_vocab");
    std::fs::create_dir(&empty).unwrap();
    config.inputs.vocab_dir = empty;

    let err = vocabmatch_core::Pipeline::new(config, store.clone())
        .run(Arc::new(ScriptedJudge::new()))
        .await
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, VocabError::MissingCatalog(_)));

    store.init_schema().await.unwrap();
    let counts = store.table_counts().await.unwrap();
    assert!(counts.iter().all(|(_, n)| *n == 0));
}

#[tokio::test]
async fn test_missing_corpus_aborts_before_writes() {
    let fixture = Fixture::new();
    let store = fixture.store();
    let mut config = fixture.config();
    config.inputs.corpus_dir = fixture.path().join("nowhere");

    let judge = Arc::new(ScriptedJudge::new());
    let err = vocabmatch_core::Pipeline::new(config, store.clone())
        .run(judge.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, VocabError::MissingCorpus(_)));
    assert_eq!(judge.calls(), 0);

    store.init_schema().await.unwrap();
    let counts = store.table_counts().await.unwrap();
    assert!(counts.iter().all(|(_, n)| *n == 0));
}
