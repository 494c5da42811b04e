//! Pipeline configuration
//!
//! Loaded from a TOML file with per-section defaults, then overridden by
//! environment variables and CLI flags. `validate()` runs before any write so
//! a bad configuration aborts the run cleanly.

use crate::error::{Result, VocabError};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable overriding the database path
pub const DB_PATH_ENV: &str = "VOCABMATCH_DB_PATH";
/// Environment variable holding the judge API key
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
/// Environment variable overriding the judge base URL
pub const JUDGE_URL_ENV: &str = "VOCABMATCH_JUDGE_URL";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub database: DatabaseConfig,
    pub inputs: InputConfig,
    pub judge: JudgeConfig,
    pub baseline: BaselineConfig,
    pub scoring: ScoringConfig,
    pub class: ClassConfig,
    pub corpus: CorpusConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub pool_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            pool_size: 8,
        }
    }
}

/// Get the default database path using XDG_DATA_HOME standard
fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vocabmatch")
        .join("vocabmatch.db")
}

/// Locations of the batch inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Directory of grade-labelled word lists
    pub vocab_dir: PathBuf,
    /// JSON roster of students
    pub roster: PathBuf,
    /// Speaker-labelled classroom transcript (optional)
    pub transcript: Option<PathBuf>,
    /// Directory of per-student essays (optional)
    pub essays_dir: Option<PathBuf>,
    /// Directory holding metadata.json and counts/
    pub corpus_dir: PathBuf,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            vocab_dir: PathBuf::from("data/vocab"),
            roster: PathBuf::from("data/students.json"),
            transcript: None,
            essays_dir: None,
            corpus_dir: PathBuf::from("data/corpus"),
        }
    }
}

/// External usage judge settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    /// API key; falls back to ANTHROPIC_API_KEY when empty
    #[serde(skip_serializing)]
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f32,
    /// Example sentences sent per (student, word) pair
    pub max_examples: usize,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub max_backoff_ms: u64,
    pub timeout_secs: u64,
    /// Ceiling on in-flight judge calls
    pub max_concurrency: usize,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.anthropic.com/v1".to_string(),
            model: "claude-3-5-haiku-20241022".to_string(),
            max_tokens: 512,
            temperature: 0.0,
            max_examples: 2,
            max_retries: 3,
            backoff_base_ms: 1000,
            max_backoff_ms: 16_000,
            timeout_secs: 30,
            max_concurrency: 4,
        }
    }
}

impl JudgeConfig {
    /// Resolve the API key from config or the environment
    pub fn resolve_api_key(&self) -> Result<String> {
        if !self.api_key.is_empty() {
            return Ok(self.api_key.clone());
        }
        match env::var(API_KEY_ENV) {
            Ok(key) if !key.is_empty() => {
                debug!("Using judge API key from {}", API_KEY_ENV);
                Ok(key)
            }
            _ => Err(VocabError::Config(format!(
                "judge API key not set; set {} or judge.api_key",
                API_KEY_ENV
            ))),
        }
    }
}

/// Assumed prior knowledge not observed in text
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    /// Fraction of lower-grade words assumed known
    pub lower_grade_fraction: f64,
    /// Own-grade fraction for a student reading exactly at grade
    pub own_grade_base: f64,
    /// Change in own-grade fraction per grade of reading level offset
    pub own_grade_slope: f64,
    pub own_grade_min: f64,
    pub own_grade_max: f64,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            lower_grade_fraction: 0.95,
            own_grade_base: 0.5,
            own_grade_slope: 0.15,
            own_grade_min: 0.1,
            own_grade_max: 0.9,
        }
    }
}

/// Student/text matching weights and thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub top_k: usize,
    pub known_weight: f64,
    pub new_words_weight: f64,
    pub reading_level_weight: f64,
    pub target_band_low: f64,
    pub target_band_high: f64,
    pub too_easy_above: f64,
    pub too_hard_below: f64,
    /// Penalty per unit of known_percent beyond a threshold
    pub penalty_rate: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            known_weight: 0.4,
            new_words_weight: 0.4,
            reading_level_weight: 0.2,
            target_band_low: 0.50,
            target_band_high: 0.75,
            too_easy_above: 0.85,
            too_hard_below: 0.40,
            penalty_rate: 2.0,
        }
    }
}

/// Class rollup sizes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassConfig {
    pub top_missing: usize,
    pub top_misused: usize,
    pub class_picks: usize,
}

impl Default for ClassConfig {
    fn default() -> Self {
        Self {
            top_missing: 10,
            top_misused: 10,
            class_picks: 2,
        }
    }
}

/// Candidate-text filters applied while indexing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    pub languages: Vec<String>,
    pub category: String,
    pub min_downloads: u64,
    pub max_texts: Option<usize>,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            languages: vec!["en".to_string()],
            category: "Text".to_string(),
            min_downloads: 0,
            max_texts: None,
        }
    }
}

impl PipelineConfig {
    /// Load from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            VocabError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(toml_str)?;
        Ok(config)
    }

    /// Apply environment overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = env::var(DB_PATH_ENV) {
            if !path.is_empty() {
                self.database.path = PathBuf::from(path);
            }
        }
        if let Ok(url) = env::var(JUDGE_URL_ENV) {
            if !url.is_empty() {
                self.judge.base_url = url;
            }
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.scoring;
        let weights = s.known_weight + s.new_words_weight + s.reading_level_weight;
        if (weights - 1.0).abs() > 1e-6 {
            return Err(VocabError::Config(format!(
                "scoring weights must sum to 1.0, got {:.3}",
                weights
            )));
        }
        if s.top_k == 0 {
            return Err(VocabError::Config("scoring.top_k must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&s.target_band_low)
            || !(0.0..=1.0).contains(&s.target_band_high)
            || s.target_band_low > s.target_band_high
        {
            return Err(VocabError::Config("scoring target band must lie within [0, 1]".into()));
        }
        if s.too_hard_below > s.too_easy_above {
            return Err(VocabError::Config(
                "scoring.too_hard_below must not exceed scoring.too_easy_above".into(),
            ));
        }

        let b = &self.baseline;
        for (name, value) in [
            ("lower_grade_fraction", b.lower_grade_fraction),
            ("own_grade_min", b.own_grade_min),
            ("own_grade_max", b.own_grade_max),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(VocabError::Config(format!("baseline.{} must be in [0, 1]", name)));
            }
        }
        if b.own_grade_min > b.own_grade_max {
            return Err(VocabError::Config(
                "baseline.own_grade_min must not exceed own_grade_max".into(),
            ));
        }

        if self.judge.max_concurrency == 0 {
            return Err(VocabError::Config("judge.max_concurrency must be > 0".into()));
        }
        if self.judge.max_examples == 0 {
            return Err(VocabError::Config("judge.max_examples must be > 0".into()));
        }
        if self.database.pool_size == 0 {
            return Err(VocabError::Config("database.pool_size must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scoring.top_k, 3);
        assert_eq!(config.class.class_picks, 2);
        assert_eq!(config.judge.max_examples, 2);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [judge]
            max_retries = 5

            [inputs]
            vocab_dir = "vocab"
            roster = "roster.json"
            corpus_dir = "corpus"
            "#,
        )
        .unwrap();

        assert_eq!(config.judge.max_retries, 5);
        assert_eq!(config.judge.max_concurrency, 4);
        assert_eq!(config.inputs.vocab_dir, PathBuf::from("vocab"));
        assert!(config.inputs.transcript.is_none());
    }

    #[test]
    fn test_bad_weights_rejected() {
        let mut config = PipelineConfig::default();
        config.scoring.known_weight = 0.9;
        let err = config.validate().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = PipelineConfig::default();
        config.judge.max_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_explicit_api_key_wins() {
        let judge = JudgeConfig {
            api_key: "sk-test".to_string(),
            ..Default::default()
        };
        assert_eq!(judge.resolve_api_key().unwrap(), "sk-test");
    }
}
