//! Usage judge
//!
//! Decides whether a student used a target word correctly in up to
//! `max_examples` of their own sentences. The judgment source is a trait so
//! tests can substitute a deterministic double; the live implementation asks
//! an LLM for a JSON verdict.
//!
//! `JudgeRunner` wraps any judge with bounded concurrency, per-call timeouts
//! and exponential backoff on transient failures. A pair whose retries run out
//! comes back `Unjudged` instead of failing the batch.

use crate::config::JudgeConfig;
use crate::error::{Result, VocabError};
use crate::services::llm::LlmService;
use crate::types::{JudgeOutcome, Judgment, StudentId, UsageMatch, WordId};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, warn};

/// Source of correct/incorrect usage verdicts
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UsageJudge: Send + Sync {
    async fn classify(&self, word: &str, sentences: &[String]) -> Result<Judgment>;
}

const SYSTEM_PROMPT: &str = "You are a middle-school English teacher grading vocabulary usage. \
Reply with a single JSON object and nothing else.";

/// Judge backed by a live LLM
pub struct LlmUsageJudge {
    llm: LlmService,
}

impl LlmUsageJudge {
    pub fn new(llm: LlmService) -> Self {
        Self { llm }
    }

    fn build_prompt(word: &str, sentences: &[String]) -> String {
        let numbered: Vec<String> = sentences
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{}. {}", i + 1, s))
            .collect();

        format!(
            r#"Target word: "{word}"

Sentences written or spoken by a student:
{sentences}

For each sentence decide whether "{word}" (or an inflected form of it) is used
with its correct meaning and grammar. A sentence where the student meant a
different word (for example "through" instead of "thorough") is incorrect.

Respond with exactly this JSON shape:
{{"word": "{word}", "correct_count": <int>, "incorrect_count": <int>, "misuse_examples": [<sentences judged incorrect, copied verbatim>]}}
"#,
            word = word,
            sentences = numbered.join("\n"),
        )
    }
}

#[async_trait]
impl UsageJudge for LlmUsageJudge {
    async fn classify(&self, word: &str, sentences: &[String]) -> Result<Judgment> {
        let prompt = Self::build_prompt(word, sentences);
        let reply = self.llm.complete(SYSTEM_PROMPT, &prompt).await?;
        parse_judgment(&reply, word, sentences.len())
    }
}

#[derive(Debug, Deserialize)]
struct JudgmentReply {
    #[serde(default)]
    word: Option<String>,
    correct_count: u32,
    incorrect_count: u32,
    #[serde(default)]
    misuse_examples: Vec<String>,
}

/// Parse a judge reply, tolerating code fences and surrounding prose.
/// Counts are clamped so they never exceed the number of sentences sent.
pub fn parse_judgment(reply: &str, word: &str, sentence_count: usize) -> Result<Judgment> {
    let start = reply.find('{');
    let end = reply.rfind('}');
    let body = match (start, end) {
        (Some(s), Some(e)) if e > s => &reply[s..=e],
        _ => {
            return Err(VocabError::MalformedJudgment(format!(
                "no JSON object in reply for '{}'",
                word
            )))
        }
    };

    let parsed: JudgmentReply = serde_json::from_str(body)
        .map_err(|e| VocabError::MalformedJudgment(format!("{} (word '{}')", e, word)))?;

    if let Some(replied) = parsed.word.as_deref() {
        if !replied.trim().eq_ignore_ascii_case(word) {
            return Err(VocabError::MalformedJudgment(format!(
                "reply names '{}' but '{}' was asked",
                replied, word
            )));
        }
    }

    let limit = sentence_count as u32;
    let incorrect_count = parsed.incorrect_count.min(limit);
    let correct_count = parsed.correct_count.min(limit - incorrect_count);
    let mut misuse_examples = parsed.misuse_examples;
    misuse_examples.retain(|s| !s.trim().is_empty());
    misuse_examples.truncate(incorrect_count as usize);

    Ok(Judgment {
        correct_count,
        incorrect_count,
        misuse_examples,
    })
}

/// One (student, word) pair to judge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeRequest {
    pub student_id: StudentId,
    pub word_id: WordId,
    pub word: String,
    pub sentences: Vec<String>,
}

impl JudgeRequest {
    /// Build from a pair's matches, keeping the first `max_examples` distinct sentences
    pub fn from_matches(word: &str, matches: &[&UsageMatch], max_examples: usize) -> Option<Self> {
        let first = matches.first()?;
        let mut sentences: Vec<String> = Vec::new();
        for m in matches {
            if sentences.len() >= max_examples {
                break;
            }
            if !sentences.contains(&m.original_sentence) {
                sentences.push(m.original_sentence.clone());
            }
        }
        Some(Self {
            student_id: first.student_id,
            word_id: first.word_id,
            word: word.to_string(),
            sentences,
        })
    }
}

/// Result of running one request through the retry loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeResult {
    pub student_id: StudentId,
    pub word_id: WordId,
    pub outcome: JudgeOutcome,
    pub attempts: u32,
}

/// Retry, timeout and throttling parameters
#[derive(Debug, Clone)]
pub struct JudgePolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub max_backoff: Duration,
    pub call_timeout: Duration,
    pub max_concurrency: usize,
}

impl From<&JudgeConfig> for JudgePolicy {
    fn from(config: &JudgeConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            call_timeout: Duration::from_secs(config.timeout_secs),
            max_concurrency: config.max_concurrency,
        }
    }
}

impl JudgePolicy {
    /// `base * 2^attempt`, capped
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Runs judge requests with bounded concurrency and backoff
#[derive(Clone)]
pub struct JudgeRunner {
    judge: Arc<dyn UsageJudge>,
    policy: JudgePolicy,
    permits: Arc<Semaphore>,
}

impl JudgeRunner {
    pub fn new(judge: Arc<dyn UsageJudge>, policy: JudgePolicy) -> Self {
        let permits = Arc::new(Semaphore::new(policy.max_concurrency.max(1)));
        Self {
            judge,
            policy,
            permits,
        }
    }

    pub async fn judge_one(&self, request: JudgeRequest) -> JudgeResult {
        let JudgeRequest {
            student_id,
            word_id,
            word,
            sentences,
        } = request;

        let _permit = match self.permits.acquire().await {
            Ok(p) => p,
            Err(e) => {
                return JudgeResult {
                    student_id,
                    word_id,
                    outcome: JudgeOutcome::Unjudged {
                        reason: format!("judge throttle closed: {}", e),
                    },
                    attempts: 0,
                }
            }
        };

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let call = self.judge.classify(&word, &sentences);
            let result = match timeout(self.policy.call_timeout, call).await {
                Ok(r) => r,
                Err(_) => Err(VocabError::Timeout(format!(
                    "judge call exceeded {:?}",
                    self.policy.call_timeout
                ))),
            };

            match result {
                Ok(judgment) => {
                    debug!(
                        "Judged student {} word '{}': {} correct, {} incorrect",
                        student_id, word, judgment.correct_count, judgment.incorrect_count
                    );
                    return JudgeResult {
                        student_id,
                        word_id,
                        outcome: JudgeOutcome::Judged(judgment),
                        attempts,
                    };
                }
                Err(e) if e.is_transient() && attempts <= self.policy.max_retries => {
                    let delay = self.policy.backoff_delay(attempts - 1);
                    warn!(
                        "Judge call for student {} word '{}' failed ({}), retrying after {:?} (attempt {}/{})",
                        student_id, word, e, delay, attempts, self.policy.max_retries
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    error!(
                        "Leaving student {} word '{}' unjudged after {} attempt(s): {}",
                        student_id, word, attempts, e
                    );
                    return JudgeResult {
                        student_id,
                        word_id,
                        outcome: JudgeOutcome::Unjudged {
                            reason: e.to_string(),
                        },
                        attempts,
                    };
                }
            }
        }
    }

    /// Judge every request; results come back ordered by (student, word)
    pub async fn judge_all(&self, requests: Vec<JudgeRequest>) -> Vec<JudgeResult> {
        let mut set = JoinSet::new();
        for request in requests {
            let runner = self.clone();
            set.spawn(async move { runner.judge_one(request).await });
        }

        let mut results = Vec::with_capacity(set.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => error!("Judge task panicked: {}", e),
            }
        }
        results.sort_by_key(|r| (r.student_id, r.word_id));
        results
    }
}
