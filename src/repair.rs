//! Repair coordinator: a second chance for records that failed ingestion.
//!
//! DESIGN
//! ======
//! Failed spans go to an external [`Repairer`] (usually an LLM) in one
//! fan-out: every request is in flight at once and the coordinator waits for
//! all of them with `join_all`, so one slow or failing repair never blocks or
//! cancels another. The batch is capped to bound cost; spans past the cap are
//! returned unrepaired.
//!
//! Repaired text goes through the same validation and defaults as freshly
//! ingested text, keyed by the offset the broken span came from, and the
//! result is its own normalized batch. Elements accepted earlier are never
//! touched.

use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;

use crate::element::Element;
use crate::error::ErrorCode;
use crate::llm::{LlmChat, LlmError, Message};
use crate::stream::{IngestOptions, ParseFailure, parse_record};

#[cfg(test)]
#[path = "repair_test.rs"]
mod tests;

/// Default cap on repair requests per batch.
pub const DEFAULT_MAX_REPAIRS: usize = 10;

/// Default token budget for one LLM repair reply.
pub const DEFAULT_REPAIR_MAX_TOKENS: u32 = 4096;

const REPAIR_SYSTEM_PROMPT: &str = "\
You repair malformed JSON objects describing diagram elements.

Common defects:
1. Broken key quoting: \"x:100\" should be \"x\":100
2. Quoted numbers: \"x\":\"100\" should be \"x\":100
3. Duplicate keys: keep the first
4. Unquoted keys or single quotes: {type:'text'} should be {\"type\":\"text\"}
5. Unescaped quotes inside string values

Rules:
- Keep the original keys and values; fix syntax only.
- Output must be a single valid JSON object.
- If the input cannot be repaired, output null.

Output only the JSON. No explanation, no code fences. Start with { and end with }.";

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RepairError {
    #[error("repair collaborator failed: {0}")]
    Collaborator(String),

    #[error(transparent)]
    Llm(#[from] LlmError),
}

impl ErrorCode for RepairError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Collaborator(_) => "E_REPAIR_COLLABORATOR",
            Self::Llm(e) => e.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Collaborator(_) => false,
            Self::Llm(e) => e.retryable(),
        }
    }
}

// =============================================================================
// COLLABORATOR
// =============================================================================

/// Out-of-process repair of one malformed record.
///
/// `Ok(None)` and `Err(_)` are both "could not repair".
#[async_trait::async_trait]
pub trait Repairer: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`RepairError`] when the collaborator itself fails.
    async fn repair(&self, malformed: &str) -> Result<Option<String>, RepairError>;
}

/// [`Repairer`] backed by any [`LlmChat`].
pub struct LlmRepairer {
    llm: Arc<dyn LlmChat>,
    max_tokens: u32,
}

impl LlmRepairer {
    #[must_use]
    pub fn new(llm: Arc<dyn LlmChat>) -> Self {
        Self { llm, max_tokens: DEFAULT_REPAIR_MAX_TOKENS }
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    #[must_use]
    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

#[async_trait::async_trait]
impl Repairer for LlmRepairer {
    async fn repair(&self, malformed: &str) -> Result<Option<String>, RepairError> {
        let trimmed = malformed.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        let messages = [Message::user(format!("Repair this JSON:\n{trimmed}"))];
        let response = self.llm.chat(self.max_tokens, REPAIR_SYSTEM_PROMPT, &messages).await?;

        let reply = response.text();
        let candidate = strip_code_fence(&reply);
        if matches!(serde_json::from_str::<Value>(candidate), Ok(Value::Object(_))) {
            Ok(Some(candidate.to_owned()))
        } else {
            tracing::debug!(reply_len = reply.len(), "repair: reply is not a JSON object");
            Ok(None)
        }
    }
}

/// Remove a surrounding ```` ``` ```` / ```` ```json ```` fence, if any.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

// =============================================================================
// COORDINATOR
// =============================================================================

#[derive(Debug, Default)]
pub struct RepairOutcome {
    /// Normalized batch of repaired elements, in failure order.
    pub repaired: Vec<Element>,
    /// Failures that stay failed, original error preserved.
    pub unrepaired: Vec<ParseFailure>,
    /// Failures never sent because of the cap.
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct RepairCoordinator {
    pub max_attempts: usize,
    pub options: IngestOptions,
}

impl Default for RepairCoordinator {
    fn default() -> Self {
        Self::new(IngestOptions::default())
    }
}

impl RepairCoordinator {
    #[must_use]
    pub fn new(options: IngestOptions) -> Self {
        Self { max_attempts: DEFAULT_MAX_REPAIRS, options }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Send up to `max_attempts` failures to `repairer` concurrently and merge
    /// whatever comes back into one new batch.
    pub async fn repair(&self, repairer: &dyn Repairer, mut failures: Vec<ParseFailure>) -> RepairOutcome {
        let overflow = failures.split_off(failures.len().min(self.max_attempts));
        let skipped = overflow.len();
        if skipped > 0 {
            tracing::warn!(attempts = failures.len(), skipped, "repair: batch capped");
        }
        if failures.is_empty() {
            return RepairOutcome { repaired: Vec::new(), unrepaired: overflow, skipped };
        }

        tracing::info!(attempts = failures.len(), "repair: fan-out");
        let replies = join_all(failures.iter().map(|failure| repairer.repair(&failure.raw))).await;

        let mut repaired = Vec::new();
        let mut unrepaired = Vec::new();
        for (failure, reply) in failures.into_iter().zip(replies) {
            match reply {
                Ok(Some(text)) => match parse_record(text.trim(), failure.start, self.options.updated_at) {
                    Ok(element) => repaired.push(element),
                    Err(e) => {
                        tracing::warn!(start = failure.start, code = e.error_code(), error = %e, "repair: repaired record still invalid");
                        unrepaired.push(failure);
                    }
                },
                Ok(None) => {
                    tracing::debug!(start = failure.start, "repair: collaborator gave up");
                    unrepaired.push(failure);
                }
                Err(e) => {
                    tracing::warn!(start = failure.start, code = e.error_code(), error = %e, "repair: collaborator failed");
                    unrepaired.push(failure);
                }
            }
        }
        unrepaired.extend(overflow);

        let repaired = match &self.options.normalizer {
            Some(normalizer) => normalizer.normalize(repaired),
            None => repaired,
        };
        tracing::info!(repaired = repaired.len(), unrepaired = unrepaired.len(), skipped, "repair: fan-in");
        RepairOutcome { repaired, unrepaired, skipped }
    }
}
