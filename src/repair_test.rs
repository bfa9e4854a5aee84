use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;
use crate::llm::{ChatResponse, ContentBlock};
use crate::normalize::Normalizer;
use crate::stream::RecordError;

// =========================================================================
// Mocks
// =========================================================================

/// Answers from a fixed table keyed by the malformed text.
#[derive(Default)]
struct MockRepairer {
    answers: HashMap<String, Result<Option<String>, String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MockRepairer {
    fn answer(mut self, raw: &str, reply: Result<Option<&str>, &str>) -> Self {
        let reply = reply.map(|r| r.map(str::to_owned)).map_err(str::to_owned);
        self.answers.insert(raw.to_owned(), reply);
        self
    }
}

#[async_trait::async_trait]
impl Repairer for MockRepairer {
    async fn repair(&self, malformed: &str) -> Result<Option<String>, RepairError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.answers.get(malformed) {
            Some(Ok(reply)) => Ok(reply.clone()),
            Some(Err(message)) => Err(RepairError::Collaborator(message.clone())),
            None => Ok(None),
        }
    }
}

struct MockLlm {
    responses: Mutex<Vec<Result<ChatResponse, LlmError>>>,
    prompts: Mutex<Vec<String>>,
}

impl MockLlm {
    fn new(responses: Vec<Result<ChatResponse, LlmError>>) -> Self {
        Self { responses: Mutex::new(responses), prompts: Mutex::new(Vec::new()) }
    }
}

fn reply(text: &str) -> Result<ChatResponse, LlmError> {
    Ok(ChatResponse {
        content: vec![ContentBlock::Text { text: text.into() }],
        model: "mock".into(),
        stop_reason: "end_turn".into(),
        input_tokens: 0,
        output_tokens: 0,
    })
}

#[async_trait::async_trait]
impl LlmChat for MockLlm {
    async fn chat(&self, _max_tokens: u32, _system: &str, messages: &[Message]) -> Result<ChatResponse, LlmError> {
        if let Some(crate::llm::Content::Text(text)) = messages.first().map(|m| &m.content) {
            self.prompts.lock().unwrap().push(text.clone());
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() { reply("null") } else { responses.remove(0) }
    }
}

fn failure(raw: &str, start: usize) -> ParseFailure {
    ParseFailure { raw: raw.into(), error: RecordError::Malformed, start, end: start + raw.len() }
}

fn coordinator() -> RepairCoordinator {
    RepairCoordinator::new(IngestOptions::raw(0))
}

// =========================================================================
// RepairCoordinator
// =========================================================================

#[tokio::test]
async fn one_bad_repair_does_not_affect_others() {
    let repairer = MockRepairer::default()
        .answer("A", Ok(Some(r#"{"id":"a","type":"rectangle","x":1}"#)))
        .answer("B", Err("timeout"))
        .answer("C", Ok(Some("not json")))
        .answer("D", Ok(Some(r#"{"id":"d","type":"ellipse","x":2}"#)));
    let failures = vec![failure("A", 0), failure("B", 10), failure("C", 20), failure("D", 30), failure("E", 40)];

    let outcome = coordinator().repair(&repairer, failures).await;

    let ids: Vec<&str> = outcome.repaired.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "d"]);
    let unrepaired: Vec<&str> = outcome.unrepaired.iter().map(|f| f.raw.as_str()).collect();
    assert_eq!(unrepaired, vec!["B", "C", "E"]);
    assert!(outcome.unrepaired.iter().all(|f| f.error == RecordError::Malformed));
    assert_eq!(outcome.skipped, 0);
}

#[tokio::test]
async fn all_requests_are_in_flight_together() {
    let repairer = MockRepairer::default();
    let failures: Vec<ParseFailure> = (0..6).map(|i| failure(&format!("r{i}"), i * 10)).collect();

    let outcome = coordinator().repair(&repairer, failures).await;

    assert_eq!(repairer.peak.load(Ordering::SeqCst), 6);
    assert_eq!(outcome.unrepaired.len(), 6);
}

#[tokio::test]
async fn batch_is_capped() {
    let repairer = MockRepairer::default();
    let failures: Vec<ParseFailure> = (0..5).map(|i| failure(&format!("r{i}"), i)).collect();

    let outcome = coordinator().with_max_attempts(2).repair(&repairer, failures).await;

    assert_eq!(repairer.peak.load(Ordering::SeqCst), 2);
    assert_eq!(outcome.skipped, 3);
    assert_eq!(outcome.unrepaired.len(), 5);
    assert_eq!(outcome.unrepaired[2].raw, "r2");
}

#[tokio::test]
async fn repaired_records_keep_their_offset_key_and_are_normalized() {
    let repairer = MockRepairer::default()
        .answer("box", Ok(Some(r#"{"id":"box","type":"rectangle","x":0,"y":0,"width":50,"height":50}"#)));
    let coordinator = RepairCoordinator::new(IngestOptions { updated_at: 3, normalizer: Some(Normalizer::default()) });

    let outcome = coordinator.repair(&repairer, vec![failure("box", 62)]).await;

    let element = &outcome.repaired[0];
    assert_eq!(element.meta.index.as_deref(), Some("b10"));
    assert_eq!(element.meta.updated, Some(3));
    assert_eq!(element.style.stroke_color.as_deref(), Some(crate::normalize::PALETTE[0].stroke));
}

#[tokio::test]
async fn nothing_to_repair() {
    let outcome = coordinator().repair(&MockRepairer::default(), Vec::new()).await;
    assert!(outcome.repaired.is_empty() && outcome.unrepaired.is_empty());
}

// =========================================================================
// LlmRepairer
// =========================================================================

#[tokio::test]
async fn llm_reply_is_unfenced_and_checked() {
    let llm = Arc::new(MockLlm::new(vec![
        reply("```json\n{\"id\":\"a\",\"type\":\"text\",\"x\":0}\n```"),
        reply("Sorry, I can't fix that."),
        reply("[1, 2]"),
    ]));
    let repairer = LlmRepairer::new(llm.clone());

    let fixed = repairer.repair("{\"id\":\"a\",type:text,\"x\":0}").await.unwrap();
    assert_eq!(fixed.as_deref(), Some(r#"{"id":"a","type":"text","x":0}"#));
    assert_eq!(repairer.repair("{broken").await.unwrap(), None);
    assert_eq!(repairer.repair("{also broken").await.unwrap(), None);

    let prompts = llm.prompts.lock().unwrap();
    assert!(prompts[0].starts_with("Repair this JSON:\n{\"id\":\"a\""));
}

#[tokio::test]
async fn llm_errors_surface_as_repair_errors() {
    let llm = Arc::new(MockLlm::new(vec![Err(LlmError::ApiResponse { status: 503, body: String::new() })]));
    let repairer = LlmRepairer::new(llm);

    let error = repairer.repair("{x").await.unwrap_err();
    assert_eq!(error.error_code(), "E_API_RESPONSE");
    assert!(error.retryable());
}

#[tokio::test]
async fn blank_input_skips_the_llm() {
    let llm = Arc::new(MockLlm::new(Vec::new()));
    let repairer = LlmRepairer::new(llm.clone());
    assert_eq!(repairer.repair("   ").await.unwrap(), None);
    assert!(llm.prompts.lock().unwrap().is_empty());
}

#[test]
fn fence_stripping() {
    assert_eq!(strip_code_fence("  {\"a\":1}  "), "{\"a\":1}");
    assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
    assert_eq!(strip_code_fence("```json\n{\"a\":1}"), "{\"a\":1}");
}
