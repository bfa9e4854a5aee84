use serde_json::json;

use super::*;

// =============================================================================
// LlmError
// =============================================================================

#[test]
fn error_codes() {
    assert_eq!(LlmError::ApiRequest("timeout".into()).error_code(), "E_API_REQUEST");
    assert_eq!(LlmError::ApiResponse { status: 500, body: "oops".into() }.error_code(), "E_API_RESPONSE");
    assert_eq!(LlmError::ApiParse("json".into()).error_code(), "E_API_PARSE");
}

#[test]
fn retryable_request_and_server_errors() {
    assert!(LlmError::ApiRequest("conn refused".into()).retryable());
    assert!(LlmError::ApiResponse { status: 429, body: String::new() }.retryable());
    assert!(LlmError::ApiResponse { status: 503, body: String::new() }.retryable());
}

#[test]
fn not_retryable_client_errors() {
    assert!(!LlmError::ApiResponse { status: 400, body: String::new() }.retryable());
    assert!(!LlmError::ApiParse("bad".into()).retryable());
}

// =============================================================================
// Content
// =============================================================================

#[test]
fn unknown_blocks_deserialize_as_unknown() {
    let blocks: Vec<ContentBlock> = serde_json::from_value(json!([
        {"type": "text", "text": "a"},
        {"type": "tool_use", "id": "t1", "name": "x", "input": {}},
        {"type": "thinking", "thinking": "hm"}
    ]))
    .unwrap();
    assert_eq!(blocks[1], ContentBlock::Unknown);
    assert_eq!(blocks[2], ContentBlock::Thinking { thinking: "hm".into() });
}

#[test]
fn response_text_joins_text_blocks_only() {
    let response = ChatResponse {
        content: vec![
            ContentBlock::Thinking { thinking: "ignore me".into() },
            ContentBlock::Text { text: "{\"id\":".into() },
            ContentBlock::Text { text: "\"a\"}".into() },
        ],
        model: "mock".into(),
        stop_reason: "end_turn".into(),
        input_tokens: 0,
        output_tokens: 0,
    };
    assert_eq!(response.text(), r#"{"id":"a"}"#);
}

#[test]
fn user_message_serializes_as_plain_text() {
    let message = Message::user("fix this");
    assert_eq!(serde_json::to_value(&message).unwrap(), json!({"role": "user", "content": "fix this"}));
}
