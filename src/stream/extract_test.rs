use super::*;

#[test]
fn finds_objects_between_prose() {
    let text = "Here you go:\n{\"id\":\"a\",\"x\":1}\nand {\"id\":\"b\",\"nested\":{\"k\":[1,{}]}} done";
    let spans = extract_complete_objects(text);

    assert_eq!(spans.len(), 2);
    assert_eq!(spans[0].raw, r#"{"id":"a","x":1}"#);
    assert_eq!(&text[spans[0].start..spans[0].end], spans[0].raw);
    assert_eq!(spans[1].raw, r#"{"id":"b","nested":{"k":[1,{}]}}"#);
    assert!(spans.iter().all(|s| s.well_formed));
}

#[test]
fn braces_inside_strings_do_not_count() {
    let text = r#"{"id":"a","text":"curly } and \" quote {"}"#;
    let spans = extract_complete_objects(text);
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].end, text.len());
}

#[test]
fn stops_at_object_in_flight() {
    let text = "{\"id\":\"a\"}\n{\"id\":\"b\",\"x\":1";
    let spans = extract_complete_objects(text);
    assert_eq!(spans.len(), 1);
    assert!(has_incomplete_record(text));
    assert!(!has_incomplete_record("{\"id\":\"a\"}\n"));
}

#[test]
fn pretty_printed_object_spans_lines() {
    let text = "{\n  \"id\": \"a\",\n  \"startBinding\": {\n    \"elementId\": \"b\"\n  }\n}\n";
    let spans = extract_complete_objects(text);
    assert_eq!(spans.len(), 1);
    assert!(spans[0].well_formed);
    assert_eq!(spans[0].end, text.len() - 1);
}

#[test]
fn unbalanced_quote_yields_broken_span_up_to_last_brace() {
    let good = r#"{"id":"r","type":"rectangle","x":0}"#;
    let bad = r#"{"id":"t","type":"text","x":0,"text":"say "hi"}"#;
    let text = format!("{good}\n{bad} trailing\n{good}\n");
    let spans = extract_complete_objects(&text);

    assert_eq!(spans.len(), 3);
    assert!(spans[0].well_formed);
    assert!(!spans[1].well_formed);
    assert_eq!(spans[1].raw, bad);
    assert_eq!(spans[1].end, spans[1].start + bad.len());
    assert!(spans[2].well_formed);
}

#[test]
fn broken_line_without_record_keys_is_discarded() {
    let text = "{ \"note\": \"oops\n{\"id\":\"a\",\"x\":1}";
    let spans = extract_complete_objects(text);
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].raw, r#"{"id":"a","x":1}"#);
}

#[test]
fn missing_close_brace_is_cut_at_next_record() {
    let text = "{\"id\":\"a\",\"type\":\"rectangle\",\"x\":1\n{\"id\":\"b\",\"x\":2}\n";
    let spans = extract_complete_objects(text);

    assert_eq!(spans.len(), 2);
    assert!(!spans[0].well_formed);
    assert_eq!(spans[0].raw, "{\"id\":\"a\",\"type\":\"rectangle\",\"x\":1");
    assert_eq!(spans[1].raw, r#"{"id":"b","x":2}"#);
}

#[test]
fn broken_line_waits_for_its_newline() {
    let text = r#"{"id":"t","type":"text","text":"a"b"#;
    assert!(extract_complete_objects(text).is_empty());
    assert!(has_incomplete_record(text));
}

#[test]
fn record_key_detection_needs_a_colon() {
    assert!(looks_like_record(r#"{"id" : "x""#));
    assert!(!looks_like_record(r#"{"name":"id","identity":"x"}"#));
}

#[test]
fn one_record_per_line_breaks_at_the_newline() {
    let bullets = "- {\"id\":\"a\",\"type\":\"rectangle\",\"x\":1\n- {\"id\":\"b\",\"x\":2}\n";
    let spans = extract_complete_objects(bullets);
    assert_eq!(spans.len(), 2);
    assert!(!spans[0].well_formed);
    assert_eq!(spans[0].raw, "{\"id\":\"a\",\"type\":\"rectangle\",\"x\":1");
    assert_eq!(spans[1].raw, r#"{"id":"b","x":2}"#);

    let leading_commas = "[{\"id\":\"a\",\"type\":\"text\",\"x\":1\n, {\"id\":\"b\",\"x\":2}\n]";
    let spans = extract_complete_objects(leading_commas);
    assert_eq!(spans.len(), 2);
    assert!(!spans[0].well_formed);
    assert!(spans[1].well_formed);
    assert!(!has_incomplete_record(leading_commas));
}

#[test]
fn open_record_waits_for_the_next_line_to_start() {
    let text = "{\"id\":\"a\",\"type\":\"rectangle\",\"x\":1\n   ";
    assert!(extract_complete_objects(text).is_empty());
    assert!(has_incomplete_record(text));
}
