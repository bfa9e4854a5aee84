use super::*;
use crate::dsl::value::ElementRef;

fn num(n: i64) -> FieldValue {
    FieldValue::Number(n.into())
}

#[test]
fn parses_sections_and_rows() {
    let text = "\
# comment
version: 2
shape: array
meta: {\"source\": \"test\"}

common:
- strokeColor=#1e1e1e

textCommon:
- fontSize=20

rectangle:
- id x=x y=y
- 1 x=0 y=5
- @2 y=7 x=3

text:
- id t=text c=containerId
- 3 t=\"two words\" c=1
";
    let doc = parse_document(text).unwrap();
    assert_eq!(doc.version, Some(2));
    assert_eq!(doc.shape, Some(DocumentShape::Array));
    assert_eq!(doc.meta.unwrap().get("source").and_then(Value::as_str), Some("test"));
    assert_eq!(doc.common, vec![("strokeColor".into(), FieldValue::Text("#1e1e1e".into()))]);
    assert_eq!(doc.text_common, vec![("fontSize".into(), num(20))]);

    assert_eq!(doc.rows.len(), 3);
    assert_eq!(doc.rows[0].short, "1");
    assert_eq!(doc.rows[0].fields, vec![("x".into(), num(0)), ("y".into(), num(5))]);
    assert_eq!(doc.rows[1].short, "2");
    assert_eq!(doc.rows[1].fields, vec![("y".into(), num(7)), ("x".into(), num(3))]);
    assert_eq!(doc.rows[2].kind, "text");
    assert_eq!(
        doc.rows[2].fields,
        vec![
            ("text".into(), FieldValue::Text("two words".into())),
            ("containerId".into(), FieldValue::Ref(ElementRef::Short("1".into()))),
        ]
    );
}

#[test]
fn positional_tokens_follow_header_columns() {
    let text = "rectangle:\n- id x=x y=y w=width\n- 4 10 20 w=30\n";
    let doc = parse_document(text).unwrap();
    assert_eq!(
        doc.rows[0].fields,
        vec![("x".into(), num(10)), ("y".into(), num(20)), ("width".into(), num(30))]
    );
}

#[test]
fn unknown_alias_is_used_as_field_name() {
    let doc = parse_document("ellipse:\n- id x=x\n- 1 x=1 opacity=50\n").unwrap();
    assert_eq!(doc.rows[0].fields[1], ("opacity".into(), num(50)));
}

#[test]
fn extra_positional_token_is_rejected() {
    let err = parse_document("ellipse:\n- id x=x\n- 1 5 6\n").unwrap_err();
    assert!(matches!(err, DslError::InvalidToken { line: 3, .. }), "{err}");
}

#[test]
fn entry_before_section_is_rejected() {
    let err = parse_document("- 1 x=1\n").unwrap_err();
    assert!(matches!(err, DslError::EntryOutsideSection { line: 1 }));
}

#[test]
fn stray_line_is_rejected() {
    let err = parse_document("rectangle:\n- id x=x\nthis is prose\n").unwrap_err();
    assert!(matches!(err, DslError::UnexpectedLine { line: 3, .. }));
}

#[test]
fn header_must_start_with_id() {
    let err = parse_document("rectangle:\n- x=x id\n").unwrap_err();
    assert!(matches!(err, DslError::InvalidHeader { line: 2, .. }));
}

#[test]
fn unsupported_version_is_rejected() {
    let err = parse_document("version: 9\n").unwrap_err();
    assert!(matches!(err, DslError::UnsupportedVersion(9)));
}

#[test]
fn bad_declarations_are_rejected() {
    assert!(matches!(
        parse_document("shape: blob\n").unwrap_err(),
        DslError::InvalidDeclaration { name: "shape", .. }
    ));
    assert!(matches!(
        parse_document("meta: {oops\n").unwrap_err(),
        DslError::InvalidDeclaration { name: "meta", .. }
    ));
    assert!(matches!(
        parse_document("version:\n").unwrap_err(),
        DslError::InvalidDeclaration { name: "version", .. }
    ));
}

#[test]
fn common_entry_needs_key_value() {
    let err = parse_document("common:\n- strokeColor\n").unwrap_err();
    assert!(matches!(err, DslError::InvalidToken { line: 2, .. }));
}

#[test]
fn bad_value_names_the_field() {
    let err = parse_document("arrow:\n- id p=points\n- 1 p=[[0,0]\n").unwrap_err();
    assert!(matches!(err, DslError::InvalidValue { ref field, .. } if field == "points"), "{err}");
}

#[test]
fn crlf_and_indentation_are_tolerated() {
    let doc = parse_document("  rectangle:\r\n   - id x=x\r\n   - 1 x=2\r\n").unwrap();
    assert_eq!(doc.rows[0].fields, vec![("x".into(), num(2))]);
}
