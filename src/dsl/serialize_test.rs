use std::collections::BTreeMap;

use serde_json::json;

use super::*;
use crate::dsl::value::ElementRef;
use crate::dsl::{CompressedEntry, factor::Record};

fn aliases(cols: &[Column]) -> Vec<(&str, &str)> {
    cols.iter().map(|c| (c.alias.as_str(), c.field.as_str())).collect()
}

#[test]
fn columns_follow_priority_then_alphabetical() {
    let cols = columns(["strokeColor", "height", "x", "text", "angle", "width"]);
    assert_eq!(
        aliases(&cols),
        vec![("x", "x"), ("w", "width"), ("h", "height"), ("t", "text"), ("an", "angle"), ("st", "strokeColor")]
    );
}

#[test]
fn colliding_aliases_get_numbered_suffixes() {
    let cols = columns(["strokeColor", "strokeStyle", "strokeWidth"]);
    assert_eq!(aliases(&cols), vec![("st", "strokeColor"), ("st2", "strokeStyle"), ("st3", "strokeWidth")]);
}

#[test]
fn id_alias_is_reserved() {
    let cols = columns(["identity"]);
    assert_eq!(aliases(&cols), vec![("id2", "identity")]);
}

#[test]
fn one_character_field_falls_back_to_suffix() {
    let cols = columns(["width", "w"]);
    assert_eq!(aliases(&cols), vec![("w", "width"), ("w2", "w")]);
}

#[test]
fn write_document_layout() {
    let mut ids = crate::dsl::id_map::IdMap::new();
    ids.bind("1", "r").unwrap();
    ids.bind("2", "t").unwrap();

    let mut common = Record::new();
    common.insert("strokeColor".into(), json!("#1e1e1e"));
    let mut text_common = Record::new();
    text_common.insert("fontSize".into(), json!(20));

    let rect = CompressedEntry {
        id: "1".into(),
        kind: "rectangle".into(),
        data: BTreeMap::from([("x".into(), FieldValue::plain(&json!(10))), ("width".into(), FieldValue::plain(&json!(100)))]),
    };
    let text = CompressedEntry {
        id: "2".into(),
        kind: "text".into(),
        data: BTreeMap::from([
            ("text".into(), FieldValue::Text("Hello world".into())),
            ("containerId".into(), FieldValue::Ref(ElementRef::Short("1".into()))),
        ]),
    };
    let doc = CompressedDocument {
        shape: DocumentShape::Array,
        id_map: ids,
        common_attributes: common,
        text_common,
        elements: vec![rect, text],
        ..CompressedDocument::default()
    };

    let expected = "\
# drawkit attribute DSL v2
version: 2
shape: array

common:
- strokeColor=#1e1e1e

textCommon:
- fontSize=20

rectangle:
- id x=x w=width
- 1 x=10 w=100

text:
- id t=text c=containerId
- 2 t=\"Hello world\" c=@1
";
    assert_eq!(write_document(&doc), expected);
}

#[test]
fn absent_fields_are_omitted_from_rows() {
    let a = CompressedEntry {
        id: "1".into(),
        kind: "rectangle".into(),
        data: BTreeMap::from([("x".into(), FieldValue::plain(&json!(1)))]),
    };
    let b = CompressedEntry {
        id: "2".into(),
        kind: "rectangle".into(),
        data: BTreeMap::from([("y".into(), FieldValue::plain(&json!(2)))]),
    };
    let doc = CompressedDocument { elements: vec![a, b], ..CompressedDocument::default() };
    let text = write_document(&doc);
    assert!(text.contains("- id x=x y=y\n- 1 x=1\n- 2 y=2\n"), "{text}");
}
