//! Default attribute sets for generated element records.
//!
//! Generated records carry only what the model bothered to write. Everything
//! else is filled here so each record becomes a complete element. Defaults
//! are pure functions of the record, its buffer offset and the caller's
//! timestamp, so re-ingesting the same text yields the same elements.
//!
//! Stroke color is not defaulted here: the normalizer resolves it from the
//! palette, the container, a bound shape or the theme.

use serde_json::{Map, Value, json};

use crate::element::estimate_text_size;

#[cfg(test)]
#[path = "defaults_test.rs"]
mod tests;

type Record = Map<String, Value>;

const DEFAULT_FONT_SIZE: f64 = 20.0;
const DEFAULT_LINE_HEIGHT: f64 = 1.25;
const DEFAULT_CONNECTOR_WIDTH: f64 = 100.0;

const BASE62: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Merge defaults under `record` (record fields win) and assign an ordering
/// key from `offset` when the record has none.
#[must_use]
pub fn fill_defaults(record: Record, offset: usize, updated_at: i64) -> Record {
    let id = record.get("id").and_then(Value::as_str).unwrap_or_default();
    let type_name = record.get("type").and_then(Value::as_str).unwrap_or_default();

    let mut merged = base_defaults(id, updated_at);
    merged.extend(type_defaults(type_name, &record));
    merged.extend(record);

    let has_index = merged.get("index").and_then(Value::as_str).is_some_and(|s| !s.is_empty());
    if !has_index {
        merged.insert("index".into(), Value::String(ordering_key(offset)));
    }
    merged
}

fn base_defaults(id: &str, updated_at: i64) -> Record {
    let hash = fnv1a(id);
    object(json!({
        "angle": 0,
        "backgroundColor": "transparent",
        "fillStyle": "solid",
        "strokeWidth": 2,
        "roughness": 1,
        "opacity": 100,
        "seed": hash % 100_000,
        "version": 1,
        "versionNonce": (hash >> 17) % 1_000_000_000,
        "isDeleted": false,
        "groupIds": [],
        "boundElements": null,
        "updated": updated_at,
        "link": null,
        "locked": false,
    }))
}

fn type_defaults(type_name: &str, record: &Record) -> Record {
    let number = |key: &str| record.get(key).and_then(Value::as_f64);
    match type_name {
        "text" => {
            let text = record.get("text").and_then(Value::as_str).unwrap_or_default();
            let font_size = number("fontSize").unwrap_or(DEFAULT_FONT_SIZE);
            let line_height = number("lineHeight").unwrap_or(DEFAULT_LINE_HEIGHT);
            let (width, height) = estimate_text_size(text, font_size, line_height);
            object(json!({
                "width": width,
                "height": height,
                "fontSize": DEFAULT_FONT_SIZE,
                "fontFamily": 1,
                "textAlign": "center",
                "verticalAlign": "middle",
                "baseline": 18,
                "containerId": null,
                "originalText": text,
                "lineHeight": DEFAULT_LINE_HEIGHT,
            }))
        }
        "arrow" | "line" => {
            let width = number("width").filter(|w| w.abs() > f64::EPSILON).unwrap_or(DEFAULT_CONNECTOR_WIDTH);
            let height = number("height").unwrap_or(0.0);
            let end_arrowhead = if type_name == "arrow" { json!("arrow") } else { Value::Null };
            object(json!({
                "points": [[0, 0], [width, height]],
                "lastCommittedPoint": null,
                "startBinding": null,
                "endBinding": null,
                "startArrowhead": null,
                "endArrowhead": end_arrowhead,
            }))
        }
        _ => object(json!({ "roundness": { "type": 3 } })),
    }
}

/// Fractional-index key for a buffer offset.
///
/// The head character encodes the digit count (`a` = 1, `b` = 2, ...) and the
/// digits are base62 in ASCII order, so keys sort the same way offsets do.
#[must_use]
pub fn ordering_key(offset: usize) -> String {
    let mut digits = Vec::new();
    let mut rest = offset;
    loop {
        digits.push(BASE62[rest % 62]);
        rest /= 62;
        if rest == 0 {
            break;
        }
    }
    digits.reverse();

    let head = b'a' + u8::try_from(digits.len() - 1).unwrap_or(0);
    let mut key = String::with_capacity(digits.len() + 1);
    key.push(char::from(head));
    key.extend(digits.into_iter().map(char::from));
    key
}

/// 64-bit FNV-1a.
fn fnv1a(text: &str) -> u64 {
    text.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3))
}

fn object(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}
