//! Document → DSL text.
//!
//! Column order is a fixed field priority followed by everything else
//! alphabetically; aliases prefer a curated short name, then the first two
//! characters of the field, then a numbered suffix. Both are pure functions of
//! the fields present, so headers stay stable across edits.

use std::collections::{BTreeSet, HashSet};
use std::fmt::Write as _;

use super::value::FieldValue;
use super::{CompressedDocument, DSL_HEADER, DocumentShape};

/// Column priority. Fields not listed sort after these, alphabetically.
pub const FIELD_ORDER: [&str; 26] = [
    "x",
    "y",
    "width",
    "height",
    "index",
    "roundness",
    "seed",
    "version",
    "text",
    "containerId",
    "points",
    "startBinding",
    "endBinding",
    "label",
    "labelStyleRef",
    "boundElements",
    "fontSize",
    "fontFamily",
    "textAlign",
    "verticalAlign",
    "autoResize",
    "lineHeight",
    "elbowed",
    "endArrowhead",
    "lastCommittedPoint",
    "startArrowhead",
];

const FIELD_ALIAS: [(&str, &str); 26] = [
    ("x", "x"),
    ("y", "y"),
    ("width", "w"),
    ("height", "h"),
    ("index", "i"),
    ("roundness", "r"),
    ("seed", "s"),
    ("version", "v"),
    ("text", "t"),
    ("containerId", "c"),
    ("points", "p"),
    ("startBinding", "b"),
    ("endBinding", "e"),
    ("boundElements", "be"),
    ("fontSize", "fs"),
    ("fontFamily", "ff"),
    ("textAlign", "ta"),
    ("verticalAlign", "va"),
    ("autoResize", "ar"),
    ("lineHeight", "lh"),
    ("label", "lb"),
    ("labelStyleRef", "ls"),
    ("elbowed", "el"),
    ("endArrowhead", "ea"),
    ("lastCommittedPoint", "lcp"),
    ("startArrowhead", "sa"),
];

/// Literal name of the first column in every header.
pub const ID_COLUMN: &str = "id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub alias: String,
    pub field: String,
}

/// Curated alias for a known field.
#[must_use]
pub fn preferred_alias(field: &str) -> Option<&'static str> {
    FIELD_ALIAS.iter().find(|(f, _)| *f == field).map(|(_, alias)| *alias)
}

fn priority(field: &str) -> usize {
    FIELD_ORDER.iter().position(|f| *f == field).unwrap_or(FIELD_ORDER.len())
}

/// Ordered, uniquely-aliased columns for the given fields (id column excluded).
#[must_use]
pub fn columns<'a>(fields: impl IntoIterator<Item = &'a str>) -> Vec<Column> {
    let unique: BTreeSet<&str> = fields.into_iter().collect();
    let mut ordered: Vec<&str> = unique.into_iter().collect();
    ordered.sort_by_key(|field| (priority(field), *field));

    let mut used: HashSet<String> = HashSet::from([ID_COLUMN.to_owned()]);
    ordered
        .into_iter()
        .map(|field| {
            let alias = alias_for(field, &used);
            used.insert(alias.clone());
            Column { alias, field: field.to_owned() }
        })
        .collect()
}

fn alias_for(field: &str, used: &HashSet<String>) -> String {
    if let Some(alias) = preferred_alias(field).filter(|a| !used.contains(*a)) {
        return alias.to_owned();
    }
    let base: String = field.chars().take(2).collect();
    if !base.is_empty() && !used.contains(&base) {
        return base;
    }
    (2..)
        .map(|n| format!("{base}{n}"))
        .find(|candidate| !used.contains(candidate))
        .unwrap_or(base)
}

/// Render a compressed document as DSL text.
#[must_use]
pub fn write_document(doc: &CompressedDocument) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{DSL_HEADER}");
    let _ = writeln!(out, "version: {}", doc.version);
    if doc.shape != DocumentShape::Object {
        let _ = writeln!(out, "shape: {}", doc.shape.as_str());
    }
    if !doc.meta.is_empty() {
        let meta = super::value::round_value(&serde_json::Value::Object(doc.meta.clone()));
        let _ = writeln!(out, "meta: {meta}");
    }

    for (name, table) in [("common", &doc.common_attributes), ("textCommon", &doc.text_common)] {
        if table.is_empty() {
            continue;
        }
        let _ = writeln!(out, "\n{name}:");
        for (key, value) in table {
            let token = FieldValue::encode(key, value, &doc.id_map).to_field_token(key);
            let _ = writeln!(out, "- {key}={token}");
        }
    }

    let mut type_order: Vec<&str> = Vec::new();
    for entry in &doc.elements {
        if !type_order.contains(&entry.kind.as_str()) {
            type_order.push(&entry.kind);
        }
    }

    for kind in type_order {
        let group: Vec<_> = doc.elements.iter().filter(|e| e.kind == kind).collect();
        let cols = columns(group.iter().flat_map(|e| e.data.keys().map(String::as_str)));

        let _ = writeln!(out, "\n{kind}:");
        let mut header = format!("- {ID_COLUMN}");
        for col in &cols {
            let _ = write!(header, " {}={}", col.alias, col.field);
        }
        let _ = writeln!(out, "{header}");

        for entry in group {
            let mut row = format!("- {}", entry.id);
            for col in &cols {
                if let Some(value) = entry.data.get(&col.field) {
                    let _ = write!(row, " {}={}", col.alias, value.to_field_token(&col.field));
                }
            }
            let _ = writeln!(out, "{row}");
        }
    }
    out
}

#[cfg(test)]
#[path = "serialize_test.rs"]
mod tests;
