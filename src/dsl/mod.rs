//! Attribute DSL codec: compress element collections into compact text and back.
//!
//! DESIGN
//! ======
//! Compression is factoring plus indirection. Attributes shared by every
//! element move into a `common:` table, attributes shared by every text
//! element into `textCommon:`, and every reference to another element is
//! rewritten through a per-document [`IdMap`] as a short `@N` token. The
//! remaining per-element payloads are written as rows grouped by type, each
//! group preceded by an `id alias=field ...` column header.
//!
//! Decompression is strict: any line that does not match the grammar aborts
//! the whole pass. The reference table handed in is cloned and only ever
//! extended; unseen short ids get fresh long ids.
//!
//! ```text
//! # drawkit attribute DSL v2
//! version: 2
//!
//! common:
//! - strokeColor=#1e1e1e
//!
//! rectangle:
//! - id x=x y=y w=width h=height
//! - 1 x=0 y=0 w=100 h=60
//! ```

pub mod factor;
pub mod id_map;
pub mod parse;
pub mod serialize;
pub mod value;

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::element::{Element, dangling_references};
use factor::Record;
use id_map::{IdMap, IdMapError};
use value::FieldValue;

/// Current DSL format version.
pub const DSL_VERSION: u32 = 2;

/// Comment line opening every serialized document.
pub const DSL_HEADER: &str = "# drawkit attribute DSL v2";

// =============================================================================
// ERRORS
// =============================================================================

/// Structural codec failure. Aborts the whole compress or decompress pass.
#[derive(Debug, thiserror::Error)]
pub enum DslError {
    #[error("line {line}: unexpected line `{content}`")]
    UnexpectedLine { line: usize, content: String },

    #[error("line {line}: entry appears before any section")]
    EntryOutsideSection { line: usize },

    #[error("line {line}: invalid column header: {reason}")]
    InvalidHeader { line: usize, reason: String },

    #[error("line {line}: invalid token `{token}`")]
    InvalidToken { line: usize, token: String },

    #[error("line {line}: invalid value for {field}: {reason}")]
    InvalidValue { line: usize, field: String, reason: String },

    #[error("line {line}: row has no id")]
    MissingId { line: usize },

    #[error("line {line}: invalid {name} declaration: {reason}")]
    InvalidDeclaration { line: usize, name: &'static str, reason: String },

    #[error("unsupported DSL version {0}")]
    UnsupportedVersion(u32),

    #[error("unknown short id reference @{0}")]
    UnknownReference(String),

    #[error("duplicate element id {0}")]
    DuplicateId(String),

    #[error(transparent)]
    IdMap(#[from] IdMapError),

    #[error("element {id} could not be built: {reason}")]
    InvalidElement { id: String, reason: String },

    #[error("no DSL block found in response")]
    NoDslFound,
}

impl crate::error::ErrorCode for DslError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::UnexpectedLine { .. } => "E_DSL_UNEXPECTED_LINE",
            Self::EntryOutsideSection { .. } => "E_DSL_ENTRY_OUTSIDE_SECTION",
            Self::InvalidHeader { .. } => "E_DSL_INVALID_HEADER",
            Self::InvalidToken { .. } => "E_DSL_INVALID_TOKEN",
            Self::InvalidValue { .. } => "E_DSL_INVALID_VALUE",
            Self::MissingId { .. } => "E_DSL_MISSING_ID",
            Self::InvalidDeclaration { .. } => "E_DSL_INVALID_DECLARATION",
            Self::UnsupportedVersion(_) => "E_DSL_UNSUPPORTED_VERSION",
            Self::UnknownReference(_) => "E_DSL_UNKNOWN_REFERENCE",
            Self::DuplicateId(_) => "E_DSL_DUPLICATE_ID",
            Self::IdMap(inner) => inner.error_code(),
            Self::InvalidElement { .. } => "E_DSL_INVALID_ELEMENT",
            Self::NoDslFound => "E_DSL_NOT_FOUND",
        }
    }
}

// =============================================================================
// DOCUMENT TYPES
// =============================================================================

/// Whether the canonical collection was a bare array or a wrapping object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentShape {
    #[default]
    Object,
    Array,
}

impl DocumentShape {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Array => "array",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "object" => Some(Self::Object),
            "array" => Some(Self::Array),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompressOptions {
    /// Free-form document metadata carried through the text form.
    pub meta: Map<String, Value>,
    pub shape: DocumentShape,
    /// Drop `updated`/`versionNonce` from per-element payloads.
    pub strip_volatile: bool,
}

/// One element row of a compressed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressedEntry {
    /// Short id.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(deserialize_with = "deserialize_data")]
    pub data: BTreeMap<String, FieldValue>,
}

fn deserialize_data<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeMap<String, FieldValue>, D::Error> {
    let mut data = BTreeMap::<String, FieldValue>::deserialize(deserializer)?;
    if let Some(bound) = data.get_mut(value::BOUND_ELEMENTS_FIELD) {
        bound.compact_bound_list();
    }
    Ok(data)
}

/// Structured form of a compressed document; the text is rendered from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressedDocument {
    pub version: u32,
    #[serde(default)]
    pub shape: DocumentShape,
    #[serde(default)]
    pub meta: Map<String, Value>,
    #[serde(default)]
    pub id_map: IdMap,
    #[serde(default)]
    pub common_attributes: Record,
    #[serde(default)]
    pub text_common: Record,
    #[serde(default)]
    pub elements: Vec<CompressedEntry>,
}

impl Default for CompressedDocument {
    fn default() -> Self {
        Self {
            version: DSL_VERSION,
            shape: DocumentShape::default(),
            meta: Map::new(),
            id_map: IdMap::new(),
            common_attributes: Record::new(),
            text_common: Record::new(),
            elements: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Compressed {
    pub text: String,
    pub document: CompressedDocument,
}

#[derive(Debug, Clone)]
pub struct Decompressed {
    pub elements: Vec<Element>,
    pub meta: Map<String, Value>,
    pub shape: DocumentShape,
    /// The inherited table extended with every newly seen short id.
    pub id_map: IdMap,
}

// =============================================================================
// COMPRESS
// =============================================================================

/// Compress an element collection into DSL text plus its structured document.
///
/// Short ids are `1..=n` in input order. Elements with an empty id are given
/// `element_<n>`.
///
/// # Errors
///
/// Returns [`DslError::DuplicateId`] when two elements share an id.
pub fn compress(elements: &[Element], options: &CompressOptions) -> Result<Compressed, DslError> {
    let mut ids = IdMap::new();
    let mut records: Vec<Record> = Vec::with_capacity(elements.len());

    for (index, element) in elements.iter().enumerate() {
        let short = (index + 1).to_string();
        let long = if element.id.is_empty() { format!("element_{short}") } else { element.id.clone() };
        ids.bind(&short, &long).map_err(|e| match e {
            IdMapError::LongIdTaken { long, .. } => DslError::DuplicateId(long),
            other => DslError::IdMap(other),
        })?;

        let Value::Object(mut record) = value::round_value(
            &serde_json::to_value(element)
                .map_err(|e| DslError::InvalidElement { id: long.clone(), reason: e.to_string() })?,
        ) else {
            return Err(DslError::InvalidElement { id: long, reason: "not an object".to_owned() });
        };
        record.insert("id".to_owned(), Value::String(long));
        records.push(record);
    }

    let all: Vec<&Record> = records.iter().collect();
    let common = factor::common_attributes(&all, &Record::new());
    let texts: Vec<&Record> = records.iter().filter(|r| is_text(r)).collect();
    let text_common = factor::common_attributes(&texts, &common);

    let entries = records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let text_scope = is_text(record).then_some(&text_common);
            let data = factor::strip_record(record, &common, text_scope, options.strip_volatile)
                .iter()
                .map(|(field, v)| (field.clone(), FieldValue::encode(field, v, &ids)))
                .collect();
            CompressedEntry { id: (index + 1).to_string(), kind: record_type(record).to_owned(), data }
        })
        .collect();

    let document = CompressedDocument {
        version: DSL_VERSION,
        shape: options.shape,
        meta: options.meta.clone(),
        id_map: ids,
        common_attributes: common,
        text_common,
        elements: entries,
    };
    let text = serialize::write_document(&document);

    tracing::info!(
        elements = document.elements.len(),
        common = document.common_attributes.len(),
        text_common = document.text_common.len(),
        bytes = text.len(),
        "dsl: compressed"
    );
    Ok(Compressed { text, document })
}

fn record_type(record: &Record) -> &str {
    record.get("type").and_then(Value::as_str).unwrap_or_default()
}

fn is_text(record: &Record) -> bool {
    record_type(record) == "text"
}

// =============================================================================
// DECOMPRESS
// =============================================================================

/// Parse DSL text back into elements, resolving short ids through `reference`.
///
/// `common`/`textCommon` come from the text. `meta`/`shape` come from the text
/// when declared there and from `reference` otherwise. Elements are returned
/// in reference-table order, so known ids keep their original positions and
/// new ids follow in textual order.
///
/// # Errors
///
/// Any structural problem in the text, an unresolvable reference, a repeated
/// short id, or a row that does not form a valid element.
pub fn decompress(text: &str, reference: &CompressedDocument) -> Result<Decompressed, DslError> {
    let parsed = parse::parse_document(text)?;
    let mut ids = reference.id_map.clone();

    let mut seen = HashSet::new();
    let mut fresh = 0usize;
    for row in &parsed.rows {
        if !seen.insert(row.short.as_str()) {
            return Err(DslError::DuplicateId(row.short.clone()));
        }
        if ids.ensure(&row.short).1 {
            fresh += 1;
        }
    }

    let common = resolve_fields(parsed.common, &ids)?;
    let text_common = resolve_fields(parsed.text_common, &ids)?;

    let mut elements = Vec::with_capacity(parsed.rows.len());
    for row in parsed.rows {
        let long = ids.long_id(&row.short).map(str::to_owned).unwrap_or_default();
        let text_scope = (row.kind == "text").then_some(&text_common);
        let mut record = factor::merge_record(&common, text_scope, resolve_fields(row.fields, &ids)?);
        record.insert("id".to_owned(), Value::String(long.clone()));
        record.insert("type".to_owned(), Value::String(row.kind));
        let element: Element = serde_json::from_value(Value::Object(record))
            .map_err(|e| DslError::InvalidElement { id: long, reason: e.to_string() })?;
        elements.push((ids.position(&row.short).unwrap_or(usize::MAX), element));
    }
    elements.sort_by_key(|(position, _)| *position);
    let elements: Vec<Element> = elements.into_iter().map(|(_, element)| element).collect();

    for dangling in dangling_references(&elements) {
        tracing::warn!(
            element = %dangling.element_id,
            field = dangling.field,
            target = %dangling.target,
            "dsl: dangling reference after decompress"
        );
    }
    tracing::info!(elements = elements.len(), new_ids = fresh, "dsl: decompressed");

    Ok(Decompressed {
        elements,
        meta: parsed.meta.unwrap_or_else(|| reference.meta.clone()),
        shape: parsed.shape.unwrap_or(reference.shape),
        id_map: ids,
    })
}

fn resolve_fields(fields: Vec<(String, FieldValue)>, ids: &IdMap) -> Result<Record, DslError> {
    fields
        .into_iter()
        .map(|(field, value)| value.resolve(ids).map(|v| (field, v)))
        .collect()
}

// =============================================================================
// MODEL REPLIES
// =============================================================================

/// Pull the DSL block out of a model reply.
///
/// Accepts a fenced block tagged `dsl` or `text` (or untagged), or a reply
/// whose first non-blank line is [`DSL_HEADER`].
///
/// # Errors
///
/// Returns [`DslError::NoDslFound`] when neither form is present.
pub fn extract_dsl(response: &str) -> Result<String, DslError> {
    let trimmed = response.trim();
    if trimmed.starts_with(DSL_HEADER) {
        return Ok(trimmed.to_owned());
    }

    let mut rest = trimmed;
    while let Some(open) = rest.find("```") {
        let after = &rest[open + 3..];
        let Some(newline) = after.find('\n') else { break };
        let tag = after[..newline].trim();
        let body = &after[newline + 1..];
        let Some(close) = body.find("```") else { break };
        if matches!(tag, "" | "dsl" | "text") {
            let block = body[..close].trim();
            if !block.is_empty() {
                return Ok(block.to_owned());
            }
        }
        rest = &body[close + 3..];
    }
    Err(DslError::NoDslFound)
}

/// [`extract_dsl`] for input that may already be bare DSL: a reply with no
/// header and no fenced block is returned trimmed as-is.
#[must_use]
pub fn extract_dsl_or_raw(input: &str) -> String {
    extract_dsl(input).unwrap_or_else(|_| {
        tracing::debug!(len = input.len(), "dsl: no header or fence, using input as-is");
        input.trim().to_owned()
    })
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
