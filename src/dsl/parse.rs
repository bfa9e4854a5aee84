//! DSL text → parsed document.
//!
//! Line grammar (after trimming):
//!
//! - blank or `#...` lines are ignored
//! - `version: N`, `shape: array|object`, `meta: {json}` are declarations
//! - `- ...` is an entry in the current section
//! - `name:` opens a section (`common`, `textCommon`, or an element type)
//!
//! Anything else is a structural error. Inside an element-type section the
//! first entry is the column header (`id alias=field ...`); later entries are
//! rows. Row tokens written as `alias=value` are looked up by alias; bare
//! tokens are matched to header columns by position.

use std::collections::HashMap;

use serde_json::{Map, Value};

use super::serialize::{Column, ID_COLUMN};
use super::value::{FieldValue, MARKER, parse_field_token, split_tokens};
use super::{DSL_VERSION, DocumentShape, DslError};

/// One element row, with values still holding unresolved short-id references.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow {
    pub line: usize,
    pub short: String,
    pub kind: String,
    pub fields: Vec<(String, FieldValue)>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDocument {
    pub version: Option<u32>,
    pub shape: Option<DocumentShape>,
    pub meta: Option<Map<String, Value>>,
    pub common: Vec<(String, FieldValue)>,
    pub text_common: Vec<(String, FieldValue)>,
    pub rows: Vec<ParsedRow>,
}

enum Section {
    Common,
    TextCommon,
    Elements(String),
}

/// Parse DSL text.
///
/// # Errors
///
/// Returns a [`DslError`] naming the first offending line.
pub fn parse_document(text: &str) -> Result<ParsedDocument, DslError> {
    let mut doc = ParsedDocument::default();
    let mut section: Option<Section> = None;
    let mut headers: HashMap<String, Vec<Column>> = HashMap::new();

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if let Some(payload) = trimmed.strip_prefix("- ") {
            let payload = payload.trim();
            match &section {
                None => return Err(DslError::EntryOutsideSection { line }),
                Some(Section::Common) => doc.common.push(parse_pair(line, payload)?),
                Some(Section::TextCommon) => doc.text_common.push(parse_pair(line, payload)?),
                Some(Section::Elements(kind)) => match headers.get(kind) {
                    None => {
                        headers.insert(kind.clone(), parse_header(line, payload)?);
                    }
                    Some(columns) => doc.rows.push(parse_row(line, kind, columns, payload)?),
                },
            }
            continue;
        }

        if apply_declaration(&mut doc, line, trimmed)? {
            section = None;
            continue;
        }

        if let Some(name) = trimmed.strip_suffix(':') {
            section = Some(match name {
                "common" => Section::Common,
                "textCommon" => Section::TextCommon,
                kind if is_section_name(kind) => Section::Elements(kind.to_owned()),
                _ => return Err(DslError::UnexpectedLine { line, content: trimmed.to_owned() }),
            });
            continue;
        }

        return Err(DslError::UnexpectedLine { line, content: trimmed.to_owned() });
    }

    Ok(doc)
}

fn is_section_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Handle `version`/`shape`/`meta` lines. Returns `false` for any other line.
fn apply_declaration(doc: &mut ParsedDocument, line: usize, trimmed: &str) -> Result<bool, DslError> {
    for name in ["version", "shape", "meta"] {
        let Some(rest) = trimmed.strip_prefix(name) else { continue };
        let rest = rest.trim_start();
        let Some(payload) = rest.strip_prefix(':').or_else(|| rest.strip_prefix('=')) else {
            continue;
        };
        let payload = payload.trim();
        let invalid = |reason: String| DslError::InvalidDeclaration { line, name, reason };
        if payload.is_empty() {
            return Err(invalid("missing value".to_owned()));
        }
        match name {
            "version" => {
                let version: u32 = payload.parse().map_err(|_| invalid(format!("`{payload}` is not a number")))?;
                if version != DSL_VERSION {
                    return Err(DslError::UnsupportedVersion(version));
                }
                doc.version = Some(version);
            }
            "shape" => {
                let shape = DocumentShape::parse(payload)
                    .ok_or_else(|| invalid(format!("`{payload}` is not `object` or `array`")))?;
                doc.shape = Some(shape);
            }
            _ => {
                let meta: Map<String, Value> =
                    serde_json::from_str(payload).map_err(|e| invalid(e.to_string()))?;
                doc.meta = Some(meta);
            }
        }
        return Ok(true);
    }
    Ok(false)
}

/// `key=value` entry of a common table.
fn parse_pair(line: usize, payload: &str) -> Result<(String, FieldValue), DslError> {
    let (key, raw) = payload
        .split_once('=')
        .ok_or_else(|| DslError::InvalidToken { line, token: payload.to_owned() })?;
    let key = key.trim();
    if key.is_empty() || key == ID_COLUMN || key == "type" {
        return Err(DslError::InvalidToken { line, token: payload.to_owned() });
    }
    let value = parse_field_token(key, raw.trim())
        .map_err(|reason| DslError::InvalidValue { line, field: key.to_owned(), reason })?;
    Ok((key.to_owned(), value))
}

fn parse_header(line: usize, payload: &str) -> Result<Vec<Column>, DslError> {
    let tokens = split_tokens(payload);
    let invalid = |reason: String| DslError::InvalidHeader { line, reason };
    match tokens.first() {
        Some(&ID_COLUMN) => {}
        Some(first) => return Err(invalid(format!("first column must be `{ID_COLUMN}`, got `{first}`"))),
        None => return Err(invalid("empty header".to_owned())),
    }

    let mut columns: Vec<Column> = Vec::with_capacity(tokens.len() - 1);
    for token in &tokens[1..] {
        let (alias, field) = token
            .split_once('=')
            .map(|(a, f)| (a.trim(), f.trim()))
            .filter(|(a, f)| !a.is_empty() && !f.is_empty())
            .ok_or_else(|| invalid(format!("column `{token}` is not `alias=field`")))?;
        if alias == ID_COLUMN || columns.iter().any(|c| c.alias == alias || c.field == field) {
            return Err(invalid(format!("column `{token}` repeats an alias or field")));
        }
        columns.push(Column { alias: alias.to_owned(), field: field.to_owned() });
    }
    Ok(columns)
}

fn parse_row(line: usize, kind: &str, columns: &[Column], payload: &str) -> Result<ParsedRow, DslError> {
    let tokens = split_tokens(payload);
    let (first, rest) = tokens.split_first().ok_or(DslError::MissingId { line })?;
    let short = parse_short_id(first).ok_or(DslError::MissingId { line })?;

    let mut fields = Vec::with_capacity(rest.len());
    for (position, token) in rest.iter().enumerate() {
        let (field, raw) = match aliased(token) {
            Some((alias, raw)) => {
                let field = columns
                    .iter()
                    .find(|c| c.alias == alias || c.field == alias)
                    .map_or(alias, |c| c.field.as_str());
                (field, raw)
            }
            None => {
                let column = columns
                    .get(position)
                    .ok_or_else(|| DslError::InvalidToken { line, token: (*token).to_owned() })?;
                (column.field.as_str(), *token)
            }
        };
        if field == ID_COLUMN || field == "type" {
            return Err(DslError::InvalidToken { line, token: (*token).to_owned() });
        }
        let value = parse_field_token(field, raw)
            .map_err(|reason| DslError::InvalidValue { line, field: field.to_owned(), reason })?;
        fields.push((field.to_owned(), value));
    }

    Ok(ParsedRow { line, short, kind: kind.to_owned(), fields })
}

/// Split `alias=value` when the left side looks like an alias.
fn aliased(token: &str) -> Option<(&str, &str)> {
    let (alias, raw) = token.split_once('=')?;
    let plain = !alias.is_empty() && alias.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    plain.then_some((alias, raw))
}

/// Row id token: `3`, `@3`, `id=3`, or a quoted string.
fn parse_short_id(token: &str) -> Option<String> {
    let token = token.strip_prefix("id=").unwrap_or(token);
    let token = token.strip_prefix(MARKER).unwrap_or(token);
    let short = if token.starts_with('"') { serde_json::from_str::<String>(token).ok()? } else { token.to_owned() };
    (!short.is_empty() && !short.contains('=')).then_some(short)
}

#[cfg(test)]
#[path = "parse_test.rs"]
mod tests;
