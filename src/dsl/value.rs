//! DSL values: typed field payloads, tokenization, and token formatting.
//!
//! DESIGN
//! ======
//! On the wire a reference is a marker-prefixed short id (`@3`). Inside the
//! codec it is an [`ElementRef`], decoded immediately after tokenizing so no
//! sentinel strings leak into business logic. Literal strings that happen to
//! start with the marker are escaped by doubling it (`@@handle`).
//!
//! Top-level tokens are bare where unambiguous and JSON-quoted otherwise;
//! nested values (objects, lists) are JSON with references written as
//! `"@3"` strings.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};

use super::DslError;
use super::id_map::IdMap;

/// Prefix marking a short-id reference on the wire.
pub const MARKER: char = '@';

/// Decimal places kept for floating-point values.
pub const DECIMAL_PLACES: i32 = 3;

/// Field whose list of `{id, type}` pairs has a compact wire form.
pub const BOUND_ELEMENTS_FIELD: &str = "boundElements";

/// Field that accepts a bare short id without the marker.
pub const CONTAINER_FIELD: &str = "containerId";

// =============================================================================
// TYPES
// =============================================================================

/// A reference to another element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementRef {
    /// Short id as written in the DSL, not yet resolved.
    Short(String),
    /// Resolved long id.
    Long(String),
}

/// One `type-shortid` entry of a compact bound-elements list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundToken {
    pub kind: String,
    pub target: ElementRef,
}

/// A field value inside the compressed form.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(Number),
    Text(String),
    Ref(ElementRef),
    List(Vec<FieldValue>),
    Object(Vec<(String, FieldValue)>),
    Bound(Vec<BoundToken>),
}

// =============================================================================
// ENCODING (canonical JSON → FieldValue)
// =============================================================================

impl FieldValue {
    /// Convert without reference detection. Numbers are rounded.
    #[must_use]
    pub fn plain(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => Self::Number(round_number(n)),
            Value::String(s) => Self::Text(s.clone()),
            Value::Array(items) => Self::List(items.iter().map(Self::plain).collect()),
            Value::Object(map) => Self::Object(map.iter().map(|(k, v)| (k.clone(), Self::plain(v))).collect()),
        }
    }

    /// Convert a field value, rewriting any string equal to a known long id
    /// into a short-id reference.
    #[must_use]
    pub fn encode(field: &str, value: &Value, ids: &IdMap) -> Self {
        if field == BOUND_ELEMENTS_FIELD {
            if let Some(tokens) = compact_bound(value, ids) {
                return Self::Bound(tokens);
            }
        }
        Self::encode_value(value, ids)
    }

    fn encode_value(value: &Value, ids: &IdMap) -> Self {
        match value {
            Value::String(s) => match ids.short_id(s) {
                Some(short) => Self::Ref(ElementRef::Short(short.to_owned())),
                None => Self::Text(s.clone()),
            },
            Value::Array(items) => Self::List(items.iter().map(|v| Self::encode_value(v, ids)).collect()),
            Value::Object(map) => {
                Self::Object(map.iter().map(|(k, v)| (k.clone(), Self::encode_value(v, ids))).collect())
            }
            other => Self::plain(other),
        }
    }
}

/// `[{id, type}, ...]` with every id known → compact tokens; anything else → `None`.
fn compact_bound(value: &Value, ids: &IdMap) -> Option<Vec<BoundToken>> {
    let items = value.as_array()?;
    items
        .iter()
        .map(|item| {
            let obj = item.as_object()?;
            if obj.len() != 2 {
                return None;
            }
            let kind = obj.get("type")?.as_str()?;
            let short = ids.short_id(obj.get("id")?.as_str()?)?;
            let plain_kind = !kind.is_empty() && kind.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            plain_kind.then(|| BoundToken { kind: kind.to_owned(), target: ElementRef::Short(short.to_owned()) })
        })
        .collect()
}

/// Largest magnitude at which every integer is exactly representable as `f64`.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Round floats to [`DECIMAL_PLACES`]; integral results collapse to integers.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn round_number(n: &Number) -> Number {
    match n.as_f64() {
        Some(f) if n.is_f64() => {
            let scale = 10f64.powi(DECIMAL_PLACES);
            let rounded = (f * scale).round() / scale;
            if rounded.fract() == 0.0 && rounded.abs() <= MAX_SAFE_INTEGER {
                return Number::from(rounded as i64);
            }
            Number::from_f64(rounded).unwrap_or_else(|| n.clone())
        }
        _ => n.clone(),
    }
}

/// Round every number in a JSON value.
#[must_use]
pub fn round_value(value: &Value) -> Value {
    match value {
        Value::Number(n) => Value::Number(round_number(n)),
        Value::Array(items) => Value::Array(items.iter().map(round_value).collect()),
        Value::Object(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), round_value(v))).collect()),
        other => other.clone(),
    }
}

// =============================================================================
// DECODING (FieldValue → canonical JSON)
// =============================================================================

impl FieldValue {
    /// Resolve references through `ids` and produce canonical JSON.
    ///
    /// # Errors
    ///
    /// Returns [`DslError::UnknownReference`] for a short id missing from `ids`.
    pub fn resolve(self, ids: &IdMap) -> Result<Value, DslError> {
        Ok(match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(b),
            Self::Number(n) => Value::Number(n),
            Self::Text(s) => Value::String(s),
            Self::Ref(target) => Value::String(resolve_ref(target, ids)?),
            Self::List(items) => Value::Array(items.into_iter().map(|v| v.resolve(ids)).collect::<Result<_, _>>()?),
            Self::Object(fields) => Value::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| v.resolve(ids).map(|v| (k, v)))
                    .collect::<Result<Map<_, _>, _>>()?,
            ),
            Self::Bound(tokens) => Value::Array(
                tokens
                    .into_iter()
                    .map(|token| {
                        let id = resolve_ref(token.target, ids)?;
                        Ok(serde_json::json!({ "id": id, "type": token.kind }))
                    })
                    .collect::<Result<_, DslError>>()?,
            ),
        })
    }
}

fn resolve_ref(target: ElementRef, ids: &IdMap) -> Result<String, DslError> {
    match target {
        ElementRef::Long(long) => Ok(long),
        ElementRef::Short(short) => ids
            .long_id(&short)
            .map(str::to_owned)
            .ok_or(DslError::UnknownReference(short)),
    }
}

// =============================================================================
// WIRE JSON (nested values)
// =============================================================================

impl FieldValue {
    fn to_wire_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(n.clone()),
            Self::Text(s) | Self::Ref(ElementRef::Long(s)) => Value::String(escape_marker(s)),
            Self::Ref(ElementRef::Short(short)) => Value::String(format!("{MARKER}{short}")),
            Self::List(items) => Value::Array(items.iter().map(Self::to_wire_json).collect()),
            Self::Object(fields) => Value::Object(fields.iter().map(|(k, v)| (k.clone(), v.to_wire_json())).collect()),
            Self::Bound(tokens) => Value::Array(
                tokens
                    .iter()
                    .map(|t| {
                        let target = Self::Ref(t.target.clone()).to_wire_json();
                        serde_json::json!({ "id": target, "type": t.kind })
                    })
                    .collect(),
            ),
        }
    }

    fn from_wire_json(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n),
            Value::String(s) => wire_string(s),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from_wire_json).collect()),
            Value::Object(map) => Self::Object(map.into_iter().map(|(k, v)| (k, Self::from_wire_json(v))).collect()),
        }
    }
}

fn escape_marker(s: &str) -> String {
    if s.starts_with(MARKER) { format!("{MARKER}{s}") } else { s.to_owned() }
}

/// Interpret a decoded wire string: `@@x` is the literal `@x`, `@x` a reference.
fn wire_string(s: String) -> FieldValue {
    match s.strip_prefix(MARKER) {
        Some(rest) if rest.starts_with(MARKER) => FieldValue::Text(rest.to_owned()),
        Some(rest) if !rest.is_empty() => FieldValue::Ref(ElementRef::Short(rest.to_owned())),
        _ => FieldValue::Text(s),
    }
}

impl FieldValue {
    /// Turn a `[{"id": "@3", "type": "text"}]` list read back from wire JSON
    /// into the compact form, leaving anything else untouched.
    pub fn compact_bound_list(&mut self) {
        let Self::List(items) = self else { return };
        let tokens: Option<Vec<BoundToken>> = items
            .iter()
            .map(|item| {
                let Self::Object(fields) = item else { return None };
                if fields.len() != 2 {
                    return None;
                }
                let target = fields.iter().find_map(|(k, v)| match (k.as_str(), v) {
                    ("id", Self::Ref(target)) => Some(target.clone()),
                    _ => None,
                })?;
                let kind = fields.iter().find_map(|(k, v)| match (k.as_str(), v) {
                    ("type", Self::Text(kind)) => Some(kind.clone()),
                    _ => None,
                })?;
                Some(BoundToken { kind, target })
            })
            .collect();
        if let Some(tokens) = tokens {
            *self = Self::Bound(tokens);
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_wire_json)
    }
}

// =============================================================================
// TOKEN FORMATTING
// =============================================================================

impl FieldValue {
    /// Render as a single whitespace-free (or quoted) token.
    #[must_use]
    pub fn to_token(&self) -> String {
        match self {
            Self::Null => "null".to_owned(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => n.to_string(),
            Self::Text(s) | Self::Ref(ElementRef::Long(s)) => format_text(s),
            Self::Ref(ElementRef::Short(short)) => format!("{MARKER}{short}"),
            Self::List(_) | Self::Object(_) => serde_json::to_string(&self.to_wire_json()).unwrap_or_default(),
            Self::Bound(tokens) => {
                let inner: Vec<String> = tokens
                    .iter()
                    .map(|t| match &t.target {
                        ElementRef::Short(id) | ElementRef::Long(id) => format!("{}-{id}", t.kind),
                    })
                    .collect();
                format!("[{}]", inner.join(", "))
            }
        }
    }

    /// Render a value for a specific column, applying field-specific rules.
    #[must_use]
    pub fn to_field_token(&self, field: &str) -> String {
        match self {
            // A literal container id must not read back as a bare short id.
            Self::Text(s) if field == CONTAINER_FIELD => quote(&escape_marker(s)),
            other => other.to_token(),
        }
    }
}

fn format_text(s: &str) -> String {
    if needs_quotes(s) { quote(&escape_marker(s)) } else { s.to_owned() }
}

fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\""))
}

fn needs_quotes(s: &str) -> bool {
    s.is_empty()
        || s.starts_with(MARKER)
        || matches!(s, "null" | "true" | "false")
        || serde_json::from_str::<Number>(s).is_ok()
        || s.chars().any(|c| c.is_whitespace() || c.is_control() || matches!(c, '"' | '\\' | '{' | '}' | '[' | ']'))
}

// =============================================================================
// TOKEN PARSING
// =============================================================================

/// Parse a generic value token.
///
/// # Errors
///
/// Returns a human-readable reason when a quoted or nested token is not valid JSON.
pub fn parse_token(raw: &str) -> Result<FieldValue, String> {
    match raw {
        "null" => return Ok(FieldValue::Null),
        "true" => return Ok(FieldValue::Bool(true)),
        "false" => return Ok(FieldValue::Bool(false)),
        _ => {}
    }
    if raw.starts_with('"') {
        return serde_json::from_str::<String>(raw)
            .map(wire_string)
            .map_err(|e| e.to_string());
    }
    if raw.starts_with('{') || raw.starts_with('[') {
        return serde_json::from_str::<Value>(raw)
            .map(FieldValue::from_wire_json)
            .map_err(|e| e.to_string());
    }
    if let Some(short) = raw.strip_prefix(MARKER) {
        if short.is_empty() {
            return Err("empty reference".to_owned());
        }
        return Ok(FieldValue::Ref(ElementRef::Short(short.to_owned())));
    }
    if let Ok(n) = serde_json::from_str::<Number>(raw) {
        return Ok(FieldValue::Number(n));
    }
    Ok(FieldValue::Text(raw.to_owned()))
}

/// Parse a token for a specific column, applying field-specific rules.
///
/// # Errors
///
/// Returns a human-readable reason when the token is malformed.
pub fn parse_field_token(field: &str, raw: &str) -> Result<FieldValue, String> {
    match field {
        BOUND_ELEMENTS_FIELD if raw != "null" => parse_bound(raw),
        CONTAINER_FIELD if is_bare_identifier(raw) => Ok(FieldValue::Ref(ElementRef::Short(raw.to_owned()))),
        _ => parse_token(raw),
    }
}

fn is_bare_identifier(raw: &str) -> bool {
    raw != "null"
        && !raw.is_empty()
        && raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Parse `[text-3, arrow-4]`; JSON lists fall through to [`parse_token`].
fn parse_bound(raw: &str) -> Result<FieldValue, String> {
    let inner = raw
        .strip_prefix('[')
        .and_then(|r| r.strip_suffix(']'))
        .ok_or_else(|| format!("expected a bracketed list, got `{raw}`"))?
        .trim();
    if inner.is_empty() {
        return Ok(FieldValue::Bound(Vec::new()));
    }
    if inner.starts_with('{') || inner.starts_with('"') {
        return parse_token(raw);
    }
    inner
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (kind, id) = entry
                .split_once('-')
                .ok_or_else(|| format!("bound entry `{entry}` is not `type-id`"))?;
            let id = id.strip_prefix(MARKER).unwrap_or(id);
            if kind.is_empty() || id.is_empty() || id == "null" {
                return Err(format!("bound entry `{entry}` has no id"));
            }
            Ok(BoundToken { kind: kind.to_owned(), target: ElementRef::Short(id.to_owned()) })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(FieldValue::Bound)
}

/// Split on whitespace, keeping quoted strings and bracketed/braced groups intact.
#[must_use]
pub fn split_tokens(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;
    let mut in_quotes = false;
    let mut escaped = false;
    let mut depth = 0usize;

    for (i, c) in text.char_indices() {
        if in_quotes {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_quotes = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_quotes = true;
                start.get_or_insert(i);
            }
            '{' | '[' => {
                depth += 1;
                start.get_or_insert(i);
            }
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                start.get_or_insert(i);
            }
            c if c.is_whitespace() && depth == 0 => {
                if let Some(s) = start.take() {
                    tokens.push(&text[s..i]);
                }
            }
            _ => {
                start.get_or_insert(i);
            }
        }
    }
    if let Some(s) = start {
        tokens.push(&text[s..]);
    }
    tokens
}

#[cfg(test)]
#[path = "value_test.rs"]
mod tests;
