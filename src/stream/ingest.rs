//! Watermarked ingestion of element records from a growing text buffer.
//!
//! DESIGN
//! ======
//! `ingest` is a pure function of `(buffer, consumed, options)`. It only looks
//! at `buffer[consumed..]`, handles every complete span found there, and
//! returns the offset just past the last handled span. Text after that offset
//! (an object still arriving, trailing prose) is returned untouched for the
//! next call, so each byte range is attributed to exactly one call.

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value};

use super::RecordError;
use super::defaults::fill_defaults;
use super::extract::extract_complete_objects;
use crate::element::{Element, RECOGNIZED_TYPES};
use crate::error::ErrorCode;
use crate::normalize::Normalizer;

#[cfg(test)]
#[path = "ingest_test.rs"]
mod tests;

/// Per-call ingestion settings.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOptions {
    /// `updated` stamp for records that do not carry one, in epoch milliseconds.
    pub updated_at: i64,
    /// Applied to each call's batch (to the whole stream so far under
    /// [`super::StreamIngestor`]); `None` returns records with defaults only.
    pub normalizer: Option<Normalizer>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self::new(Normalizer::default())
    }
}

impl IngestOptions {
    #[must_use]
    pub fn new(normalizer: Normalizer) -> Self {
        Self { updated_at: now_ms(), normalizer: Some(normalizer) }
    }

    /// Defaults only, fixed timestamp.
    #[must_use]
    pub fn raw(updated_at: i64) -> Self {
        Self { updated_at, normalizer: None }
    }
}

/// Current time as milliseconds since Unix epoch.
fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

/// A span that did not become an element. Offsets are absolute buffer offsets.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseFailure {
    pub raw: String,
    pub error: RecordError,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestResult {
    pub elements: Vec<Element>,
    /// New consumed offset; pass it back on the next call.
    pub watermark: usize,
    /// `buffer[watermark..]`.
    pub remaining: String,
    pub errors: Vec<ParseFailure>,
    /// Elements emitted by earlier calls that this batch changed (new
    /// back-links). Only filled by [`super::StreamIngestor`].
    pub updated: Vec<Element>,
}

/// Ingest every complete record in `buffer[consumed..]`.
///
/// A `consumed` offset past the end of the buffer or inside a UTF-8 sequence
/// yields an empty result with the watermark unchanged.
#[must_use]
pub fn ingest(buffer: &str, consumed: usize, options: &IngestOptions) -> IngestResult {
    let mut result = ingest_records(buffer, consumed, options.updated_at);
    if let Some(normalizer) = &options.normalizer {
        result.elements = normalizer.normalize(std::mem::take(&mut result.elements));
    }
    result
}

/// [`ingest`] without normalization.
pub(super) fn ingest_records(buffer: &str, consumed: usize, updated_at: i64) -> IngestResult {
    let Some(pending) = buffer.get(consumed..) else {
        tracing::warn!(consumed, len = buffer.len(), "ingest: watermark outside buffer");
        return IngestResult { watermark: consumed, ..IngestResult::default() };
    };

    let spans = extract_complete_objects(pending);
    let mut elements = Vec::new();
    let mut errors = Vec::new();
    let mut watermark = consumed;

    for span in &spans {
        let (start, end) = (consumed + span.start, consumed + span.end);
        watermark = end;

        let parsed = if span.well_formed {
            parse_record(&span.raw, start, updated_at)
        } else {
            Err(RecordError::Malformed)
        };
        match parsed {
            Ok(element) => elements.push(element),
            Err(error) => {
                tracing::debug!(start, end, code = error.error_code(), %error, "ingest: record failed");
                errors.push(ParseFailure { raw: span.raw.clone(), error, start, end });
            }
        }
    }

    tracing::info!(
        spans = spans.len(),
        elements = elements.len(),
        errors = errors.len(),
        watermark,
        "ingest: batch done"
    );
    IngestResult { elements, watermark, remaining: buffer[watermark..].to_owned(), errors, updated: Vec::new() }
}

/// Parse, validate and complete one record. `offset` seeds the ordering key.
///
/// # Errors
///
/// Returns the first [`RecordError`] the record trips over.
pub fn parse_record(raw: &str, offset: usize, updated_at: i64) -> Result<Element, RecordError> {
    let value: Value = serde_json::from_str(raw).map_err(|e| RecordError::Json(e.to_string()))?;
    let Value::Object(record) = value else {
        return Err(RecordError::NotAnObject);
    };
    validate(&record)?;

    let complete = fill_defaults(record, offset, updated_at);
    serde_json::from_value(Value::Object(complete)).map_err(|e| RecordError::InvalidField(e.to_string()))
}

/// Minimal shape: non-empty string id, recognized type, numeric x.
fn validate(record: &Map<String, Value>) -> Result<(), RecordError> {
    if !record.get("id").and_then(Value::as_str).is_some_and(|id| !id.is_empty()) {
        return Err(RecordError::MissingId);
    }
    let type_name = record.get("type").and_then(Value::as_str).unwrap_or_default();
    if !RECOGNIZED_TYPES.contains(&type_name) {
        return Err(RecordError::UnknownType(type_name.to_owned()));
    }
    if !record.get("x").is_some_and(Value::is_number) {
        return Err(RecordError::NonNumericX);
    }
    Ok(())
}
