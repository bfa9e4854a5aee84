//! Streaming ingestion: element records out of partially generated text.
//!
//! DESIGN
//! ======
//! A model streams prose mixed with one JSON object per element. Callers keep
//! appending to a buffer and call [`ingest`] with the last watermark; each
//! call turns complete spans into elements (or per-record errors) and leaves
//! anything still in flight for later. Record errors never abort a batch.
//!
//! [`StreamIngestor`] owns the buffer and watermark for callers that do not
//! want to thread them by hand. It also normalizes each batch against the
//! elements it emitted before, so palette order and auto-binding come out the
//! same however the text was chunked.

pub mod defaults;
pub mod extract;
pub mod ingest;

pub use extract::{Span, extract_complete_objects, has_incomplete_record};
pub use ingest::{IngestOptions, IngestResult, ParseFailure, ingest, parse_record};

use crate::error::ErrorCode;
use crate::normalize::NormalizeContext;

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;

// =============================================================================
// ERRORS
// =============================================================================

/// Why one record span did not become an element. Isolated per record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("record is not well-formed (unbalanced braces or unterminated string)")]
    Malformed,

    #[error("invalid JSON: {0}")]
    Json(String),

    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("record has no id")]
    MissingId,

    #[error("unrecognized element type `{0}`")]
    UnknownType(String),

    #[error("record x is missing or not a number")]
    NonNumericX,

    #[error("invalid field: {0}")]
    InvalidField(String),
}

impl ErrorCode for RecordError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Malformed => "E_RECORD_MALFORMED",
            Self::Json(_) => "E_RECORD_JSON",
            Self::NotAnObject => "E_RECORD_NOT_OBJECT",
            Self::MissingId => "E_RECORD_MISSING_ID",
            Self::UnknownType(_) => "E_RECORD_UNKNOWN_TYPE",
            Self::NonNumericX => "E_RECORD_NON_NUMERIC_X",
            Self::InvalidField(_) => "E_RECORD_INVALID_FIELD",
        }
    }
}

// =============================================================================
// INGESTOR
// =============================================================================

/// Buffer, watermark and normalization context for one generation stream.
#[derive(Debug, Clone, Default)]
pub struct StreamIngestor {
    buffer: String,
    watermark: usize,
    options: IngestOptions,
    context: NormalizeContext,
}

impl StreamIngestor {
    #[must_use]
    pub fn new(options: IngestOptions) -> Self {
        Self { buffer: String::new(), watermark: 0, options, context: NormalizeContext::default() }
    }

    /// Append a chunk and ingest whatever became complete.
    ///
    /// `updated` carries earlier elements this batch changed; callers replace
    /// their copies by id.
    pub fn push(&mut self, chunk: &str) -> IngestResult {
        self.buffer.push_str(chunk);
        let mut result = ingest::ingest_records(&self.buffer, self.watermark, self.options.updated_at);
        self.watermark = result.watermark;
        if let Some(normalizer) = &self.options.normalizer {
            let batch = normalizer.normalize_with(&mut self.context, std::mem::take(&mut result.elements));
            result.elements = batch.elements;
            result.updated = batch.updated;
        }
        result
    }

    /// End of stream. Returns the text that never formed a record.
    #[must_use]
    pub fn finish(self) -> String {
        let tail = self.buffer.get(self.watermark..).unwrap_or_default().to_owned();
        if !tail.trim().is_empty() {
            tracing::info!(
                len = tail.len(),
                incomplete = has_incomplete_record(&tail),
                "stream: unconsumed tail at finish"
            );
        }
        tail
    }

    #[must_use]
    pub fn watermark(&self) -> usize {
        self.watermark
    }

    #[must_use]
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    #[must_use]
    pub fn options(&self) -> &IngestOptions {
        &self.options
    }
}
