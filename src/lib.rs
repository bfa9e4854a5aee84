//! drawkit — diagram element codec, streaming ingestion and normalization.
//!
//! DESIGN
//! ======
//! Three pipelines share one element model:
//!
//! | Module        | Role                                                      |
//! |---------------|-----------------------------------------------------------|
//! | [`element`]   | typed element records, geometry, reference checks         |
//! | [`dsl`]       | compress elements to an editable attribute DSL and back   |
//! | [`stream`]    | pull element records out of partially generated text      |
//! | [`normalize`] | fill missing styles, bind connectors, repair back-links   |
//! | [`repair`]    | concurrent second chance for records that failed to parse |
//! | [`llm`]       | provider-neutral chat trait backing the repair path       |
//! | [`config`]    | environment-driven pipeline settings                      |
//!
//! The codec and the ingestion pipeline share no mutable state; the only
//! cross-call state is the caller-held reference table (codec) and buffer
//! watermark (ingestion).

pub mod config;
pub mod dsl;
pub mod element;
pub mod error;
pub mod llm;
pub mod normalize;
pub mod repair;
pub mod stream;

pub use dsl::{CompressOptions, CompressedDocument, DslError, compress, decompress};
pub use element::{Element, ElementKind};
pub use error::ErrorCode;
pub use normalize::{Normalizer, Theme};
pub use stream::{IngestOptions, IngestResult, StreamIngestor, ingest};
