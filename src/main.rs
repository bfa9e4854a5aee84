use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use drawkit::config::{ConfigError, PipelineConfig};
use drawkit::dsl::{self, CompressOptions, CompressedDocument, DocumentShape, DslError};
use drawkit::element::Element;
use drawkit::error::ErrorCode;
use drawkit::stream::{IngestOptions, StreamIngestor};
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("[{}] {}", .0.error_code(), .0)]
    Dsl(#[from] DslError),
    #[error("[{}] {}", .0.error_code(), .0)]
    Config(#[from] ConfigError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Parser, Debug)]
#[command(name = "drawkit", about = "Diagram element DSL codec and streaming ingestion")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// JSON elements (array, or object with `elements`) to DSL on stdout.
    Compress {
        /// Input file; stdin when absent or `-`.
        #[arg(long)]
        input: Option<PathBuf>,
        /// Write the structured document here for a later decompress.
        #[arg(long)]
        document: Option<PathBuf>,
        #[arg(long)]
        strip_volatile: bool,
    },
    /// DSL text back to JSON elements on stdout.
    Decompress {
        /// Document written by `compress --document`.
        #[arg(long)]
        document: PathBuf,
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Replay a model transcript through the streaming ingestor.
    Ingest {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, default_value_t = 64)]
        chunk_size: usize,
        /// Dark theme defaults; overrides DRAWKIT_DARK_MODE.
        #[arg(long)]
        dark: bool,
    },
}

fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt().with_writer(io::stderr).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Compress { input, document, strip_volatile } => {
            run_compress(input.as_deref(), document.as_deref(), strip_volatile)
        }
        Command::Decompress { document, input } => run_decompress(&document, input.as_deref()),
        Command::Ingest { input, chunk_size, dark } => run_ingest(input.as_deref(), chunk_size, dark),
    }
}

fn run_compress(input: Option<&Path>, document_out: Option<&Path>, strip_volatile: bool) -> Result<(), CliError> {
    let (elements, meta, shape) = match serde_json::from_str::<Value>(&read_input(input)?)? {
        Value::Array(items) => (items, Map::new(), DocumentShape::Array),
        Value::Object(mut object) => match object.remove("elements") {
            Some(Value::Array(items)) => (items, object, DocumentShape::Object),
            _ => return Err(CliError::InvalidInput("object input needs an `elements` array".to_owned())),
        },
        _ => return Err(CliError::InvalidInput("expected an array or an object".to_owned())),
    };
    let elements: Vec<Element> = serde_json::from_value(Value::Array(elements))?;

    let compressed = dsl::compress(&elements, &CompressOptions { meta, shape, strip_volatile })?;
    if let Some(path) = document_out {
        fs::write(path, serde_json::to_string_pretty(&compressed.document)?)?;
    }
    print!("{}", compressed.text);
    Ok(())
}

fn run_decompress(document: &Path, input: Option<&Path>) -> Result<(), CliError> {
    let reference: CompressedDocument = serde_json::from_str(&fs::read_to_string(document)?)?;
    let text = dsl::extract_dsl_or_raw(&read_input(input)?);
    let decompressed = dsl::decompress(&text, &reference)?;

    let elements = serde_json::to_value(&decompressed.elements)?;
    let output = match decompressed.shape {
        DocumentShape::Array => elements,
        DocumentShape::Object => {
            let mut object = decompressed.meta;
            object.insert("elements".to_owned(), elements);
            Value::Object(object)
        }
    };
    print_json(&output)
}

fn run_ingest(input: Option<&Path>, chunk_size: usize, dark: bool) -> Result<(), CliError> {
    let mut config = PipelineConfig::from_env()?;
    config.theme.dark |= dark;
    let transcript = read_input(input)?;

    let mut ingestor = StreamIngestor::new(IngestOptions::new(config.normalizer()));
    let mut elements: Vec<Element> = Vec::new();
    for chunk in chunks(&transcript, chunk_size.max(1)) {
        let result = ingestor.push(chunk);
        for changed in result.updated {
            if let Some(slot) = elements.iter_mut().find(|e| e.id == changed.id) {
                *slot = changed;
            }
        }
        elements.extend(result.elements);
        for failure in result.errors {
            eprintln!("[{}] {}..{}: {}", failure.error.error_code(), failure.start, failure.end, failure.error);
        }
    }
    let tail = ingestor.finish();
    if !tail.trim().is_empty() {
        eprintln!("unconsumed tail: {} bytes", tail.len());
    }
    print_json(&serde_json::to_value(&elements)?)
}

/// Split on char boundaries into pieces of at most `size` bytes (one char minimum).
fn chunks(text: &str, size: usize) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let mut end = size.min(rest.len());
        while !rest.is_char_boundary(end) {
            end += 1;
        }
        let (head, tail) = rest.split_at(end);
        rest = tail;
        Some(head)
    })
}

fn read_input(path: Option<&Path>) -> Result<String, CliError> {
    match path {
        Some(path) if path != Path::new("-") => Ok(fs::read_to_string(path)?),
        _ => {
            let mut text = String::new();
            io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
