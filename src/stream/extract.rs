//! Object-span extraction over a partially streamed text buffer.
//!
//! Generated text interleaves prose with one JSON object per element record.
//! The extractor finds each object's byte span without parsing it, so a broken
//! record can be isolated and a half-arrived one left for the next call.

#[cfg(test)]
#[path = "extract_test.rs"]
mod tests;

/// Keys that mark a broken line as an element record worth repairing.
const RECORD_KEYS: [&str; 4] = ["id", "type", "x", "y"];

/// One candidate record found in the buffer. Offsets are byte offsets into
/// the scanned text, `end` exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub raw: String,
    pub start: usize,
    pub end: usize,
    /// Braces balanced; `false` marks a best-effort span from a broken line.
    pub well_formed: bool,
}

enum Scan {
    /// Matching close brace found; exclusive end.
    Closed(usize),
    /// Record cannot close; offset of the newline ending the broken line.
    Broken(usize),
    /// Ran out of text while the object was still open.
    Open,
}

/// Extract every complete (or definitively broken) object span, in order.
///
/// Scanning stops at the first object still in flight: everything from its
/// opening brace on is left for a later call.
#[must_use]
pub fn extract_complete_objects(text: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut cursor = 0;

    while let Some(found) = text[cursor..].find('{') {
        let start = cursor + found;
        match scan_object(text, start) {
            Scan::Closed(end) => {
                spans.push(Span { raw: text[start..end].to_owned(), start, end, well_formed: true });
                cursor = end;
            }
            Scan::Broken(line_end) => {
                let line = text[start..line_end].trim_end();
                if looks_like_record(line) {
                    let end = line.rfind('}').map_or(line_end, |brace| start + brace + 1);
                    spans.push(Span { raw: text[start..end].to_owned(), start, end, well_formed: false });
                } else {
                    tracing::debug!(start, len = line.len(), "extract: discarded broken span");
                }
                cursor = line_end + 1;
            }
            Scan::Open => break,
        }
    }
    spans
}

/// Whether the text ends inside an object that has not closed yet.
#[must_use]
pub fn has_incomplete_record(text: &str) -> bool {
    let mut cursor = 0;
    while let Some(found) = text[cursor..].find('{') {
        let start = cursor + found;
        cursor = match scan_object(text, start) {
            Scan::Closed(end) => end,
            Scan::Broken(line_end) => line_end + 1,
            Scan::Open => return true,
        };
    }
    false
}

/// Depth- and string-aware scan from an opening brace.
///
/// A raw newline inside a string, or a line that starts with neither a key
/// nor a closing brace where an object member was expected, means this
/// record can never close.
fn scan_object(text: &str, start: usize) -> Scan {
    let bytes = text.as_bytes();
    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        let at = start + offset;
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                b'\n' => return Scan::Broken(at),
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' | b'[' => stack.push(byte),
            b'}' | b']' => {
                stack.pop();
                if stack.is_empty() {
                    return Scan::Closed(at + 1);
                }
            }
            b'\n' if stack.last() == Some(&b'{') && ends_member_list(bytes, at + 1) => {
                return Scan::Broken(at);
            }
            _ => {}
        }
    }
    Scan::Open
}

/// Inside an object a new line continues with a key or the closing brace.
/// Anything else (another record, a list bullet, a leading comma, prose) means
/// the open object was abandoned. Undecided until that byte arrives.
fn ends_member_list(bytes: &[u8], from: usize) -> bool {
    next_significant(bytes, from).is_some_and(|b| !matches!(b, b'"' | b'}'))
}

fn next_significant(bytes: &[u8], from: usize) -> Option<u8> {
    bytes.get(from..)?.iter().copied().find(|b| !b.is_ascii_whitespace())
}

/// Contains a quoted `id`, `type`, `x` or `y` key followed by a colon.
fn looks_like_record(line: &str) -> bool {
    RECORD_KEYS.iter().any(|key| {
        let quoted = format!("\"{key}\"");
        line.match_indices(&quoted)
            .any(|(at, _)| line[at + quoted.len()..].trim_start().starts_with(':'))
    })
}
