//! Reference table: compact short ids ↔ globally unique long ids.
//!
//! DESIGN
//! ======
//! The table is the explicit context threaded through one compress or
//! decompress pass. It is injective (a long id has at most one short id) and
//! append-only (a bound short id is never rebound). Numeric short ids sort
//! ascending; `next_numeric` derives the next unused one from the current max.
//! Tables are scoped to one document or editing session; short ids are not
//! globally unique.

use std::collections::{BTreeMap, HashMap};

use rand::Rng;
use rand::distr::Alphanumeric;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Length of generated long ids (matches the canvas's native id length).
pub const LONG_ID_LEN: usize = 21;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdMapError {
    #[error("short id {short} is already bound to {existing}, cannot rebind to {requested}")]
    ShortIdTaken { short: String, existing: String, requested: String },
    #[error("long id {long} is already bound to short id {existing}")]
    LongIdTaken { long: String, existing: String },
}

impl crate::error::ErrorCode for IdMapError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::ShortIdTaken { .. } => "E_SHORT_ID_TAKEN",
            Self::LongIdTaken { .. } => "E_LONG_ID_TAKEN",
        }
    }
}

/// Bidirectional short-id ↔ long-id mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdMap {
    /// `(short, long)` in insertion order.
    entries: Vec<(String, String)>,
    by_short: HashMap<String, usize>,
    by_long: HashMap<String, usize>,
}

impl IdMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bind `short` to `long`. Re-binding an identical pair is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if either side is already bound to something else.
    pub fn bind(&mut self, short: &str, long: &str) -> Result<(), IdMapError> {
        if let Some(&idx) = self.by_short.get(short) {
            let existing = &self.entries[idx].1;
            if existing == long {
                return Ok(());
            }
            return Err(IdMapError::ShortIdTaken {
                short: short.to_owned(),
                existing: existing.clone(),
                requested: long.to_owned(),
            });
        }
        if let Some(&idx) = self.by_long.get(long) {
            return Err(IdMapError::LongIdTaken { long: long.to_owned(), existing: self.entries[idx].0.clone() });
        }
        let idx = self.entries.len();
        self.entries.push((short.to_owned(), long.to_owned()));
        self.by_short.insert(short.to_owned(), idx);
        self.by_long.insert(long.to_owned(), idx);
        Ok(())
    }

    #[must_use]
    pub fn long_id(&self, short: &str) -> Option<&str> {
        self.by_short.get(short).map(|&idx| self.entries[idx].1.as_str())
    }

    #[must_use]
    pub fn short_id(&self, long: &str) -> Option<&str> {
        self.by_long.get(long).map(|&idx| self.entries[idx].0.as_str())
    }

    /// Insertion position of a short id.
    #[must_use]
    pub fn position(&self, short: &str) -> Option<usize> {
        self.by_short.get(short).copied()
    }

    /// Resolve `short`, binding it to a freshly generated long id when unseen.
    ///
    /// Returns the long id and whether it was newly generated.
    pub fn ensure(&mut self, short: &str) -> (String, bool) {
        if let Some(long) = self.long_id(short) {
            return (long.to_owned(), false);
        }
        let long = loop {
            let candidate = generate_long_id();
            if !self.by_long.contains_key(&candidate) {
                break candidate;
            }
        };
        let idx = self.entries.len();
        self.entries.push((short.to_owned(), long.clone()));
        self.by_short.insert(short.to_owned(), idx);
        self.by_long.insert(long.clone(), idx);
        (long, true)
    }

    /// Largest numeric short id plus one (`1` for a table without numeric ids).
    #[must_use]
    pub fn next_numeric(&self) -> u64 {
        self.entries
            .iter()
            .filter_map(|(short, _)| short.parse::<u64>().ok())
            .max()
            .map_or(1, |max| max + 1)
    }

    /// Bind `long` to the next unused numeric short id, or return its existing short id.
    pub fn assign(&mut self, long: &str) -> String {
        if let Some(short) = self.short_id(long) {
            return short.to_owned();
        }
        let short = self.next_numeric().to_string();
        let idx = self.entries.len();
        self.entries.push((short.clone(), long.to_owned()));
        self.by_short.insert(short.clone(), idx);
        self.by_long.insert(long.to_owned(), idx);
        short
    }

    /// Entries with numeric short ids ascending first, then the rest in insertion order.
    #[must_use]
    pub fn iter(&self) -> Vec<(&str, &str)> {
        let mut numeric: Vec<(u64, &str, &str)> = Vec::new();
        let mut other: Vec<(&str, &str)> = Vec::new();
        for (short, long) in &self.entries {
            match short.parse::<u64>() {
                Ok(n) => numeric.push((n, short, long)),
                Err(_) => other.push((short, long)),
            }
        }
        numeric.sort_by_key(|(n, _, _)| *n);
        numeric
            .into_iter()
            .map(|(_, short, long)| (short, long))
            .chain(other)
            .collect()
    }

    /// `short -> long` lines for prompt context; `(none)` when empty.
    #[must_use]
    pub fn listing(&self) -> String {
        if self.is_empty() {
            return "(none)".to_owned();
        }
        self.iter()
            .into_iter()
            .map(|(short, long)| format!("{short} -> {long}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Random alphanumeric id of [`LONG_ID_LEN`] characters.
#[must_use]
pub fn generate_long_id() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(LONG_ID_LEN)
        .map(char::from)
        .collect()
}

impl Serialize for IdMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

impl<'de> Deserialize<'de> for IdMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
        let mut pairs: Vec<(String, String)> = raw.into_iter().collect();
        pairs.sort_by_key(|(short, _)| (short.parse::<u64>().unwrap_or(u64::MAX), short.clone()));
        let mut map = IdMap::new();
        for (short, long) in pairs {
            map.bind(&short, &long).map_err(D::Error::custom)?;
        }
        Ok(map)
    }
}

#[cfg(test)]
#[path = "id_map_test.rs"]
mod tests;
