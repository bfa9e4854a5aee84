//! Attribute factoring: lift field/value pairs shared by every record.
//!
//! A field is common only if it is present on *all* records with identical
//! values, and only when there are at least two records to share it. `id` and
//! `type` never factor. Text-common attributes are computed
//! over text records only, after excluding anything already common.

use serde_json::{Map, Value};

/// Fields that identify a record and therefore never factor out.
pub const EXCLUDED_KEYS: [&str; 2] = ["id", "type"];

/// Fields that churn on every edit and can optionally be dropped from payloads.
pub const VOLATILE_KEYS: [&str; 2] = ["updated", "versionNonce"];

pub type Record = Map<String, Value>;

/// Field/value pairs identical across every record, skipping keys in `exclude`.
#[must_use]
pub fn common_attributes(records: &[&Record], exclude: &Record) -> Record {
    let mut common = Record::new();
    let Some((first, rest)) = records.split_first() else {
        return common;
    };
    if rest.is_empty() {
        return common;
    }
    for (key, value) in *first {
        if EXCLUDED_KEYS.contains(&key.as_str()) || exclude.contains_key(key) {
            continue;
        }
        if rest.iter().all(|record| record.get(key) == Some(value)) {
            common.insert(key.clone(), value.clone());
        }
    }
    common
}

/// Per-record payload: every field not covered by `common` or `text_common`.
///
/// `text_common` is only consulted when the record is a text element.
#[must_use]
pub fn strip_record(record: &Record, common: &Record, text_common: Option<&Record>, drop_volatile: bool) -> Record {
    record
        .iter()
        .filter(|(key, value)| {
            let key = key.as_str();
            if EXCLUDED_KEYS.contains(&key) {
                return false;
            }
            if drop_volatile && VOLATILE_KEYS.contains(&key) {
                return false;
            }
            if common.get(key) == Some(*value) {
                return false;
            }
            !text_common.is_some_and(|tc| tc.get(key) == Some(*value))
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Rebuild a record as `common ⊕ text_common ⊕ data`, later sources winning.
#[must_use]
pub fn merge_record(common: &Record, text_common: Option<&Record>, data: Record) -> Record {
    let mut merged = common.clone();
    if let Some(tc) = text_common {
        merged.extend(tc.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged.extend(data);
    merged
}

#[cfg(test)]
#[path = "factor_test.rs"]
mod tests;
