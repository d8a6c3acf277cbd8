//! Minimal-diff computation between a file's current tags and the desired ones.
use crate::common::{canonicalize_values, normalize_tag_value};
use std::collections::BTreeMap;

/// Current tags of a file. A key may repeat, so each maps to every value found.
pub type TagMap = BTreeMap<String, Vec<String>>;

/// Desired tags, one value per upper-cased key.
pub type DesiredTags = BTreeMap<String, String>;

/// Keys that must be (re)written, with their new values.
pub type TagChangeSet = BTreeMap<String, String>;

/// Compute which desired keys differ from what the file already carries. Keys are compared
/// case-insensitively; empty desired values are never asserted.
pub fn diff(existing: &TagMap, desired: &DesiredTags) -> TagChangeSet {
    let mut by_key: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (k, values) in existing {
        by_key.entry(k.trim().to_uppercase()).or_default().extend(values.iter().cloned());
    }

    let mut changes = TagChangeSet::new();
    for (k, want) in desired {
        let want_canon = normalize_tag_value(want);
        if want_canon.is_empty() {
            continue;
        }
        let key = k.trim().to_uppercase();
        let have = by_key.get(&key).map(|v| canonicalize_values(v)).unwrap_or_default();
        if want_canon != have {
            changes.insert(key, want.clone());
        }
    }
    changes
}
