use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

/// A staged tag mutation for one `(Service, Name)`, stored independently of
/// any `Entry` on the same key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagEntry {
    pub add: BTreeMap<String, String>,
    pub remove: BTreeSet<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub staged_at: OffsetDateTime,
}

impl TagEntry {
    /// `add.keys() ∩ remove == ∅`.
    pub fn is_valid(&self) -> bool {
        !self.add.keys().any(|k| self.remove.contains(k))
    }

    /// Merge `incoming` (the later request) into `self` (the existing,
    /// prior state), re-establishing the invariant: on a per-key conflict
    /// between one side's `add` and the other's `remove`, the later
    /// request wins and the key ends up on exactly the side the later
    /// request put it on.
    pub fn merge_from(&mut self, incoming: &TagEntry) {
        for key in incoming.add.keys() {
            self.remove.remove(key);
        }
        for key in &incoming.remove {
            self.add.remove(key);
        }
        for (k, v) in &incoming.add {
            self.add.insert(k.clone(), v.clone());
        }
        for k in &incoming.remove {
            self.remove.insert(k.clone());
        }
        self.staged_at = incoming.staged_at;
        debug_assert!(self.is_valid());
    }
}
