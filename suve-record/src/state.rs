use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::Entry;
use crate::Name;
use crate::Service;
use crate::TagEntry;

/// `(Service, Name)` — the shared key type used by callers to address a
/// single record across both indexes in `State`.
pub type Key = (Service, Name);

/// One service's worth of an index: name -> value, ordered by name so
/// `list_entries`/`list_tags` and the apply engine's name-sorted reporting
/// iterate in a stable order for free.
pub type ByName<V> = BTreeMap<Name, V>;

/// The agent's whole contents: two orthogonal indexes — a record may have
/// an `Entry`, a `TagEntry`, both, or neither.
///
/// Serializes as `{ "param": { "<name>": ... }, "secret": { ... } }` per
/// index (a flat map keyed by the `(Service, Name)` tuple is not
/// representable in JSON, since JSON object keys must be strings).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub entries: BTreeMap<Service, ByName<Entry>>,
    #[serde(default)]
    pub tags: BTreeMap<Service, ByName<TagEntry>>,
}

impl State {
    pub fn is_empty(&self) -> bool {
        self.entries.values().all(|m| m.is_empty()) && self.tags.values().all(|m| m.is_empty())
    }

    pub fn get_entry(&self, key: &Key) -> Option<&Entry> {
        self.entries.get(&key.0).and_then(|m| m.get(&key.1))
    }

    pub fn get_tag(&self, key: &Key) -> Option<&TagEntry> {
        self.tags.get(&key.0).and_then(|m| m.get(&key.1))
    }

    pub fn insert_entry(&mut self, key: Key, entry: Entry) -> Option<Entry> {
        self.entries.entry(key.0).or_default().insert(key.1, entry)
    }

    pub fn remove_entry(&mut self, key: &Key) -> Option<Entry> {
        let map = self.entries.get_mut(&key.0)?;
        let prior = map.remove(&key.1);
        if map.is_empty() {
            self.entries.remove(&key.0);
        }
        prior
    }

    pub fn insert_tag(&mut self, key: Key, tag: TagEntry) -> Option<TagEntry> {
        self.tags.entry(key.0).or_default().insert(key.1, tag)
    }

    pub fn remove_tag(&mut self, key: &Key) -> Option<TagEntry> {
        let map = self.tags.get_mut(&key.0)?;
        let prior = map.remove(&key.1);
        if map.is_empty() {
            self.tags.remove(&key.0);
        }
        prior
    }

    pub fn entries_for(&self, filter: Option<Service>) -> Vec<(Key, &Entry)> {
        self.entries
            .iter()
            .filter(|(s, _)| filter.is_none_or(|f| f == **s))
            .flat_map(|(s, m)| m.iter().map(move |(n, e)| ((*s, n.clone()), e)))
            .collect()
    }

    pub fn tags_for(&self, filter: Option<Service>) -> Vec<(Key, &TagEntry)> {
        self.tags
            .iter()
            .filter(|(s, _)| filter.is_none_or(|f| f == **s))
            .flat_map(|(s, m)| m.iter().map(move |(n, t)| ((*s, n.clone()), t)))
            .collect()
    }

    /// Restrict to one service, or return a clone of everything when
    /// `filter` is `None` (the `service | ""` wire convention).
    pub fn filtered(&self, filter: Option<Service>) -> State {
        match filter {
            None => self.clone(),
            Some(svc) => State {
                entries: self
                    .entries
                    .get(&svc)
                    .map(|m| BTreeMap::from([(svc, m.clone())]))
                    .unwrap_or_default(),
                tags: self
                    .tags
                    .get(&svc)
                    .map(|m| BTreeMap::from([(svc, m.clone())]))
                    .unwrap_or_default(),
            },
        }
    }

    /// Remove every key belonging to `filter` (or everything, if `None`),
    /// returning what was removed. Used by `drain(.., keep=false)`.
    pub fn take_filtered(&mut self, filter: Option<Service>) -> State {
        let taken = self.filtered(filter);
        match filter {
            None => {
                self.entries.clear();
                self.tags.clear();
            }
            Some(svc) => {
                self.entries.remove(&svc);
                self.tags.remove(&svc);
            }
        }
        taken
    }

    /// Union `other` into `self`, last-writer-wins on key collisions for
    /// entries, merged per `TagEntry::merge_from` for tags. Used by
    /// `write_state` (after an explicit prior drain, the caller decides
    /// merge-vs-overwrite) and by stash `push`/`pop` in `merge` mode.
    pub fn merge_from(&mut self, other: &State) {
        for (svc, names) in &other.entries {
            let target = self.entries.entry(*svc).or_default();
            for (name, entry) in names {
                target.insert(name.clone(), entry.clone());
            }
        }
        for (svc, names) in &other.tags {
            let target = self.tags.entry(*svc).or_default();
            for (name, tag) in names {
                target
                    .entry(name.clone())
                    .and_modify(|existing| existing.merge_from(tag))
                    .or_insert_with(|| tag.clone());
            }
        }
    }

    /// Replace the filtered slice wholesale (`overwrite` mode).
    pub fn overwrite_filtered(&mut self, filter: Option<Service>, replacement: State) {
        self.take_filtered(filter);
        self.merge_from(&replacement);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Operation;
    use time::macros::datetime;

    fn entry() -> Entry {
        Entry {
            operation: Operation::Update,
            value: Some("v".into()),
            description: None,
            type_hint: None,
            delete_options: None,
            staged_at: datetime!(2026-01-01 00:00:00 UTC),
            base_modified_at: None,
        }
    }

    #[test]
    fn filtered_restricts_to_one_service() {
        let mut s = State::default();
        s.insert_entry((Service::Param, Name::from("/a")), entry());
        s.insert_entry((Service::Secret, Name::from("b")), entry());

        let only_param = s.filtered(Some(Service::Param));
        assert_eq!(only_param.entries_for(None).len(), 1);
        assert!(only_param.get_entry(&(Service::Param, Name::from("/a"))).is_some());
    }

    #[test]
    fn take_filtered_clears_agent_slice() {
        let mut s = State::default();
        s.insert_entry((Service::Param, Name::from("/a")), entry());

        let taken = s.take_filtered(Some(Service::Param));
        assert_eq!(taken.entries_for(None).len(), 1);
        assert!(s.is_empty());
    }

    #[test]
    fn round_trip_through_json_is_identity() {
        let mut s = State::default();
        s.insert_entry((Service::Param, Name::from("/a")), entry());
        let json = serde_json::to_string(&s).unwrap();
        let back: State = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get_entry(&(Service::Param, Name::from("/a"))), Some(&entry()));
    }

    #[test]
    fn wire_shape_is_nested_by_service_then_name() {
        let mut s = State::default();
        s.insert_entry((Service::Param, Name::from("/a")), entry());
        let json: serde_json::Value = serde_json::to_value(&s).unwrap();
        assert!(json["entries"]["param"]["/a"].is_object());
    }
}
