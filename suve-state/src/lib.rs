//! Authoritative in-memory store of pending changes for one `(account,
//! region)`. Every mutation is a single critical section under one mutex:
//! operations are cheap and contention is bounded by one request at a time
//! per CLI invocation plus rare concurrent CLI calls by the operator, so
//! there is no reader/writer split here: a poisoned lock indicates a bug,
//! not a recoverable condition, so `lock()` recovers the guard rather than
//! propagating the poison.

use std::sync::Mutex;

use suve_record::Entry;
use suve_record::Key;
use suve_record::Name;
use suve_record::Operation;
use suve_record::Service;
use suve_record::State;
use suve_record::TagEntry;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StateError {
    #[error("not staged: {service}/{name}")]
    NotStaged { service: Service, name: Name },

    #[error("already staged: {service}/{name}")]
    AlreadyStaged { service: Service, name: Name },

    #[error("invalid tag entry: add and remove share key(s)")]
    InvalidTagEntry,
}

/// Result of `stage_entry`: the prior `Entry` at that key, if any, and
/// whether this call collapsed a staged `CREATE` + `DELETE` into a
/// cancellation.
#[derive(Debug, Clone, PartialEq)]
pub struct StageEntryResult {
    pub prior: Option<Entry>,
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageTagResult {
    pub prior: Option<TagEntry>,
}

pub struct AgentState {
    inner: Mutex<State>,
}

impl Default for AgentState {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(State::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.inner.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Replace any prior `Entry` at `key`. A `DELETE` on a key that
    /// currently holds a staged `CREATE` collapses to a plain removal: the
    /// operator never asked to delete a record that was never created
    /// remotely, so there is nothing to send to the API.
    ///
    /// A `CREATE` staged over an existing `Entry` is rejected as
    /// `AlreadyStaged` rather than silently overwritten — unlike other
    /// operations, `CREATE` asserts "nothing is staged here yet", so
    /// last-write-wins would hide the operator's mistake.
    pub fn stage_entry(&self, key: Key, entry: Entry) -> Result<StageEntryResult, StateError> {
        tracing::debug!(service = %key.0, name = %key.1, operation = ?entry.operation, "stage_entry");
        let mut state = self.lock();

        let prior = state.get_entry(&key).cloned();
        if entry.operation == Operation::Create && prior.is_some() {
            return Err(StateError::AlreadyStaged {
                service: key.0,
                name: key.1,
            });
        }

        let cancels = entry.operation == Operation::Delete
            && matches!(prior.as_ref().map(|e| e.operation), Some(Operation::Create));

        if cancels {
            state.remove_entry(&key);
            Ok(StageEntryResult {
                prior,
                cancelled: true,
            })
        } else {
            state.insert_entry(key, entry);
            Ok(StageEntryResult {
                prior,
                cancelled: false,
            })
        }
    }

    /// Merge into any existing `TagEntry` at `key`: set union over
    /// additions and removals, later writer wins per-key.
    pub fn stage_tag(&self, key: Key, tag: TagEntry) -> Result<StageTagResult, StateError> {
        if !tag.is_valid() {
            return Err(StateError::InvalidTagEntry);
        }
        tracing::debug!(service = %key.0, name = %key.1, "stage_tag");
        let mut state = self.lock();

        let prior = state.get_tag(&key).cloned();
        match prior.clone() {
            Some(mut existing) => {
                existing.merge_from(&tag);
                state.insert_tag(key, existing);
            }
            None => {
                state.insert_tag(key, tag);
            }
        }
        Ok(StageTagResult { prior })
    }

    pub fn get_entry(&self, key: &Key) -> Result<Entry, StateError> {
        self.lock()
            .get_entry(key)
            .cloned()
            .ok_or_else(|| not_staged(key))
    }

    pub fn get_tag(&self, key: &Key) -> Result<TagEntry, StateError> {
        self.lock()
            .get_tag(key)
            .cloned()
            .ok_or_else(|| not_staged(key))
    }

    pub fn unstage_entry(&self, key: &Key) -> Result<(), StateError> {
        tracing::debug!(service = %key.0, name = %key.1, "unstage_entry");
        self.lock()
            .remove_entry(key)
            .map(|_| ())
            .ok_or_else(|| not_staged(key))
    }

    pub fn unstage_tag(&self, key: &Key) -> Result<(), StateError> {
        tracing::debug!(service = %key.0, name = %key.1, "unstage_tag");
        self.lock()
            .remove_tag(key)
            .map(|_| ())
            .ok_or_else(|| not_staged(key))
    }

    pub fn unstage_all(&self, filter: Option<Service>) {
        tracing::debug!(?filter, "unstage_all");
        self.lock().take_filtered(filter);
    }

    pub fn list_entries(&self, filter: Option<Service>) -> Vec<(Key, Entry)> {
        self.lock()
            .entries_for(filter)
            .into_iter()
            .map(|(k, e)| (k, e.clone()))
            .collect()
    }

    pub fn list_tags(&self, filter: Option<Service>) -> Vec<(Key, TagEntry)> {
        self.lock()
            .tags_for(filter)
            .into_iter()
            .map(|(k, t)| (k, t.clone()))
            .collect()
    }

    /// Return the filtered `State`; clear it from memory unless `keep`.
    pub fn drain(&self, filter: Option<Service>, keep: bool) -> State {
        tracing::debug!(?filter, keep, "drain");
        let mut state = self.lock();
        if keep {
            state.filtered(filter)
        } else {
            state.take_filtered(filter)
        }
    }

    /// Merge `incoming` (restricted to `filter`) into the agent's state.
    /// Overwrite semantics are obtained by the caller draining first.
    pub fn write_state(&self, filter: Option<Service>, incoming: State) {
        tracing::debug!(?filter, "write_state");
        let incoming = incoming.filtered(filter);
        self.lock().merge_from(&incoming);
    }

    pub fn snapshot(&self) -> State {
        self.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

fn not_staged(key: &Key) -> StateError {
    StateError::NotStaged {
        service: key.0,
        name: key.1.clone(),
    }
}
