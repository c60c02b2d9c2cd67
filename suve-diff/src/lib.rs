//! Compare staged state to remote current state and self-heal rows that
//! are no longer meaningful to show.

mod canonical;
mod reader;

pub use canonical::canonicalize_json;
pub use canonical::values_equal;
pub use reader::RemoteReader;
pub use reader::RemoteRecord;

use std::collections::HashMap;
use std::sync::Arc;

use suve_record::Key;
use suve_record::Operation;
use suve_record::Service;
use suve_record::State;

/// Why an Entry was removed from the staged state instead of being shown
/// as a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoUnstageReason {
    /// Staged `UPDATE` value equals the remote value.
    IdenticalToRemote,
    /// Staged `UPDATE` refers to a record that no longer exists.
    NoLongerExists,
    /// Staged `DELETE` refers to a record that is already gone.
    AlreadyDeleted,
}

impl AutoUnstageReason {
    /// The warning text shown next to an auto-unstaged row.
    pub fn warning(&self) -> &'static str {
        match self {
            AutoUnstageReason::IdenticalToRemote => "identical to AWS current",
            AutoUnstageReason::NoLongerExists => "no longer exists in AWS",
            AutoUnstageReason::AlreadyDeleted => "already deleted in AWS",
        }
    }
}

/// A single Entry's diff preview, or a record of why it was self-healed
/// away instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    AutoUnstaged { key: Key, reason: AutoUnstageReason },
    Diff(DiffLine),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub key: Key,
    pub operation: Operation,
    pub remote_value: Option<String>,
    pub staged_value: Option<String>,
}

/// One `+key=value` / `-key[=known_value]` line in a tag diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagDiffLine {
    Add { key: Key, tag: String, value: String },
    Remove { key: Key, tag: String, known_value: Option<String> },
}

/// Invoked once per auto-unstaged row so the caller can remove it from
/// the agent's staged state.
#[async_trait::async_trait]
pub trait DiffSink: Send + Sync {
    async fn unstage_entry(&self, key: &Key);
}

/// Diff every staged Entry covered by `readers` against remote state,
/// auto-unstaging (via `sink`) rows that are no longer meaningful to show.
/// `json` requests JSON canonicalization before comparing `UPDATE` values.
pub async fn diff_entries(
    state: &State,
    readers: &[Arc<dyn RemoteReader>],
    sink: Arc<dyn DiffSink>,
    json: bool,
) -> Vec<EntryOutcome> {
    let by_service: HashMap<Service, Arc<dyn RemoteReader>> =
        readers.iter().map(|r| (r.service(), r.clone())).collect();

    let mut outcomes = Vec::new();

    for (key, entry) in state.entries_for(None) {
        let Some(reader) = by_service.get(&key.0) else {
            continue;
        };

        let remote = match reader.fetch(&key.1).await {
            Ok(remote) => remote,
            Err(e) => {
                tracing::warn!(name = %key.1, error = %e, "diff fetch failed");
                continue;
            }
        };
        let remote_value = remote.as_ref().and_then(|r| r.value.clone());

        let outcome = match (entry.operation, &remote_value) {
            (Operation::Create, _) => EntryOutcome::Diff(DiffLine {
                key: key.clone(),
                operation: Operation::Create,
                remote_value: None,
                staged_value: entry.value.clone(),
            }),
            (Operation::Update, None) => {
                auto_unstage(&sink, key.clone(), AutoUnstageReason::NoLongerExists).await
            }
            (Operation::Update, Some(remote_value))
                if entry.value.as_deref().is_some_and(|v| values_equal(v, remote_value, json)) =>
            {
                auto_unstage(&sink, key.clone(), AutoUnstageReason::IdenticalToRemote).await
            }
            (Operation::Update, Some(_)) => EntryOutcome::Diff(DiffLine {
                key: key.clone(),
                operation: Operation::Update,
                remote_value,
                staged_value: entry.value.clone(),
            }),
            (Operation::Delete, None) => {
                auto_unstage(&sink, key.clone(), AutoUnstageReason::AlreadyDeleted).await
            }
            (Operation::Delete, Some(_)) => EntryOutcome::Diff(DiffLine {
                key: key.clone(),
                operation: Operation::Delete,
                remote_value,
                staged_value: None,
            }),
        };

        outcomes.push(outcome);
    }

    outcomes
}

async fn auto_unstage(sink: &Arc<dyn DiffSink>, key: Key, reason: AutoUnstageReason) -> EntryOutcome {
    tracing::info!(name = %key.1, warning = reason.warning(), "auto-unstaged");
    sink.unstage_entry(&key).await;
    EntryOutcome::AutoUnstaged { key, reason }
}

/// Render every staged `TagEntry` against the remote tag set (the
/// `RemoteRecord::tags` already fetched by `diff_entries`, or fetched
/// separately for records with no staged Entry). No self-heal rule is
/// specified for tags; every staged mutation produces a line.
pub fn diff_tags(
    state: &State,
    remote_tags: &HashMap<Key, std::collections::BTreeMap<String, String>>,
) -> Vec<TagDiffLine> {
    let mut lines = Vec::new();
    for (key, staged) in state.tags_for(None) {
        let remote = remote_tags.get(&key);
        for (tag, value) in &staged.add {
            lines.push(TagDiffLine::Add { key: key.clone(), tag: tag.clone(), value: value.clone() });
        }
        for tag in &staged.remove {
            let known_value = remote.and_then(|r| r.get(tag)).cloned();
            lines.push(TagDiffLine::Remove { key: key.clone(), tag: tag.clone(), known_value });
        }
    }
    lines
}

#[cfg(test)]
mod tests;
