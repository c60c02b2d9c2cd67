//! Translate staged entries and tag-entries into remote-API effects, with
//! conflict detection and partial-failure accounting.

mod strategy;

pub use strategy::RemoteStrategy;
pub use strategy::UnstageSink;

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use suve_record::Key;
use suve_record::Operation;
use suve_record::Service;
use suve_record::State;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// `CREATE` when the remote record already exists.
    AlreadyExists,
    /// `UPDATE`/`DELETE` when the remote record was modified after
    /// `base_modified_at`.
    Modified,
    /// `UPDATE` when the remote record is gone entirely.
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictDetail {
    pub key: Key,
    pub kind: ConflictKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub applied: Vec<Key>,
    pub failed: Vec<(Key, String)>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("{count} conflict(s) detected for {names}", count = .0.len(), names = summarize(.0))]
    Conflicts(Vec<ConflictDetail>),

    #[error("applied {applied}, failed {failed}", applied = .0.applied.len(), failed = .0.failed.len())]
    PartialFailure(ApplyOutcome),
}

fn summarize(conflicts: &[ConflictDetail]) -> String {
    conflicts
        .iter()
        .map(|c| c.key.1.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Run conflict detection (skipped when `ignore_conflicts`), then apply
/// every staged entry and tag-entry for the services covered by
/// `strategies`. On any conflict, nothing is applied. Otherwise every
/// record is applied in parallel and the outcome reports every
/// success/failure.
pub async fn apply(
    state: &State,
    strategies: &[Arc<dyn RemoteStrategy>],
    sink: Arc<dyn UnstageSink>,
    ignore_conflicts: bool,
) -> Result<ApplyOutcome, ApplyError> {
    let by_service: HashMap<Service, Arc<dyn RemoteStrategy>> =
        strategies.iter().map(|s| (s.service(), s.clone())).collect();

    let entries: Vec<(Key, suve_record::Entry)> = state
        .entries_for(None)
        .into_iter()
        .filter(|(k, _)| by_service.contains_key(&k.0))
        .map(|(k, e)| (k, e.clone()))
        .collect();
    let tags: Vec<(Key, suve_record::TagEntry)> = state
        .tags_for(None)
        .into_iter()
        .filter(|(k, _)| by_service.contains_key(&k.0))
        .map(|(k, t)| (k, t.clone()))
        .collect();

    if !ignore_conflicts {
        let conflicts = detect_conflicts(&entries, &by_service).await;
        if !conflicts.is_empty() {
            tracing::warn!(count = conflicts.len(), "apply aborted: conflicts detected");
            return Err(ApplyError::Conflicts(conflicts));
        }
    }

    let mut outcome = ApplyOutcome::default();

    let entry_results = join_all(
        entries
            .into_iter()
            .filter_map(|(key, entry)| by_service.get(&key.0).cloned().map(|strategy| (key, entry, strategy)))
            .map(|(key, entry, strategy)| {
                let sink = sink.clone();
                tokio::spawn(async move {
                    let result = strategy.apply_entry(&key.1, &entry).await;
                    if result.is_ok() {
                        sink.unstage_entry(&key).await;
                    }
                    (key, result)
                })
            }),
    )
    .await;

    for joined in entry_results {
        match joined {
            Ok((key, Ok(()))) => outcome.applied.push(key),
            Ok((key, Err(e))) => outcome.failed.push((key, e)),
            Err(join_err) => tracing::error!(%join_err, "apply task panicked"),
        }
    }

    let tag_results = join_all(
        tags.into_iter()
            .filter_map(|(key, tag)| by_service.get(&key.0).cloned().map(|strategy| (key, tag, strategy)))
            .map(|(key, tag, strategy)| {
                let sink = sink.clone();
                tokio::spawn(async move {
                    let result = strategy.apply_tags(&key.1, &tag).await;
                    if result.is_ok() {
                        sink.unstage_tag(&key).await;
                    }
                    (key, result)
                })
            }),
    )
    .await;

    for joined in tag_results {
        match joined {
            Ok((key, Ok(()))) => outcome.applied.push(key),
            Ok((key, Err(e))) => outcome.failed.push((key, e)),
            Err(join_err) => tracing::error!(%join_err, "apply task panicked"),
        }
    }

    outcome.applied.sort();
    outcome.failed.sort_by(|a, b| a.0.cmp(&b.0));

    for key in &outcome.applied {
        tracing::info!(name = %key.1, "applied");
    }
    for (key, err) in &outcome.failed {
        tracing::warn!(name = %key.1, error = %err, "apply failed");
    }

    if outcome.failed.is_empty() {
        Ok(outcome)
    } else {
        Err(ApplyError::PartialFailure(outcome))
    }
}

async fn detect_conflicts(
    entries: &[(Key, suve_record::Entry)],
    by_service: &HashMap<Service, Arc<dyn RemoteStrategy>>,
) -> Vec<ConflictDetail> {
    let checks = entries
        .iter()
        .filter_map(|(key, entry)| by_service.get(&key.0).cloned().map(|strategy| (key.clone(), entry.clone(), strategy)))
        .map(|(key, entry, strategy)| tokio::spawn(async move { check_one(&strategy, key, entry).await }));

    join_all(checks)
        .await
        .into_iter()
        .filter_map(|joined| joined.ok())
        .flatten()
        .collect()
}

async fn check_one(
    strategy: &Arc<dyn RemoteStrategy>,
    key: Key,
    entry: suve_record::Entry,
) -> Option<ConflictDetail> {
    let remote_last_modified = match strategy.fetch_last_modified(&key.1).await {
        Ok(v) => v,
        Err(e) => {
            // A conflict probe failure is not itself a conflict; the
            // subsequent apply attempt will surface it as a per-record
            // remote_failure instead.
            tracing::warn!(name = %key.1, error = %e, "conflict probe failed");
            return None;
        }
    };

    match (entry.operation, remote_last_modified) {
        (Operation::Create, Some(_)) => Some(conflict(key, ConflictKind::AlreadyExists)),
        (Operation::Create, None) => None,
        (Operation::Update, remote) => check_base(key, entry.base_modified_at, remote, true),
        (Operation::Delete, remote) => check_base(key, entry.base_modified_at, remote, false),
    }
}

fn check_base(
    key: Key,
    base_modified_at: Option<OffsetDateTime>,
    remote: Option<OffsetDateTime>,
    deleted_is_conflict: bool,
) -> Option<ConflictDetail> {
    match remote {
        None if deleted_is_conflict => Some(conflict(key, ConflictKind::Deleted)),
        None => None,
        Some(remote_ts) => match base_modified_at {
            Some(base) if remote_ts > base => Some(conflict(key, ConflictKind::Modified)),
            _ => None,
        },
    }
}

fn conflict(key: Key, kind: ConflictKind) -> ConflictDetail {
    ConflictDetail { key, kind }
}
