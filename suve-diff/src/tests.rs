use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use suve_record::Entry;
use suve_record::Name;
use suve_record::Operation;
use suve_record::Service;
use suve_record::State;
use time::macros::datetime;

use super::*;

struct FakeReader {
    service: Service,
    remote: HashMap<Name, RemoteRecord>,
}

#[async_trait]
impl RemoteReader for FakeReader {
    fn service(&self) -> Service {
        self.service
    }

    async fn fetch(&self, name: &Name) -> Result<Option<RemoteRecord>, String> {
        Ok(self.remote.get(name).cloned())
    }
}

#[derive(Default)]
struct FakeSink {
    unstaged: Mutex<Vec<Key>>,
}

#[async_trait]
impl DiffSink for FakeSink {
    async fn unstage_entry(&self, key: &Key) {
        self.unstaged.lock().unwrap_or_else(|p| p.into_inner()).push(key.clone());
    }
}

fn entry(operation: Operation, value: &str) -> Entry {
    Entry {
        operation,
        value: Some(value.into()),
        description: None,
        type_hint: None,
        delete_options: None,
        staged_at: datetime!(2026-01-01 00:00:00 UTC),
        base_modified_at: None,
    }
}

#[tokio::test]
async fn update_identical_to_remote_is_auto_unstaged() {
    let mut state = State::default();
    let key: Key = (Service::Param, Name::from("/a"));
    state.insert_entry(key.clone(), entry(Operation::Update, "same"));

    let reader = Arc::new(FakeReader {
        service: Service::Param,
        remote: HashMap::from([(
            Name::from("/a"),
            RemoteRecord { value: Some("same".into()), tags: BTreeMap::new() },
        )]),
    });
    let sink = Arc::new(FakeSink::default());

    let outcomes = diff_entries(&state, &[reader as Arc<dyn RemoteReader>], sink.clone(), false).await;

    assert_eq!(outcomes, vec![EntryOutcome::AutoUnstaged { key: key.clone(), reason: AutoUnstageReason::IdenticalToRemote }]);
    assert_eq!(*sink.unstaged.lock().unwrap(), vec![key]);
}

#[tokio::test]
async fn update_on_missing_remote_is_auto_unstaged_no_longer_exists() {
    let mut state = State::default();
    let key: Key = (Service::Param, Name::from("/a"));
    state.insert_entry(key.clone(), entry(Operation::Update, "v2"));

    let reader = Arc::new(FakeReader { service: Service::Param, remote: HashMap::new() });
    let sink = Arc::new(FakeSink::default());

    let outcomes = diff_entries(&state, &[reader as Arc<dyn RemoteReader>], sink, false).await;
    assert_eq!(outcomes, vec![EntryOutcome::AutoUnstaged { key, reason: AutoUnstageReason::NoLongerExists }]);
}

#[tokio::test]
async fn delete_on_missing_remote_is_auto_unstaged_already_deleted() {
    let mut state = State::default();
    let key: Key = (Service::Param, Name::from("/a"));
    state.insert_entry(key.clone(), entry(Operation::Delete, "v1"));

    let reader = Arc::new(FakeReader { service: Service::Param, remote: HashMap::new() });
    let sink = Arc::new(FakeSink::default());

    let outcomes = diff_entries(&state, &[reader as Arc<dyn RemoteReader>], sink, false).await;
    assert_eq!(outcomes, vec![EntryOutcome::AutoUnstaged { key, reason: AutoUnstageReason::AlreadyDeleted }]);
}

#[tokio::test]
async fn update_with_differing_remote_produces_a_diff_line() {
    let mut state = State::default();
    let key: Key = (Service::Param, Name::from("/a"));
    state.insert_entry(key.clone(), entry(Operation::Update, "v2"));

    let reader = Arc::new(FakeReader {
        service: Service::Param,
        remote: HashMap::from([(
            Name::from("/a"),
            RemoteRecord { value: Some("v1".into()), tags: BTreeMap::new() },
        )]),
    });
    let sink = Arc::new(FakeSink::default());

    let outcomes = diff_entries(&state, &[reader as Arc<dyn RemoteReader>], sink.clone(), false).await;
    assert_eq!(
        outcomes,
        vec![EntryOutcome::Diff(DiffLine {
            key,
            operation: Operation::Update,
            remote_value: Some("v1".into()),
            staged_value: Some("v2".into()),
        })]
    );
    assert!(sink.unstaged.lock().unwrap().is_empty());
}

#[tokio::test]
async fn create_on_missing_remote_is_the_expected_preview_path() {
    let mut state = State::default();
    let key: Key = (Service::Param, Name::from("/new"));
    state.insert_entry(key.clone(), entry(Operation::Create, "v1"));

    let reader = Arc::new(FakeReader { service: Service::Param, remote: HashMap::new() });
    let sink = Arc::new(FakeSink::default());

    let outcomes = diff_entries(&state, &[reader as Arc<dyn RemoteReader>], sink, false).await;
    assert_eq!(
        outcomes,
        vec![EntryOutcome::Diff(DiffLine {
            key,
            operation: Operation::Create,
            remote_value: None,
            staged_value: Some("v1".into()),
        })]
    );
}

#[tokio::test]
async fn json_canonicalization_treats_reordered_keys_as_identical() {
    let mut state = State::default();
    let key: Key = (Service::Param, Name::from("/cfg"));
    state.insert_entry(key.clone(), entry(Operation::Update, r#"{"a":1,"b":2}"#));

    let reader = Arc::new(FakeReader {
        service: Service::Param,
        remote: HashMap::from([(
            Name::from("/cfg"),
            RemoteRecord { value: Some(r#"{"b":2,"a":1}"#.into()), tags: BTreeMap::new() },
        )]),
    });
    let sink = Arc::new(FakeSink::default());

    let outcomes = diff_entries(&state, &[reader as Arc<dyn RemoteReader>], sink, true).await;
    assert_eq!(outcomes, vec![EntryOutcome::AutoUnstaged { key, reason: AutoUnstageReason::IdenticalToRemote }]);
}

#[test]
fn tag_diff_reports_known_value_for_removed_keys() {
    use suve_record::TagEntry;
    use std::collections::BTreeSet;

    let mut state = State::default();
    let key: Key = (Service::Param, Name::from("/a"));
    state.insert_tag(
        key.clone(),
        TagEntry {
            add: BTreeMap::from([("env".to_string(), "prod".to_string())]),
            remove: BTreeSet::from(["owner".to_string()]),
            staged_at: datetime!(2026-01-01 00:00:00 UTC),
        },
    );

    let remote_tags = HashMap::from([(key.clone(), BTreeMap::from([("owner".to_string(), "alice".to_string())]))]);
    let lines = diff_tags(&state, &remote_tags);

    assert!(lines.contains(&TagDiffLine::Add { key: key.clone(), tag: "env".into(), value: "prod".into() }));
    assert!(lines.contains(&TagDiffLine::Remove {
        key,
        tag: "owner".into(),
        known_value: Some("alice".into()),
    }));
}
