use std::collections::BTreeMap;

use suve_record::Name;
use suve_record::Service;

/// What the diff composer needs to know about a record's current remote
/// state — deliberately narrower than `suve_apply::RemoteStrategy`, which
/// also applies mutations: this crate only ever reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteRecord {
    pub value: Option<String>,
    pub tags: BTreeMap<String, String>,
}

/// The read-only half of the per-service remote capability. No concrete
/// AWS implementation ships in this crate.
#[async_trait::async_trait]
pub trait RemoteReader: Send + Sync {
    fn service(&self) -> Service;

    /// `Ok(None)` means the record does not exist remotely.
    async fn fetch(&self, name: &Name) -> Result<Option<RemoteRecord>, String>;
}
