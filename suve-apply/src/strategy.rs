use suve_record::Entry;
use suve_record::Key;
use suve_record::Name;
use suve_record::Service;
use suve_record::TagEntry;
use time::OffsetDateTime;

/// The per-service capability the apply engine drives: three methods plus
/// two descriptors. Concrete PARAM/SECRET implementations that actually
/// talk to AWS SSM/Secrets Manager live outside this crate, behind this
/// trait, so the conflict-detection and fan-out logic here stays testable
/// without a real AWS account.
#[async_trait::async_trait]
pub trait RemoteStrategy: Send + Sync {
    fn service(&self) -> Service;
    fn label(&self) -> &str;

    /// `Ok(None)` means the record does not exist remotely.
    async fn fetch_last_modified(&self, name: &Name) -> Result<Option<OffsetDateTime>, String>;
    async fn apply_entry(&self, name: &Name, entry: &Entry) -> Result<(), String>;
    async fn apply_tags(&self, name: &Name, tags: &TagEntry) -> Result<(), String>;
}

/// Callback the apply engine uses to unstage a record immediately after a
/// successful remote mutation. Implemented by `suve-client` against the
/// live agent in production, and by an in-memory fake in tests.
#[async_trait::async_trait]
pub trait UnstageSink: Send + Sync {
    async fn unstage_entry(&self, key: &Key);
    async fn unstage_tag(&self, key: &Key);
}
