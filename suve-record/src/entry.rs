use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

/// One of the three mutations a staged `Entry` can represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

/// `SECRET`-only delete options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteOptions {
    pub force: bool,
    pub recovery_window_days: i64,
}

/// A staged value mutation for one `(Service, Name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub operation: Operation,
    pub value: Option<String>,
    pub description: Option<String>,
    pub type_hint: Option<String>,
    pub delete_options: Option<DeleteOptions>,
    #[serde(with = "time::serde::rfc3339")]
    pub staged_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub base_modified_at: Option<OffsetDateTime>,
}

impl Entry {
    /// True when `self` and `other` would produce the same diff output,
    /// i.e. ignore `staged_at`/`base_modified_at` bookkeeping and compare
    /// only the fields an operator actually cares about.
    pub fn semantically_equal(&self, other: &Entry) -> bool {
        self.operation == other.operation
            && self.value == other.value
            && self.description == other.description
            && self.type_hint == other.type_hint
    }
}
