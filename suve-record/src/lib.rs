//! Core record types shared by every other crate in the workspace:
//! the immutable-valued `Entry` and `TagEntry` staged mutations, the
//! `Service`/`Name` keys that namespace them, and the `State` they live in.
//!
//! This crate has no I/O and no async — it is pure data plus the
//! comparators the diff composer and the agent state need.

mod entry;
mod service;
mod state;
mod tag;

pub use entry::DeleteOptions;
pub use entry::Entry;
pub use entry::Operation;
pub use service::Name;
pub use service::Service;
pub use state::Key;
pub use state::State;
pub use tag::TagEntry;
