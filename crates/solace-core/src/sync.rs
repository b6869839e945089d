//! Optimistic synchronization of a locally mirrored collection.
//!
//! [`ItemStore`] is the collection a view owns and renders from.
//! [`MutationController`] is the only writer: updates are applied
//! locally first and rolled back if the backend does not confirm them,
//! deletes wait for confirmation before touching local state.

mod controller;
mod store;

pub use controller::{ConflictPolicy, MutationController};
pub use store::{ItemStore, Snapshot};
