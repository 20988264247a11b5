//! Auto-saved form drafts for crash recovery.
//!
//! Independent of the operation queue: a draft is only a convenience and is
//! cleared once its write has been queued or submitted.

mod autosave;
mod store;

pub use autosave::AutoSaver;
pub use store::{has_meaningful_content, Draft, DraftLoad, DraftStore};
