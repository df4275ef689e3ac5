//! Change set module.
//!
//! This module holds the immutable record of which resource definitions were
//! created, updated, or deleted, and the git-backed detector that produces it.

mod git;
mod types;

pub use git::{GitDiff, parse_name_status};
pub use types::{ActionClass, ChangeSet};
