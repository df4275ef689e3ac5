//! Change set types.
//!
//! A change set is produced once per invocation and consumed by exactly one
//! executor run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ChangeSetError;

/// A lifecycle operation class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionClass {
    /// Provision a new resource.
    Create,
    /// Apply a changed definition to an existing resource.
    Update,
    /// Tear down a resource whose definition was removed.
    Delete,
}

impl ActionClass {
    /// All action classes, in execution order.
    pub const ALL: [Self; 3] = [Self::Create, Self::Update, Self::Delete];

    /// Returns the lower-case name of the action class.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for ActionClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource identifiers grouped by the operation they require.
///
/// The three lists are disjoint and contain no duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    created: Vec<String>,
    updated: Vec<String>,
    deleted: Vec<String>,
}

impl ChangeSet {
    /// Creates a change set, checking that identifiers are unique and that
    /// no identifier belongs to more than one action class.
    ///
    /// # Errors
    ///
    /// Returns an error if an identifier is duplicated or shared between
    /// action classes.
    pub fn new(
        created: Vec<String>,
        updated: Vec<String>,
        deleted: Vec<String>,
    ) -> std::result::Result<Self, ChangeSetError> {
        let mut seen: HashMap<&str, ActionClass> = HashMap::new();

        for (action, ids) in [
            (ActionClass::Create, &created),
            (ActionClass::Update, &updated),
            (ActionClass::Delete, &deleted),
        ] {
            for id in ids {
                match seen.get(id.as_str()) {
                    Some(&first) if first == action => {
                        return Err(ChangeSetError::Duplicate {
                            action,
                            id: id.clone(),
                        });
                    }
                    Some(&first) => {
                        return Err(ChangeSetError::Overlap {
                            id: id.clone(),
                            first,
                            second: action,
                        });
                    }
                    None => {
                        seen.insert(id, action);
                    }
                }
            }
        }

        Ok(Self {
            created,
            updated,
            deleted,
        })
    }

    /// Creates a change set where every identifier is newly created.
    ///
    /// # Errors
    ///
    /// Returns an error if an identifier is duplicated.
    pub fn created_only(created: Vec<String>) -> std::result::Result<Self, ChangeSetError> {
        Self::new(created, Vec::new(), Vec::new())
    }

    /// Identifiers to create.
    #[must_use]
    pub fn created(&self) -> &[String] {
        &self.created
    }

    /// Identifiers to update.
    #[must_use]
    pub fn updated(&self) -> &[String] {
        &self.updated
    }

    /// Identifiers to delete.
    #[must_use]
    pub fn deleted(&self) -> &[String] {
        &self.deleted
    }

    /// Identifiers for the given action class.
    #[must_use]
    pub fn ids(&self, action: ActionClass) -> &[String] {
        match action {
            ActionClass::Create => &self.created,
            ActionClass::Update => &self.updated,
            ActionClass::Delete => &self.deleted,
        }
    }

    /// Total number of distinct identifiers across all action classes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }

    /// Returns true if nothing changed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to delete",
            self.created.len(),
            self.updated.len(),
            self.deleted.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    #[test]
    fn test_len_counts_every_class() {
        let changes = ChangeSet::new(ids(&["a", "b"]), ids(&["c"]), ids(&["d", "e", "f"]))
            .expect("valid change set");
        assert_eq!(changes.len(), 6);
        assert!(!changes.is_empty());
        assert_eq!(changes.ids(ActionClass::Delete), ids(&["d", "e", "f"]).as_slice());
    }

    #[test]
    fn test_duplicate_rejected() {
        let err = ChangeSet::new(ids(&["a", "a"]), vec![], vec![]).unwrap_err();
        assert!(matches!(
            err,
            ChangeSetError::Duplicate { action: ActionClass::Create, ref id } if id == "a"
        ));
    }

    #[test]
    fn test_overlap_rejected() {
        let err = ChangeSet::new(ids(&["a"]), vec![], ids(&["a"])).unwrap_err();
        assert!(matches!(
            err,
            ChangeSetError::Overlap {
                first: ActionClass::Create,
                second: ActionClass::Delete,
                ..
            }
        ));
    }

    #[test]
    fn test_empty() {
        let changes = ChangeSet::default();
        assert!(changes.is_empty());
        assert_eq!(changes.to_string(), "0 to create, 0 to update, 0 to delete");
    }
}
