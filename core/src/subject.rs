//! Bus subject naming.
//!
//! Subjects are derived from a resource kind (`networks` / `network`) and an
//! operation:
//!
//! | Subject | Direction |
//! |---|---|
//! | `<plural>.<op>` | request in |
//! | `<plural>.<op>.done`, `<plural>.<op>.error` | terminal notification out |
//! | `<singular>.<op>` | provision event out |
//! | `<singular>.<op>.done`, `<singular>.<op>.error` | item outcome in |

use serde::{Deserialize, Serialize};
use std::fmt;

/// Operation carried by an aggregate request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Create every item
    Create,
    /// Delete every item
    Delete,
}

impl Operation {
    /// Every supported operation.
    pub const ALL: [Self; 2] = [Self::Create, Self::Delete];

    /// Subject segment for this operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Names of the aggregate and of a single item, e.g. `networks` / `network`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceKind {
    /// Aggregate-level name
    pub plural: String,
    /// Item-level name
    pub singular: String,
}

impl ResourceKind {
    /// Create a resource kind.
    #[must_use]
    pub fn new(plural: impl Into<String>, singular: impl Into<String>) -> Self {
        Self {
            plural: plural.into(),
            singular: singular.into(),
        }
    }

    /// The default `networks` / `network` kind.
    #[must_use]
    pub fn networks() -> Self {
        Self::new("networks", "network")
    }
}

impl Default for ResourceKind {
    fn default() -> Self {
        Self::networks()
    }
}

/// Every subject involved in one operation over one resource kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subjects {
    /// Operation these subjects belong to
    pub operation: Operation,
    /// `<plural>.<op>`
    pub request: String,
    /// `<plural>.<op>.done`
    pub request_done: String,
    /// `<plural>.<op>.error`
    pub request_error: String,
    /// `<singular>.<op>`
    pub provision: String,
    /// `<singular>.<op>.done`
    pub item_done: String,
    /// `<singular>.<op>.error`
    pub item_error: String,
}

impl Subjects {
    /// Derive the subjects for `operation` on `kind`.
    #[must_use]
    pub fn new(kind: &ResourceKind, operation: Operation) -> Self {
        let request = format!("{}.{operation}", kind.plural);
        let provision = format!("{}.{operation}", kind.singular);

        Self {
            operation,
            request_done: format!("{request}.done"),
            request_error: format!("{request}.error"),
            item_done: format!("{provision}.done"),
            item_error: format!("{provision}.error"),
            request,
            provision,
        }
    }
}

/// What an inbound subject means to the coordinator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// A new aggregate request
    Request(Operation),
    /// An item finished successfully
    ItemDone(Operation),
    /// An item failed
    ItemError(Operation),
}

/// The subjects of every operation over one resource kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubjectTable {
    create: Subjects,
    delete: Subjects,
}

impl SubjectTable {
    /// Build the table for `kind`.
    #[must_use]
    pub fn new(kind: &ResourceKind) -> Self {
        Self {
            create: Subjects::new(kind, Operation::Create),
            delete: Subjects::new(kind, Operation::Delete),
        }
    }

    /// Subjects for one operation.
    #[must_use]
    pub const fn get(&self, operation: Operation) -> &Subjects {
        match operation {
            Operation::Create => &self.create,
            Operation::Delete => &self.delete,
        }
    }

    /// Every inbound subject, requests first.
    #[must_use]
    pub fn inbound(&self) -> Vec<&str> {
        let mut subjects: Vec<&str> = Operation::ALL.iter().map(|op| self.get(*op).request.as_str()).collect();
        for operation in Operation::ALL {
            let subjects_for = self.get(operation);
            subjects.push(subjects_for.item_done.as_str());
            subjects.push(subjects_for.item_error.as_str());
        }
        subjects
    }

    /// Classify an inbound subject; `None` for subjects this table does not handle.
    #[must_use]
    pub fn route(&self, subject: &str) -> Option<Route> {
        Operation::ALL.into_iter().find_map(|operation| {
            let subjects = self.get(operation);
            if subject == subjects.request {
                Some(Route::Request(operation))
            } else if subject == subjects.item_done {
                Some(Route::ItemDone(operation))
            } else if subject == subjects.item_error {
                Some(Route::ItemError(operation))
            } else {
                None
            }
        })
    }
}
