use chrono::{DateTime, Utc};
use serde::Serialize;

use super::link::OwnerRef;
use crate::ErrorKind;

/// Published after every successful assign/unassign
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AssignmentEvent {
    Assigned {
        table: &'static str,
        link_id: String,
        owner: OwnerRef,
        subject_id: String,
        position: String,
        at: DateTime<Utc>,
    },
    Unassigned {
        table: &'static str,
        link_id: String,
        owner: OwnerRef,
        subject_id: String,
        position: String,
        at: DateTime<Utc>,
    },
}

impl AssignmentEvent {
    pub fn subject_id(&self) -> &str {
        match self {
            AssignmentEvent::Assigned { subject_id, .. } | AssignmentEvent::Unassigned { subject_id, .. } => {
                subject_id
            }
        }
    }

    pub fn owner(&self) -> &OwnerRef {
        match self {
            AssignmentEvent::Assigned { owner, .. } | AssignmentEvent::Unassigned { owner, .. } => owner,
        }
    }
}

/// What `audit` found wrong
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum Problem {
    /// One subject holds more than one active row
    MultipleActive { subject_id: String },
    /// One owner position is held by more than one active row
    SharedPosition { owner_id: String, position: String },
}

/// A violated membership invariant. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsistencyIssue {
    pub table: &'static str,
    #[serde(flatten)]
    pub problem: Problem,
    pub link_ids: Vec<String>,
}

impl ConsistencyIssue {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ConsistencyWarning
    }
}

impl std::fmt::Display for ConsistencyIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.problem {
            Problem::MultipleActive { subject_id } => write!(
                f,
                "{}: {} has {} active rows ({})",
                self.table,
                subject_id,
                self.link_ids.len(),
                self.link_ids.join(", ")
            ),
            Problem::SharedPosition { owner_id, position } => write!(
                f,
                "{}: position {} on {} is held by {} active rows ({})",
                self.table,
                position,
                owner_id,
                self.link_ids.len(),
                self.link_ids.join(", ")
            ),
        }
    }
}
