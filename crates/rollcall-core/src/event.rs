//! Attendance events and ENTRY/EXIT alternation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Direction of an attendance event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    Entry,
    Exit,
}

impl EventKind {
    /// The kind that must follow this one for the same person.
    pub fn opposite(self) -> EventKind {
        match self {
            EventKind::Entry => EventKind::Exit,
            EventKind::Exit => EventKind::Entry,
        }
    }

    /// Ledger wire form.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Entry => "ENTRY",
            EventKind::Exit => "EXIT",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ENTRY" => Ok(EventKind::Entry),
            "EXIT" => Ok(EventKind::Exit),
            other => Err(ParseKindError(other.to_string())),
        }
    }
}

#[derive(Error, Debug)]
#[error("unknown event kind {0:?} (expected ENTRY or EXIT)")]
pub struct ParseKindError(pub String);

/// One immutable attendance record.
///
/// Event order is the ledger's append order. Timestamps are expected to
/// follow it but are never used to re-sort history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceEvent {
    pub recorded_at: DateTime<Utc>,
    pub person_id: String,
    pub display_name: String,
    pub kind: EventKind,
}

/// Kind of the next event for a person, given their latest recorded kind.
///
/// A person with no history starts with ENTRY; afterwards kinds strictly
/// alternate regardless of wall-clock gaps.
pub fn next_kind(last: Option<EventKind>) -> EventKind {
    match last {
        None => EventKind::Entry,
        Some(kind) => kind.opposite(),
    }
}
