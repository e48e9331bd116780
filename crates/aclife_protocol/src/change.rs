//! Client change lists.

use crate::error::{ProtocolError, ProtocolResult};
use crate::event::{CalendarEvent, WireEvent};
use crate::id::EventId;
use serde::{Deserialize, Serialize};

/// Kind of change a client reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// A new event.
    Added,
    /// A modified event.
    Updated,
    /// A removed event.
    Deleted,
}

impl ChangeKind {
    /// Returns the wire tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Updated => "updated",
            ChangeKind::Deleted => "deleted",
        }
    }

    /// Parses a wire tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "added" => Some(ChangeKind::Added),
            "updated" => Some(ChangeKind::Updated),
            "deleted" => Some(ChangeKind::Deleted),
            _ => None,
        }
    }
}

/// One entry of a client's change list: `{type, id?, event?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventChange {
    /// Wire tag of the change kind.
    #[serde(rename = "type")]
    pub kind: String,
    /// Identifier of a deleted event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Full event for additions and updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<WireEvent>,
}

impl EventChange {
    /// An addition.
    pub fn added(event: &CalendarEvent) -> Self {
        Self::upsert(ChangeKind::Added, event)
    }

    /// An update.
    pub fn updated(event: &CalendarEvent) -> Self {
        Self::upsert(ChangeKind::Updated, event)
    }

    /// A deletion.
    pub fn deleted(id: EventId) -> Self {
        Self {
            kind: ChangeKind::Deleted.as_str().to_owned(),
            id: Some(id.to_string()),
            event: None,
        }
    }

    fn upsert(kind: ChangeKind, event: &CalendarEvent) -> Self {
        Self {
            kind: kind.as_str().to_owned(),
            id: None,
            event: Some(event.to_wire()),
        }
    }
}

/// A decoded change list, split into the two batch statements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Identifiers to delete.
    pub deletes: Vec<EventId>,
    /// Events to insert or replace.
    pub upserts: Vec<CalendarEvent>,
    /// Changes that could not be decoded, by position in the input.
    pub rejected: Vec<(usize, ProtocolError)>,
}

impl ChangeSet {
    /// Decodes every change independently; failures land in `rejected`.
    pub fn decode(changes: &[EventChange]) -> Self {
        let mut set = Self::default();
        for (index, change) in changes.iter().enumerate() {
            match Self::decode_one(change) {
                Ok(Decoded::Delete(id)) => set.deletes.push(id),
                Ok(Decoded::Upsert(event)) => set.upserts.push(event),
                Err(err) => set.rejected.push((index, err)),
            }
        }
        set
    }

    fn decode_one(change: &EventChange) -> ProtocolResult<Decoded> {
        let kind = ChangeKind::from_tag(&change.kind).ok_or(ProtocolError::UnknownKind)?;
        match kind {
            ChangeKind::Deleted => {
                let id = change.id.as_deref().ok_or(ProtocolError::MissingField {
                    kind: kind.as_str(),
                    field: "id",
                })?;
                Ok(Decoded::Delete(EventId::parse_lenient(id)?))
            }
            ChangeKind::Added | ChangeKind::Updated => {
                let event = change.event.as_ref().ok_or(ProtocolError::MissingField {
                    kind: kind.as_str(),
                    field: "event",
                })?;
                Ok(Decoded::Upsert(event.decode()?))
            }
        }
    }

    /// Returns true if there is nothing to write.
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.upserts.is_empty()
    }
}

enum Decoded {
    Delete(EventId),
    Upsert(CalendarEvent),
}
