//! Last-write-wins calendar reconciliation.
//!
//! A client sends the `(id, timestamp)` pairs it holds. Every authoritative
//! event is then either new to the client, strictly newer than the client's
//! copy, or already current. Snapshot identifiers with no authoritative
//! counterpart were deleted. Edits are never merged below whole-event
//! granularity: the copy with the later timestamp replaces the other.

use crate::event::{CalendarEvent, TimestampMillis, WireEvent};
use crate::id::EventId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One `(id, last-known timestamp)` pair from a client's local cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Event identifier text, canonical or base64.
    pub id: String,
    /// Timestamp of the client's copy.
    pub ts: TimestampMillis,
}

impl SnapshotEntry {
    /// Creates an entry in canonical form.
    pub fn new(id: EventId, ts: TimestampMillis) -> Self {
        Self {
            id: id.to_string(),
            ts,
        }
    }
}

/// What a client must apply to catch up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncDiff {
    /// Events the client does not have.
    pub added: Vec<CalendarEvent>,
    /// Events the client holds an older copy of.
    pub updated: Vec<CalendarEvent>,
    /// Events the client holds that no longer exist.
    pub deleted: Vec<EventId>,
    /// Snapshot identifiers that could not be parsed and were ignored.
    pub skipped: Vec<String>,
}

impl SyncDiff {
    /// Returns true if the client is already current.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Converts to the response body.
    pub fn to_wire(&self) -> WireSyncDiff {
        WireSyncDiff {
            added: self.added.iter().map(WireEvent::from).collect(),
            updated: self.updated.iter().map(WireEvent::from).collect(),
            deleted: self.deleted.clone(),
        }
    }
}

/// Sync response body: `{added, updated, deleted}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireSyncDiff {
    /// Events the client does not have.
    pub added: Vec<WireEvent>,
    /// Events the client holds an older copy of.
    pub updated: Vec<WireEvent>,
    /// Identifiers the client should drop.
    pub deleted: Vec<EventId>,
}

/// Computes the diff between the authoritative events and a client snapshot.
///
/// If an identifier appears more than once in the snapshot, its last
/// occurrence wins.
pub fn reconcile(authoritative: &[CalendarEvent], snapshot: &[SnapshotEntry]) -> SyncDiff {
    let mut diff = SyncDiff::default();

    let mut known: HashMap<EventId, TimestampMillis> = HashMap::with_capacity(snapshot.len());
    let mut order = Vec::with_capacity(snapshot.len());
    for entry in snapshot {
        match EventId::parse_lenient(&entry.id) {
            Ok(id) => {
                if known.insert(id, entry.ts).is_none() {
                    order.push(id);
                }
            }
            Err(_) => diff.skipped.push(entry.id.clone()),
        }
    }

    let mut present = HashSet::with_capacity(authoritative.len());
    for event in authoritative {
        present.insert(event.id);
        match known.get(&event.id) {
            None => diff.added.push(event.clone()),
            Some(&ts) if event.updated_at > ts => diff.updated.push(event.clone()),
            Some(_) => {}
        }
    }

    diff.deleted = order
        .into_iter()
        .filter(|id| !present.contains(id))
        .collect();
    diff
}
