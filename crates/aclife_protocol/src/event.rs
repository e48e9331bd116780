//! Encrypted calendar events.

use crate::b64;
use crate::error::{ProtocolError, ProtocolResult};
use crate::id::EventId;
use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch.
pub type TimestampMillis = i64;

/// A calendar event as stored server-side.
///
/// The payload is client-side ciphertext. Updates always replace payload and
/// timestamp together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    /// Event identifier.
    pub id: EventId,
    /// Opaque encrypted payload.
    pub payload: Vec<u8>,
    /// Last modification time.
    pub updated_at: TimestampMillis,
}

impl CalendarEvent {
    /// Creates an event.
    pub fn new(id: EventId, payload: Vec<u8>, updated_at: TimestampMillis) -> Self {
        Self {
            id,
            payload,
            updated_at,
        }
    }

    /// Converts to the wire representation.
    pub fn to_wire(&self) -> WireEvent {
        WireEvent {
            id: self.id.to_string(),
            data: b64::encode(&self.payload),
            updated_at: self.updated_at,
        }
    }
}

/// A calendar event as it travels over the wire.
///
/// Fields stay textual so a malformed entry can be skipped on its own rather
/// than failing the whole request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEvent {
    /// Event identifier text.
    pub id: String,
    /// Base64 ciphertext.
    pub data: String,
    /// Last modification time in milliseconds.
    #[serde(rename = "updatedAt")]
    pub updated_at: TimestampMillis,
}

impl WireEvent {
    /// Decodes the identifier and payload.
    pub fn decode(&self) -> ProtocolResult<CalendarEvent> {
        let id = EventId::parse_lenient(&self.id)?;
        let payload =
            b64::decode(&self.data).map_err(|_| ProtocolError::InvalidBase64 { field: "data" })?;
        Ok(CalendarEvent::new(id, payload, self.updated_at))
    }
}

impl From<&CalendarEvent> for WireEvent {
    fn from(event: &CalendarEvent) -> Self {
        event.to_wire()
    }
}
