//! Calendar event identifier.

use crate::error::{ProtocolError, ProtocolResult};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

const CANONICAL_LEN: usize = 36;

/// 128-bit identifier of a calendar event.
///
/// The canonical text form is the hyphenated lowercase UUID layout
/// (`xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`), used both in storage and in
/// every response.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId([u8; 16]);

impl EventId {
    /// Creates an event ID from raw bytes.
    #[inline]
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Creates a new random event ID.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4().into_bytes())
    }

    /// Returns the raw bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Parses the canonical hyphenated form. Hex digits may be either case.
    pub fn parse(text: &str) -> ProtocolResult<Self> {
        if text.len() != CANONICAL_LEN {
            return Err(ProtocolError::InvalidEventId(text.to_owned()));
        }
        Uuid::parse_str(text)
            .map(|uuid| Self(uuid.into_bytes()))
            .map_err(|_| ProtocolError::InvalidEventId(text.to_owned()))
    }

    /// Decodes standard base64 of the 16 raw bytes.
    pub fn from_base64(text: &str) -> ProtocolResult<Self> {
        let bytes = STANDARD
            .decode(text)
            .map_err(|_| ProtocolError::InvalidEventId(text.to_owned()))?;
        <[u8; 16]>::try_from(bytes.as_slice())
            .map(Self)
            .map_err(|_| ProtocolError::InvalidEventId(text.to_owned()))
    }

    /// Accepts either the canonical form or base64 of the raw bytes.
    ///
    /// Older web clients keep base64 identifiers in their local cache and
    /// send them back verbatim in sync snapshots.
    pub fn parse_lenient(text: &str) -> ProtocolResult<Self> {
        if text.len() == CANONICAL_LEN {
            Self::parse(text)
        } else {
            Self::from_base64(text)
        }
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({self})")
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Uuid::from_bytes(self.0).hyphenated())
    }
}

impl FromStr for EventId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.into_bytes())
    }
}

impl Serialize for EventId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "0f1e2d3c-4b5a-6978-8796-a5b4c3d2e1f0";

    #[test]
    fn canonical_display() {
        let id = EventId::parse(TEXT).unwrap();
        assert_eq!(id.to_string(), TEXT);
    }

    #[test]
    fn uppercase_normalized() {
        let id = EventId::parse(&TEXT.to_uppercase()).unwrap();
        assert_eq!(id.to_string(), TEXT);
    }

    #[test]
    fn non_canonical_forms_rejected() {
        assert!(EventId::parse("0f1e2d3c4b5a69788796a5b4c3d2e1f0").is_err());
        assert!(EventId::parse("").is_err());
        assert!(EventId::parse("zz1e2d3c-4b5a-6978-8796-a5b4c3d2e1f0").is_err());
    }

    #[test]
    fn base64_form() {
        let id = EventId::parse(TEXT).unwrap();
        let encoded = STANDARD.encode(id.as_bytes());
        assert_eq!(EventId::from_base64(&encoded).unwrap(), id);
        assert_eq!(EventId::parse_lenient(&encoded).unwrap(), id);
        assert_eq!(EventId::parse_lenient(TEXT).unwrap(), id);
    }

    #[test]
    fn base64_wrong_length_rejected() {
        let short = STANDARD.encode([1u8; 15]);
        assert!(EventId::from_base64(&short).is_err());
        assert!(EventId::parse_lenient("not base64!").is_err());
    }

    #[test]
    fn serde_uses_canonical_text() {
        let id = EventId::parse(TEXT).unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{TEXT}\""));
        let back: EventId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn random_is_unique() {
        assert_ne!(EventId::random(), EventId::random());
    }
}
