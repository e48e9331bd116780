//! Error types for protocol decoding.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while decoding wire values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// An event identifier was not a 128-bit value in a recognized form.
    #[error("invalid event id: {0:?}")]
    InvalidEventId(String),

    /// A base64 field could not be decoded.
    #[error("invalid base64 in {field}")]
    InvalidBase64 {
        /// Name of the offending field.
        field: &'static str,
    },

    /// A change is missing a field its kind requires.
    #[error("{kind} change is missing {field}")]
    MissingField {
        /// Change kind.
        kind: &'static str,
        /// Missing field.
        field: &'static str,
    },

    /// A change carried an unrecognized kind.
    #[error("unknown change kind")]
    UnknownKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProtocolError::MissingField {
            kind: "deleted",
            field: "id",
        };
        assert_eq!(err.to_string(), "deleted change is missing id");
        assert!(ProtocolError::InvalidEventId("zz".into())
            .to_string()
            .contains("zz"));
    }
}
