//! Error types for the server core.
//!
//! Every failure a caller can see is one of six kinds. Only
//! [`ServerError::public_message`] is ever shown to a caller; the `Display`
//! output carries diagnostic detail and is meant for logs.

use aclife_protocol::Reply;
use std::fmt;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Why a caller was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthFailure {
    /// Wrong identity, password, proof or ephemeral value.
    InvalidCredentials,
    /// The login exchange does not exist or has expired.
    ExpiredSession,
    /// The login exchange belongs to another identity.
    InvalidSession,
    /// No valid access token.
    NotLoggedIn,
    /// No active subscription.
    SubscriptionRequired,
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuthFailure::InvalidCredentials => "Invalid credentials.",
            AuthFailure::ExpiredSession => "Invalid or expired session.",
            AuthFailure::InvalidSession => "Invalid session.",
            AuthFailure::NotLoggedIn => "You are not logged in.",
            AuthFailure::SubscriptionRequired => "Invalid subscription.",
        })
    }
}

/// Errors that can occur in the server core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    /// Malformed, oversized or missing input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Uniqueness violation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Authentication or authorization refused.
    #[error("unauthorized: {0}")]
    Unauthorized(AuthFailure),

    /// Request budget exhausted.
    #[error("rate limited")]
    RateLimited,

    /// The request deadline passed.
    #[error("deadline exceeded during {operation}")]
    Timeout {
        /// Operation that was running.
        operation: &'static str,
    },

    /// Storage or infrastructure failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Shorthand for [`AuthFailure::InvalidCredentials`].
    pub fn invalid_credentials() -> Self {
        ServerError::Unauthorized(AuthFailure::InvalidCredentials)
    }

    /// Message safe to show to the caller.
    pub fn public_message(&self) -> String {
        match self {
            ServerError::InvalidInput(_) => "Bad request.".to_owned(),
            ServerError::Conflict(message) => message.clone(),
            ServerError::Unauthorized(failure) => failure.to_string(),
            ServerError::RateLimited => "Too many requests.".to_owned(),
            ServerError::Timeout { .. } => "Request timed out.".to_owned(),
            ServerError::Internal(_) => "An unexpected error occurred.".to_owned(),
        }
    }

    /// Conventional HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            ServerError::InvalidInput(_) => 400,
            ServerError::Conflict(_) => 409,
            ServerError::Unauthorized(AuthFailure::SubscriptionRequired) => 402,
            ServerError::Unauthorized(_) => 401,
            ServerError::RateLimited => 429,
            ServerError::Timeout { .. } => 408,
            ServerError::Internal(_) => 500,
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        !self.is_server_error()
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(self, ServerError::Internal(_))
    }

    /// Converts to a failed response envelope.
    pub fn to_reply<T>(&self) -> Reply<T> {
        Reply::failure(self.public_message())
    }
}
