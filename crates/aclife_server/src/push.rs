//! "Data changed" fan-out to an account's other devices.

use crate::error::ServerError;
use crate::store::AccountId;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Length of a client instance tag.
pub const ORIGIN_CLIENT_LEN: usize = 6;

/// Short tag a client instance attaches to its writes, so it can ignore the
/// push caused by its own save.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OriginClient(String);

impl OriginClient {
    /// Accepts exactly six characters; anything else is not a tag.
    pub fn parse(tag: &str) -> Option<Self> {
        (tag.chars().count() == ORIGIN_CLIENT_LEN).then(|| Self(tag.to_owned()))
    }

    /// Returns the tag.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Payload delivered to an account's devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PushEvent {
    /// Calendar data changed; devices should sync.
    Sync {
        /// Tag of the device that made the change.
        #[serde(rename = "originClientId")]
        origin_client_id: String,
    },
    /// A user-facing notification.
    Notification {
        /// Notification title.
        title: String,
        /// Notification body.
        body: String,
    },
}

/// Errors reported by a push transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PushError {
    /// Delivery failed.
    #[error("push delivery failed: {0}")]
    Delivery(String),
}

impl From<PushError> for ServerError {
    fn from(err: PushError) -> Self {
        ServerError::Internal(err.to_string())
    }
}

/// Delivers a payload to every registered device of an account.
#[async_trait]
pub trait PushNotifier: Send + Sync {
    /// Sends `event` to the owner's devices.
    async fn notify(&self, owner: AccountId, event: PushEvent) -> Result<(), PushError>;
}

/// Push transport that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl PushNotifier for LogNotifier {
    async fn notify(&self, owner: AccountId, event: PushEvent) -> Result<(), PushError> {
        debug!(%owner, ?event, "push");
        Ok(())
    }
}
