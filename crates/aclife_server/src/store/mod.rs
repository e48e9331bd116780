//! Persistent storage collaborators.
//!
//! The core never talks to a database directly. It goes through these
//! traits, which a deployment implements over its relational store.
//! [`MemoryStore`] implements all three for tests and local runs.

mod memory;

pub use memory::{FailPoint, MemoryStore};

use crate::error::ServerError;
use aclife_protocol::{CalendarEvent, EventId, PublicAccount, TimestampMillis};
use async_trait::async_trait;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by a storage backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint was violated.
    #[error("duplicate {0}")]
    Duplicate(&'static str),

    /// Any other backend failure.
    #[error("backend failure: {0}")]
    Backend(String),
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate("email") => ServerError::Conflict("Email already in use.".into()),
            StoreError::Duplicate(what) => ServerError::Conflict(format!("Duplicate {what}.")),
            StoreError::Backend(detail) => ServerError::Internal(detail),
        }
    }
}

/// Internal account key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccountId(pub u64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered account with its password-proof credential.
///
/// Salts, verifier and challenge never change after registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Internal key.
    pub id: AccountId,
    /// Public identifier.
    pub uuid: Uuid,
    /// Identity (email address).
    pub email: String,
    /// Client key-derivation salt.
    pub salt: Vec<u8>,
    /// Password-proof protocol salt.
    pub srp_salt: Vec<u8>,
    /// Password-proof verifier.
    pub verifier: Vec<u8>,
    /// Client challenge blob.
    pub challenge: Vec<u8>,
    /// Billing customer identifier.
    pub customer_id: Option<String>,
    /// Billing subscription identifier.
    pub subscription_id: Option<String>,
    /// Last known billing status.
    pub subscription_status: Option<String>,
}

impl Account {
    /// The view returned to the account owner. Excludes the verifier and
    /// protocol salt.
    pub fn public_view(&self) -> PublicAccount {
        PublicAccount {
            uuid: self.uuid.to_string(),
            email: self.email.clone(),
            subscription_status: self.subscription_status.clone(),
            salt: self.salt.clone(),
            challenge: self.challenge.clone(),
        }
    }
}

/// Fields supplied at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    /// Identity (email address).
    pub email: String,
    /// Client key-derivation salt.
    pub salt: Vec<u8>,
    /// Password-proof protocol salt.
    pub srp_salt: Vec<u8>,
    /// Password-proof verifier.
    pub verifier: Vec<u8>,
    /// Client challenge blob.
    pub challenge: Vec<u8>,
}

/// A persisted access-token session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    /// Account the token belongs to.
    pub owner: AccountId,
    /// Opaque access token.
    pub token: String,
    /// Issue time.
    pub created_at: TimestampMillis,
    /// Expiry time.
    pub expires_at: TimestampMillis,
}

impl SessionRecord {
    /// Returns true once `now` has reached the expiry.
    pub fn is_expired(&self, now: TimestampMillis) -> bool {
        now >= self.expires_at
    }
}

/// Wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> TimestampMillis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, duration_millis)
}

/// A duration in whole milliseconds, saturating.
pub fn duration_millis(duration: Duration) -> TimestampMillis {
    TimestampMillis::try_from(duration.as_millis()).unwrap_or(TimestampMillis::MAX)
}

/// Account records.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Inserts a new account. Fails with [`StoreError::Duplicate`] if the
    /// email is taken.
    async fn insert_account(&self, account: NewAccount) -> StoreResult<Account>;

    /// Looks up an account by email.
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Account>>;

    /// Looks up an account by internal key.
    async fn find_by_id(&self, id: AccountId) -> StoreResult<Option<Account>>;

    /// Associates billing identifiers with an account. Returns false if the
    /// account does not exist.
    async fn link_subscription(
        &self,
        id: AccountId,
        customer_id: &str,
        subscription_id: &str,
    ) -> StoreResult<bool>;

    /// Stores a billing status for every account on the subscription.
    /// Returns the number of accounts updated.
    async fn set_subscription_status(&self, subscription_id: &str, status: &str)
        -> StoreResult<u64>;
}

/// Access-token sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persists a new session.
    async fn insert_session(&self, session: SessionRecord) -> StoreResult<()>;

    /// Looks up a session by token, expired or not.
    async fn find_session(&self, token: &str) -> StoreResult<Option<SessionRecord>>;

    /// Deletes a session. Returns whether one existed.
    async fn delete_session(&self, token: &str) -> StoreResult<bool>;
}

/// Calendar events, keyed by owner.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Loads every event the account owns.
    async fn load_events(&self, owner: AccountId) -> StoreResult<Vec<CalendarEvent>>;

    /// Starts an all-or-nothing batch of writes for one owner.
    async fn begin(&self, owner: AccountId) -> StoreResult<Box<dyn EventTransaction>>;
}

/// A pending batch of event writes.
///
/// Dropping a transaction without committing discards every write in it.
#[async_trait]
pub trait EventTransaction: Send {
    /// Deletes the owner's events with these identifiers. Returns how many
    /// were matched.
    async fn delete_events(&mut self, ids: &[EventId]) -> StoreResult<u64>;

    /// Inserts or fully replaces events by identifier.
    async fn upsert_events(&mut self, events: &[CalendarEvent]) -> StoreResult<()>;

    /// Makes every write in the batch visible at once.
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
