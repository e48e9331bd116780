//! In-memory storage backend.
//!
//! Backs every storage trait with `parking_lot` maps. Supports one-shot
//! fault injection and artificial latency so callers' error and deadline
//! paths can be exercised without a database.

use super::{
    Account, AccountId, AccountStore, EventStore, EventTransaction, NewAccount, SessionRecord,
    SessionStore, StoreError, StoreResult,
};
use aclife_protocol::{CalendarEvent, EventId};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Storage operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    /// [`AccountStore::insert_account`].
    InsertAccount,
    /// [`AccountStore::find_by_email`] and [`AccountStore::find_by_id`].
    FindAccount,
    /// [`AccountStore::set_subscription_status`].
    SetSubscriptionStatus,
    /// [`SessionStore::insert_session`].
    InsertSession,
    /// [`SessionStore::find_session`].
    FindSession,
    /// [`EventStore::load_events`].
    LoadEvents,
    /// [`EventTransaction::delete_events`].
    DeleteEvents,
    /// [`EventTransaction::upsert_events`].
    UpsertEvents,
    /// [`EventTransaction::commit`].
    Commit,
}

#[derive(Default)]
struct Accounts {
    next_id: u64,
    by_id: HashMap<AccountId, Account>,
    by_email: HashMap<String, AccountId>,
}

#[derive(Default)]
struct Inner {
    accounts: RwLock<Accounts>,
    sessions: RwLock<HashMap<String, SessionRecord>>,
    events: RwLock<HashMap<AccountId, BTreeMap<EventId, CalendarEvent>>>,
    armed: Mutex<HashSet<FailPoint>>,
    latency: Mutex<Duration>,
}

impl Inner {
    async fn enter(&self, point: FailPoint) -> StoreResult<()> {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.armed.lock().remove(&point) {
            return Err(StoreError::Backend(format!("injected failure at {point:?}")));
        }
        Ok(())
    }
}

/// In-memory implementation of every storage trait.
///
/// Cloning is cheap and clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next call at `point` fail with a backend error.
    pub fn fail_next(&self, point: FailPoint) {
        self.inner.armed.lock().insert(point);
    }

    /// Delays every operation by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.inner.latency.lock() = latency;
    }

    /// Number of registered accounts.
    pub fn account_count(&self) -> usize {
        self.inner.accounts.read().by_id.len()
    }

    /// Number of persisted sessions.
    pub fn session_count(&self) -> usize {
        self.inner.sessions.read().len()
    }

    /// Snapshot of an owner's events, sorted by identifier.
    pub fn events_of(&self, owner: AccountId) -> Vec<CalendarEvent> {
        self.inner
            .events
            .read()
            .get(&owner)
            .map(|events| events.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("accounts", &self.account_count())
            .field("sessions", &self.session_count())
            .finish()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn insert_account(&self, account: NewAccount) -> StoreResult<Account> {
        self.inner.enter(FailPoint::InsertAccount).await?;
        let mut accounts = self.inner.accounts.write();
        if accounts.by_email.contains_key(&account.email) {
            return Err(StoreError::Duplicate("email"));
        }

        accounts.next_id += 1;
        let id = AccountId(accounts.next_id);
        let record = Account {
            id,
            uuid: Uuid::new_v4(),
            email: account.email,
            salt: account.salt,
            srp_salt: account.srp_salt,
            verifier: account.verifier,
            challenge: account.challenge,
            customer_id: None,
            subscription_id: None,
            subscription_status: None,
        };
        accounts.by_email.insert(record.email.clone(), id);
        accounts.by_id.insert(id, record.clone());
        Ok(record)
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        self.inner.enter(FailPoint::FindAccount).await?;
        let accounts = self.inner.accounts.read();
        Ok(accounts
            .by_email
            .get(email)
            .and_then(|id| accounts.by_id.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: AccountId) -> StoreResult<Option<Account>> {
        self.inner.enter(FailPoint::FindAccount).await?;
        Ok(self.inner.accounts.read().by_id.get(&id).cloned())
    }

    async fn link_subscription(
        &self,
        id: AccountId,
        customer_id: &str,
        subscription_id: &str,
    ) -> StoreResult<bool> {
        let mut accounts = self.inner.accounts.write();
        match accounts.by_id.get_mut(&id) {
            Some(account) => {
                account.customer_id = Some(customer_id.to_owned());
                account.subscription_id = Some(subscription_id.to_owned());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_subscription_status(
        &self,
        subscription_id: &str,
        status: &str,
    ) -> StoreResult<u64> {
        self.inner.enter(FailPoint::SetSubscriptionStatus).await?;
        let mut accounts = self.inner.accounts.write();
        let mut updated = 0;
        for account in accounts.by_id.values_mut() {
            if account.subscription_id.as_deref() == Some(subscription_id) {
                account.subscription_status = Some(status.to_owned());
                updated += 1;
            }
        }
        Ok(updated)
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(&self, session: SessionRecord) -> StoreResult<()> {
        self.inner.enter(FailPoint::InsertSession).await?;
        let mut sessions = self.inner.sessions.write();
        if sessions.contains_key(&session.token) {
            return Err(StoreError::Duplicate("session token"));
        }
        sessions.insert(session.token.clone(), session);
        Ok(())
    }

    async fn find_session(&self, token: &str) -> StoreResult<Option<SessionRecord>> {
        self.inner.enter(FailPoint::FindSession).await?;
        Ok(self.inner.sessions.read().get(token).cloned())
    }

    async fn delete_session(&self, token: &str) -> StoreResult<bool> {
        Ok(self.inner.sessions.write().remove(token).is_some())
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn load_events(&self, owner: AccountId) -> StoreResult<Vec<CalendarEvent>> {
        self.inner.enter(FailPoint::LoadEvents).await?;
        Ok(self.events_of(owner))
    }

    async fn begin(&self, owner: AccountId) -> StoreResult<Box<dyn EventTransaction>> {
        Ok(Box::new(MemoryTransaction {
            inner: Arc::clone(&self.inner),
            owner,
            deletes: Vec::new(),
            upserts: Vec::new(),
        }))
    }
}

/// Writes are staged locally and applied under one lock on commit.
struct MemoryTransaction {
    inner: Arc<Inner>,
    owner: AccountId,
    deletes: Vec<EventId>,
    upserts: Vec<CalendarEvent>,
}

#[async_trait]
impl EventTransaction for MemoryTransaction {
    async fn delete_events(&mut self, ids: &[EventId]) -> StoreResult<u64> {
        self.inner.enter(FailPoint::DeleteEvents).await?;
        let matched = {
            let events = self.inner.events.read();
            events
                .get(&self.owner)
                .map(|owned| ids.iter().filter(|id| owned.contains_key(*id)).count())
                .unwrap_or(0)
        };
        self.deletes.extend_from_slice(ids);
        Ok(matched as u64)
    }

    async fn upsert_events(&mut self, events: &[CalendarEvent]) -> StoreResult<()> {
        self.inner.enter(FailPoint::UpsertEvents).await?;
        self.upserts.extend_from_slice(events);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTransaction {
            inner,
            owner,
            deletes,
            upserts,
        } = *self;
        inner.enter(FailPoint::Commit).await?;
        let mut events = inner.events.write();
        let owned = events.entry(owner).or_default();
        for id in &deletes {
            owned.remove(id);
        }
        for event in upserts {
            owned.insert(event.id, event);
        }
        Ok(())
    }
}
