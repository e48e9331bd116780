//! Calendar save and sync for one account.

use crate::deadline::Deadline;
use crate::error::ServerResult;
use crate::push::{OriginClient, PushEvent, PushNotifier};
use crate::store::{AccountId, EventStore, StoreError};
use aclife_protocol::{reconcile, ChangeSet, EventChange, SnapshotEntry, SyncDiff};
use std::sync::Arc;
use tracing::{debug, warn};

/// What a save did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    /// Stored events matched by the delete statement.
    pub deleted: u64,
    /// Events inserted or replaced.
    pub upserted: usize,
    /// Changes skipped because they could not be decoded.
    pub rejected: usize,
}

/// Applies change lists and answers sync requests.
pub struct CalendarService {
    events: Arc<dyn EventStore>,
    push: Arc<dyn PushNotifier>,
}

impl CalendarService {
    /// Creates the service.
    pub fn new(events: Arc<dyn EventStore>, push: Arc<dyn PushNotifier>) -> Self {
        Self { events, push }
    }

    /// Applies a change list as one all-or-nothing batch.
    ///
    /// Undecodable changes are logged and skipped. When the caller sent an
    /// instance tag, the owner's other devices are told to sync once the
    /// batch has committed.
    pub async fn apply_changes(
        &self,
        owner: AccountId,
        changes: &[EventChange],
        origin: Option<&OriginClient>,
        deadline: &Deadline,
    ) -> ServerResult<ApplySummary> {
        let set = ChangeSet::decode(changes);
        for (index, err) in &set.rejected {
            warn!(user_id = %owner, index, error = %err, "skipping malformed change");
        }
        let mut summary = ApplySummary {
            rejected: set.rejected.len(),
            ..ApplySummary::default()
        };
        if set.is_empty() {
            return Ok(summary);
        }

        // A transaction dropped before commit, including on timeout, rolls back.
        summary.deleted = deadline
            .run("apply_changes", async {
                let mut tx = self.events.begin(owner).await?;
                let deleted = if set.deletes.is_empty() {
                    0
                } else {
                    tx.delete_events(&set.deletes).await?
                };
                if !set.upserts.is_empty() {
                    tx.upsert_events(&set.upserts).await?;
                }
                tx.commit().await?;
                Ok::<_, StoreError>(deleted)
            })
            .await?;
        summary.upserted = set.upserts.len();
        debug!(
            user_id = %owner,
            deleted = summary.deleted,
            upserted = summary.upserted,
            "changes applied"
        );

        if let Some(origin) = origin {
            self.announce(owner, origin);
        }
        Ok(summary)
    }

    /// Computes what the caller's snapshot is missing.
    pub async fn sync(
        &self,
        owner: AccountId,
        snapshot: &[SnapshotEntry],
        deadline: &Deadline,
    ) -> ServerResult<SyncDiff> {
        let events = deadline
            .run("load_events", self.events.load_events(owner))
            .await?;
        let diff = reconcile(&events, snapshot);
        for id in &diff.skipped {
            warn!(user_id = %owner, id = %id, "skipping unparseable snapshot id");
        }
        debug!(
            user_id = %owner,
            added = diff.added.len(),
            updated = diff.updated.len(),
            deleted = diff.deleted.len(),
            "sync computed"
        );
        Ok(diff)
    }

    /// Sends a user-facing notification to every device of `owner` and waits
    /// for the transport to accept it.
    pub async fn notify_devices(
        &self,
        owner: AccountId,
        title: &str,
        body: &str,
        deadline: &Deadline,
    ) -> ServerResult<()> {
        let event = PushEvent::Notification {
            title: title.to_owned(),
            body: body.to_owned(),
        };
        deadline
            .run("push_notification", self.push.notify(owner, event))
            .await?;
        debug!(user_id = %owner, "notification sent");
        Ok(())
    }

    /// Fans out a sync signal without waiting for it.
    fn announce(&self, owner: AccountId, origin: &OriginClient) {
        let push = Arc::clone(&self.push);
        let event = PushEvent::Sync {
            origin_client_id: origin.as_str().to_owned(),
        };
        tokio::spawn(async move {
            if let Err(err) = push.notify(owner, event).await {
                warn!(user_id = %owner, error = %err, "push fan-out failed");
            }
        });
    }
}

impl std::fmt::Debug for CalendarService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalendarService").finish_non_exhaustive()
    }
}
