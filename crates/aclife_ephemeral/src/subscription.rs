//! Billing subscription status cache.

use crate::store::TtlStore;
use crate::sweeper::Sweep;
use std::time::Duration;

/// Caches the billing status string of each subscription identifier.
///
/// A status is served only while its age is below the TTL; after that the
/// caller must go back to the billing source and [`SubscriptionCache::put`]
/// the fresh value.
#[derive(Debug)]
pub struct SubscriptionCache {
    statuses: TtlStore<String, String>,
}

impl SubscriptionCache {
    /// Creates a cache whose entries live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            statuses: TtlStore::new(ttl),
        }
    }

    /// Returns the cached status, if still fresh.
    pub fn get(&self, subscription_id: &str) -> Option<String> {
        self.statuses.get(&subscription_id.to_owned())
    }

    /// Caches `status` for a full TTL.
    pub fn put(&self, subscription_id: &str, status: &str) {
        self.statuses
            .insert(subscription_id.to_owned(), status.to_owned());
    }

    /// Drops any cached status for the subscription.
    pub fn invalidate(&self, subscription_id: &str) {
        self.statuses.remove(&subscription_id.to_owned());
    }

    /// Number of cached entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}

impl Sweep for SubscriptionCache {
    fn sweep(&self) -> usize {
        self.statuses.purge_expired()
    }
}
