//! Sliding-window rate limiting.
//!
//! Each client key owns a [`RateWindow`] behind its own mutex. Pruning, the
//! accept/reject decision and the append all happen while that mutex is held,
//! so two concurrent requests from one client can never both take the last
//! free slot. Different clients only share a shard lock for the brief lookup.

use crate::store::TtlStore;
use crate::sweeper::Sweep;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// A request budget: at most `max_requests` per rolling `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    /// Maximum accepted requests inside one window.
    pub max_requests: usize,
    /// Length of the rolling window.
    pub window: Duration,
}

impl RatePolicy {
    /// Creates a policy.
    pub const fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    /// `max_requests` per second.
    pub const fn per_second(max_requests: usize) -> Self {
        Self::new(max_requests, Duration::from_secs(1))
    }

    /// `max_requests` per minute.
    pub const fn per_minute(max_requests: usize) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }
}

#[derive(Debug, Default)]
struct RateWindow {
    hits: VecDeque<Instant>,
    /// Set by the sweeper when it unlinks this window from the store.
    retired: bool,
}

impl RateWindow {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.hits.front() {
            if now.saturating_duration_since(*oldest) > window {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }
}

type SharedWindow = Arc<Mutex<RateWindow>>;

/// Per-client sliding-window limiter shared by every route.
///
/// Windows untouched for longer than the retention period are discarded by
/// [`Sweep::sweep`]. The retention must be at least as long as the longest
/// policy window used with this limiter.
pub struct RateLimiter {
    windows: TtlStore<String, SharedWindow>,
}

impl RateLimiter {
    /// Creates a limiter that keeps idle client windows for `retention`.
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self {
            windows: TtlStore::new(retention),
        }
    }

    /// Records a request from `client` and returns whether it is within
    /// `max_requests` per `window`.
    pub fn allow(&self, client: &str, max_requests: usize, window: Duration) -> bool {
        loop {
            let shared = self
                .windows
                .get_or_insert_with(client.to_owned(), SharedWindow::default);
            let mut entry = shared.lock();
            if entry.retired {
                // Lost a race with the sweeper; fetch the replacement.
                continue;
            }

            let now = Instant::now();
            entry.prune(now, window);
            let allowed = entry.hits.len() < max_requests;
            if allowed {
                entry.hits.push_back(now);
            }
            // The sweeper locks shard then window; never the reverse.
            drop(entry);
            self.windows.touch(&client.to_owned());
            return allowed;
        }
    }

    /// Same as [`RateLimiter::allow`] with the budget taken from `policy`.
    pub fn check(&self, client: &str, policy: RatePolicy) -> bool {
        self.allow(client, policy.max_requests, policy.window)
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

impl Sweep for RateLimiter {
    fn sweep(&self) -> usize {
        let now = Instant::now();
        let retention = self.windows.ttl();
        self.windows.retain(|_, shared| {
            let mut entry = shared.lock();
            entry.prune(now, retention);
            if entry.hits.is_empty() {
                entry.retired = true;
                false
            } else {
                true
            }
        })
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("retention", &self.windows.ttl())
            .field("tracked_clients", &self.tracked_clients())
            .finish()
    }
}
