//! # aclife Ephemeral State
//!
//! Short-lived, concurrently accessed server state for aclife.
//!
//! This crate provides:
//! - [`TtlStore`], a sharded key/value store with per-entry expiry
//! - [`Sweeper`], a cancellable periodic task that evicts expired entries
//! - [`RateLimiter`], a sliding-window limiter keyed by client identity
//! - [`SubscriptionCache`], a billing-status cache with hard expiry
//!
//! # Time
//!
//! All ages are measured with [`tokio::time::Instant`], so tests can drive
//! expiry deterministically with a paused clock.
//!
//! ```rust,ignore
//! use aclife_ephemeral::{Sweeper, TtlStore};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let sessions = Arc::new(TtlStore::<String, u32>::new(Duration::from_secs(300)));
//! let sweeper = Sweeper::spawn("sessions", sessions.clone(), Duration::from_secs(60));
//! sessions.insert("abc".into(), 7);
//! // ...
//! sweeper.shutdown().await;
//! ```
//!
//! This crate performs no I/O.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod rate_limit;
mod store;
mod subscription;
mod sweeper;

pub use rate_limit::{RateLimiter, RatePolicy};
pub use store::TtlStore;
pub use subscription::SubscriptionCache;
pub use sweeper::{Sweep, Sweeper, MIN_SWEEP_INTERVAL};
