//! # aclife Server Core
//!
//! Password-proof authentication and calendar sync for aclife.
//!
//! This crate provides:
//! - SRP-6a registration and two-phase login ([`AuthService`])
//! - Access-token resolution ([`IdentityResolver`])
//! - Subscription gating backed by a billing source ([`SubscriptionGate`])
//! - Last-write-wins calendar save and sync ([`CalendarService`])
//! - A facade wiring them together behind per-route rate limits
//!   ([`AclifeServer`])
//!
//! # Collaborators
//!
//! Persistent storage, billing and push delivery are traits
//! ([`AccountStore`], [`SessionStore`], [`EventStore`], [`BillingSource`],
//! [`PushNotifier`]). [`MemoryStore`] implements the storage traits for
//! tests and local runs.
//!
//! # Errors
//!
//! Every operation returns [`ServerResult`]. Only
//! [`ServerError::public_message`] is meant for callers; authentication
//! failures share one message regardless of cause.
//!
//! # Deadlines
//!
//! Each request carries a [`Deadline`]. Storage, billing and protocol work
//! that outlives it fails with [`ServerError::Timeout`]; nothing is retried.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod auth;
mod billing;
mod calendar;
mod config;
mod deadline;
mod error;
mod identity;
mod push;
mod request;
mod server;
pub mod store;
mod subscription;

pub use aclife_ephemeral::RatePolicy;
pub use auth::client::{ClientError, ClientProof, KdfParams, LoginAttempt, PasswordProofClient};
pub use auth::{AuthService, LoginGrant, PendingLogin};
pub use billing::{BillingError, BillingSource, StaticBilling, ACTIVE_STATUS};
pub use calendar::{ApplySummary, CalendarService};
pub use config::{SecretKey, ServerConfig};
pub use deadline::Deadline;
pub use error::{AuthFailure, ServerError, ServerResult};
pub use identity::IdentityResolver;
pub use push::{LogNotifier, OriginClient, PushError, PushEvent, PushNotifier};
pub use request::{ClientKey, RequestContext, Route};
pub use server::{AclifeServer, Backends};
pub use store::{
    Account, AccountId, AccountStore, EventStore, EventTransaction, FailPoint, MemoryStore,
    NewAccount, SessionRecord, SessionStore, StoreError, StoreResult,
};
pub use subscription::SubscriptionGate;
