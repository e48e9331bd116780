//! # aclife Protocol
//!
//! Wire types and the calendar reconciliation algorithm for aclife.
//!
//! This crate provides:
//! - [`EventId`] and [`CalendarEvent`] for encrypted calendar entries
//! - [`EventChange`] lists sent by clients when saving
//! - [`SnapshotEntry`] and [`reconcile`] for last-write-wins sync
//! - Authentication request/response messages
//! - The [`Reply`] envelope every response is wrapped in
//!
//! Event payloads are opaque ciphertext; nothing here looks inside them.
//! Byte fields travel as standard padded base64.
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod b64;
mod change;
mod error;
mod event;
mod id;
mod messages;
mod reconcile;

pub use change::{ChangeKind, ChangeSet, EventChange};
pub use error::{ProtocolError, ProtocolResult};
pub use event::{CalendarEvent, TimestampMillis, WireEvent};
pub use id::EventId;
pub use messages::{
    LoginChallenge, LoginStartReply, LoginStartRequest, LoginVerifyReply, LoginVerifyRequest,
    PublicAccount, RegisterRequest, Reply,
};
pub use reconcile::{reconcile, SnapshotEntry, SyncDiff, WireSyncDiff};
