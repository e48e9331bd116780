//! Request deadlines.

use crate::error::{ServerError, ServerResult};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// The instant by which a request must finish.
///
/// Every call that leaves the process goes through [`Deadline::run`], so a
/// slow collaborator yields [`ServerError::Timeout`] instead of a hung
/// request. Nothing is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline(Instant);

impl Deadline {
    /// A deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    /// A deadline at a fixed instant.
    pub fn at(instant: Instant) -> Self {
        Self(instant)
    }

    /// The deadline instant.
    pub fn instant(&self) -> Instant {
        self.0
    }

    /// Time left before the deadline.
    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    /// Returns true once the deadline has passed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.0
    }

    /// Fails with a timeout if the deadline has already passed.
    pub fn check(&self, operation: &'static str) -> ServerResult<()> {
        if self.is_expired() {
            warn!(operation, "deadline exceeded");
            return Err(ServerError::Timeout { operation });
        }
        Ok(())
    }

    /// Runs `fut` to completion or until the deadline, whichever is first.
    ///
    /// Failures are logged with the operation name and converted into
    /// [`ServerError`]; infrastructure failures become
    /// [`ServerError::Internal`].
    pub async fn run<T, E, F>(&self, operation: &'static str, fut: F) -> ServerResult<T>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<ServerError> + Display,
    {
        match tokio::time::timeout_at(self.0, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                let detail = err.to_string();
                let err: ServerError = err.into();
                if err.is_server_error() {
                    error!(operation, error = %detail, "operation failed");
                } else {
                    debug!(operation, error = %detail, "operation refused");
                }
                Err(err)
            }
            Err(_) => {
                warn!(operation, "deadline exceeded");
                Err(ServerError::Timeout { operation })
            }
        }
    }
}
