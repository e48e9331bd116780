//! Billing status source.

use crate::error::ServerError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

/// The only status that grants calendar access.
pub const ACTIVE_STATUS: &str = "active";

/// Errors reported by a billing source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BillingError {
    /// The billing provider does not know the subscription.
    #[error("unknown subscription: {0}")]
    UnknownSubscription(String),

    /// The billing provider could not be reached.
    #[error("billing source unavailable: {0}")]
    Unavailable(String),
}

impl From<BillingError> for ServerError {
    fn from(err: BillingError) -> Self {
        ServerError::Internal(err.to_string())
    }
}

/// Answers "what is the status of this subscription right now".
///
/// Implementations own any retry policy; the core calls once per refresh.
#[async_trait]
pub trait BillingSource: Send + Sync {
    /// Fetches the current status string of a subscription.
    async fn subscription_status(&self, subscription_id: &str) -> Result<String, BillingError>;
}

/// Billing source backed by a fixed table.
#[derive(Debug, Default)]
pub struct StaticBilling {
    statuses: RwLock<HashMap<String, String>>,
    lookups: AtomicUsize,
}

impl StaticBilling {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the status reported for a subscription.
    pub fn set_status(&self, subscription_id: &str, status: &str) {
        self.statuses
            .write()
            .insert(subscription_id.to_owned(), status.to_owned());
    }

    /// Number of lookups served so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl BillingSource for StaticBilling {
    async fn subscription_status(&self, subscription_id: &str) -> Result<String, BillingError> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.statuses
            .read()
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| BillingError::UnknownSubscription(subscription_id.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_table_lookup() {
        let billing = StaticBilling::new();
        billing.set_status("sub_1", ACTIVE_STATUS);

        assert_eq!(billing.subscription_status("sub_1").await.unwrap(), "active");
        assert_eq!(
            billing.subscription_status("sub_2").await,
            Err(BillingError::UnknownSubscription("sub_2".into()))
        );
        assert_eq!(billing.lookups(), 2);
    }

    #[test]
    fn billing_errors_are_internal() {
        let err: ServerError = BillingError::Unavailable("503".into()).into();
        assert!(err.is_server_error());
    }
}
