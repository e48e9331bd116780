//! Subscription gating for calendar access.

use crate::billing::{BillingSource, ACTIVE_STATUS};
use crate::deadline::Deadline;
use crate::error::{AuthFailure, ServerError, ServerResult};
use crate::identity::IdentityResolver;
use crate::request::RequestContext;
use crate::store::{Account, AccountId, AccountStore};
use aclife_ephemeral::SubscriptionCache;
use std::sync::Arc;
use tracing::{debug, info};

/// Admits a caller only while their subscription is active.
///
/// Statuses are served from a [`SubscriptionCache`]. On a miss (or when a
/// refresh is forced) the billing source is asked, the answer is written to
/// the account record, and the caller's identity is re-resolved so the
/// request sees the new status.
pub struct SubscriptionGate {
    required: bool,
    cache: Arc<SubscriptionCache>,
    billing: Arc<dyn BillingSource>,
    accounts: Arc<dyn AccountStore>,
}

impl SubscriptionGate {
    /// Creates a gate. With `required` unset every logged-in caller passes.
    pub fn new(
        required: bool,
        cache: Arc<SubscriptionCache>,
        billing: Arc<dyn BillingSource>,
        accounts: Arc<dyn AccountStore>,
    ) -> Self {
        Self {
            required,
            cache,
            billing,
            accounts,
        }
    }

    /// The status cache, for sweeping.
    pub fn cache(&self) -> Arc<SubscriptionCache> {
        Arc::clone(&self.cache)
    }

    /// Resolves the caller and checks their subscription.
    pub async fn check(
        &self,
        ctx: &RequestContext,
        identity: &IdentityResolver,
        force_refresh: bool,
    ) -> ServerResult<Arc<Account>> {
        let account = identity.require(ctx).await?;
        if !self.required {
            return Ok(account);
        }
        let Some(subscription_id) = account.subscription_id.clone() else {
            debug!(user_id = %account.id, "no subscription linked");
            return Err(ServerError::Unauthorized(AuthFailure::SubscriptionRequired));
        };

        let cached = if force_refresh {
            None
        } else {
            self.cache.get(&subscription_id)
        };
        let (status, account) = match cached {
            Some(status) => (status, account),
            None => self.refresh(ctx, identity, &subscription_id).await?,
        };

        if status != ACTIVE_STATUS {
            debug!(user_id = %account.id, %status, "subscription inactive");
            return Err(ServerError::Unauthorized(AuthFailure::SubscriptionRequired));
        }
        Ok(account)
    }

    async fn refresh(
        &self,
        ctx: &RequestContext,
        identity: &IdentityResolver,
        subscription_id: &str,
    ) -> ServerResult<(String, Arc<Account>)> {
        let deadline = ctx.deadline();
        let status = deadline
            .run(
                "fetch_subscription_status",
                self.billing.subscription_status(subscription_id),
            )
            .await?;
        deadline
            .run(
                "set_subscription_status",
                self.accounts
                    .set_subscription_status(subscription_id, &status),
            )
            .await?;
        let account = identity
            .identify(ctx, true)
            .await?
            .ok_or(ServerError::Unauthorized(AuthFailure::NotLoggedIn))?;
        self.cache.put(subscription_id, &status);
        debug!(user_id = %account.id, %status, "subscription status refreshed");
        Ok((status, account))
    }

    /// Records a status pushed by the billing provider. Returns the number of
    /// accounts updated.
    pub async fn record_status(
        &self,
        subscription_id: &str,
        status: &str,
        deadline: &Deadline,
    ) -> ServerResult<u64> {
        if subscription_id.is_empty() || status.is_empty() {
            return Err(ServerError::InvalidInput(
                "subscription id and status are required".into(),
            ));
        }
        let updated = deadline
            .run(
                "set_subscription_status",
                self.accounts.set_subscription_status(subscription_id, status),
            )
            .await?;
        self.cache.put(subscription_id, status);
        info!(updated, %status, "subscription status recorded");
        Ok(updated)
    }

    /// Associates billing identifiers with an account.
    pub async fn link(
        &self,
        owner: AccountId,
        customer_id: &str,
        subscription_id: &str,
        deadline: &Deadline,
    ) -> ServerResult<()> {
        if customer_id.is_empty() || subscription_id.is_empty() {
            return Err(ServerError::InvalidInput(
                "customer and subscription ids are required".into(),
            ));
        }
        let linked = deadline
            .run(
                "link_subscription",
                self.accounts
                    .link_subscription(owner, customer_id, subscription_id),
            )
            .await?;
        if !linked {
            return Err(ServerError::Unauthorized(AuthFailure::NotLoggedIn));
        }
        self.cache.invalidate(subscription_id);
        info!(user_id = %owner, "subscription linked");
        Ok(())
    }
}

impl std::fmt::Debug for SubscriptionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionGate")
            .field("required", &self.required)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
