//! Access token to account resolution.

use crate::deadline::Deadline;
use crate::error::{AuthFailure, ServerError, ServerResult};
use crate::request::RequestContext;
use crate::store::{now_millis, Account, AccountStore, SessionStore};
use std::sync::Arc;
use tracing::debug;

/// Maps access tokens to accounts through the persisted session records.
pub struct IdentityResolver {
    accounts: Arc<dyn AccountStore>,
    sessions: Arc<dyn SessionStore>,
}

impl IdentityResolver {
    /// Creates a resolver over the given stores.
    pub fn new(accounts: Arc<dyn AccountStore>, sessions: Arc<dyn SessionStore>) -> Self {
        Self { accounts, sessions }
    }

    /// Looks up the account behind `token`. Unknown and expired tokens
    /// resolve to `None`.
    pub async fn resolve(&self, token: &str, deadline: &Deadline) -> ServerResult<Option<Account>> {
        if token.is_empty() {
            return Ok(None);
        }
        let Some(session) = deadline
            .run("find_session", self.sessions.find_session(token))
            .await?
        else {
            return Ok(None);
        };
        if session.is_expired(now_millis()) {
            debug!(user_id = %session.owner, "access token expired");
            return Ok(None);
        }
        deadline
            .run("find_account", self.accounts.find_by_id(session.owner))
            .await
    }

    /// Resolves the caller of `ctx`, reusing the identity cached on the
    /// request unless `force_refresh` is set.
    pub async fn identify(
        &self,
        ctx: &RequestContext,
        force_refresh: bool,
    ) -> ServerResult<Option<Arc<Account>>> {
        if !force_refresh {
            if let Some(account) = ctx.cached_identity() {
                return Ok(Some(account));
            }
        }
        let Some(token) = ctx.access_token() else {
            return Ok(None);
        };
        let account = self.resolve(token, ctx.deadline()).await?.map(Arc::new);
        ctx.cache_identity(account.clone());
        Ok(account)
    }

    /// Like [`IdentityResolver::identify`], but an anonymous caller is an
    /// error.
    pub async fn require(&self, ctx: &RequestContext) -> ServerResult<Arc<Account>> {
        self.identify(ctx, false)
            .await?
            .ok_or(ServerError::Unauthorized(AuthFailure::NotLoggedIn))
    }
}

impl std::fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityResolver").finish_non_exhaustive()
    }
}
