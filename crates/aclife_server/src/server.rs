//! The server facade.

use crate::auth::{AuthService, LoginGrant};
use crate::billing::BillingSource;
use crate::calendar::{ApplySummary, CalendarService};
use crate::config::ServerConfig;
use crate::deadline::Deadline;
use crate::error::{ServerError, ServerResult};
use crate::identity::IdentityResolver;
use crate::push::{LogNotifier, PushNotifier};
use crate::request::{ClientKey, RequestContext, Route};
use crate::store::{AccountStore, EventStore, MemoryStore, SessionStore};
use crate::subscription::SubscriptionGate;
use aclife_ephemeral::{RateLimiter, SubscriptionCache, Sweeper};
use aclife_protocol::{
    EventChange, LoginStartReply, LoginStartRequest, LoginVerifyRequest, PublicAccount,
    RegisterRequest, SnapshotEntry, SyncDiff,
};
use parking_lot::Mutex;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info};

/// External collaborators the server runs against.
#[derive(Clone)]
pub struct Backends {
    /// Credential records.
    pub accounts: Arc<dyn AccountStore>,
    /// Access-token sessions.
    pub sessions: Arc<dyn SessionStore>,
    /// Calendar events.
    pub events: Arc<dyn EventStore>,
    /// Billing status source.
    pub billing: Arc<dyn BillingSource>,
    /// Push transport.
    pub push: Arc<dyn PushNotifier>,
}

impl Backends {
    /// Every store backed by `store`, pushes only logged.
    pub fn in_memory(store: &MemoryStore, billing: Arc<dyn BillingSource>) -> Self {
        Self {
            accounts: Arc::new(store.clone()),
            sessions: Arc::new(store.clone()),
            events: Arc::new(store.clone()),
            billing,
            push: Arc::new(LogNotifier),
        }
    }

    /// Replaces the push transport.
    #[must_use]
    pub fn with_push(mut self, push: Arc<dyn PushNotifier>) -> Self {
        self.push = push;
        self
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends").finish_non_exhaustive()
    }
}

/// The aclife server core.
///
/// Every request passes the route's rate limit first, then whatever identity
/// and subscription checks the route needs. Transports build a
/// [`RequestContext`] with [`AclifeServer::context`] and call the matching
/// method.
///
/// # Example
///
/// ```rust,ignore
/// use aclife_server::{AclifeServer, Backends, MemoryStore, ServerConfig, StaticBilling};
/// use std::sync::Arc;
///
/// let store = MemoryStore::new();
/// let server = AclifeServer::new(
///     ServerConfig::default(),
///     Backends::in_memory(&store, Arc::new(StaticBilling::new())),
/// );
/// server.start();
/// // ... serve requests ...
/// server.shutdown().await;
/// ```
pub struct AclifeServer {
    config: ServerConfig,
    limiter: Arc<RateLimiter>,
    auth: AuthService,
    identity: IdentityResolver,
    gate: SubscriptionGate,
    calendar: CalendarService,
    sweepers: Mutex<Vec<Sweeper>>,
}

impl AclifeServer {
    /// Creates a server. Nothing runs in the background until
    /// [`AclifeServer::start`].
    pub fn new(config: ServerConfig, backends: Backends) -> Self {
        let retention = config
            .rate_window_retention
            .max(config.longest_rate_window());
        let gate = SubscriptionGate::new(
            config.subscription_required,
            Arc::new(SubscriptionCache::new(config.subscription_cache_ttl)),
            backends.billing,
            Arc::clone(&backends.accounts),
        );

        Self {
            limiter: Arc::new(RateLimiter::new(retention)),
            auth: AuthService::new(
                &config,
                Arc::clone(&backends.accounts),
                Arc::clone(&backends.sessions),
            ),
            identity: IdentityResolver::new(backends.accounts, backends.sessions),
            gate,
            calendar: CalendarService::new(backends.events, backends.push),
            sweepers: Mutex::new(Vec::new()),
            config,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Starts one sweeper per ephemeral store. Calling it again while running
    /// does nothing. Must be called inside a tokio runtime.
    pub fn start(&self) {
        let mut sweepers = self.sweepers.lock();
        if !sweepers.is_empty() {
            return;
        }
        let every = self.config.sweep_interval;
        sweepers.push(Sweeper::spawn("pending_logins", self.auth.pending_logins(), every));
        sweepers.push(Sweeper::spawn("rate_windows", self.limiter.clone(), every));
        sweepers.push(Sweeper::spawn("subscription_cache", self.gate.cache(), every));
        info!(sweep_interval = ?every, "server started");
    }

    /// Stops every sweeper and waits for them to finish.
    pub async fn shutdown(&self) {
        let sweepers = std::mem::take(&mut *self.sweepers.lock());
        for sweeper in sweepers {
            debug!(store = sweeper.name(), "stopping sweeper");
            sweeper.shutdown().await;
        }
        info!("server stopped");
    }

    /// Builds the context for a request from `peer`, with the configured
    /// deadline.
    pub fn context(&self, peer: IpAddr, real_ip: Option<&str>) -> RequestContext {
        RequestContext::new(
            ClientKey::from_peer(peer, real_ip, self.config.behind_proxy),
            Deadline::after(self.config.request_timeout),
        )
    }

    fn admit(&self, route: Route, ctx: &RequestContext) -> ServerResult<()> {
        if self
            .limiter
            .check(&ctx.client().scoped(route), route.policy(&self.config))
        {
            Ok(())
        } else {
            debug!(%route, client = %ctx.client(), "rate limited");
            Err(ServerError::RateLimited)
        }
    }

    /// `Register`.
    pub async fn register(&self, ctx: &RequestContext, request: RegisterRequest) -> ServerResult<()> {
        self.admit(Route::Auth, ctx)?;
        self.auth.register(request, ctx.deadline()).await
    }

    /// `LoginStart`.
    pub async fn login_start(
        &self,
        ctx: &RequestContext,
        request: LoginStartRequest,
    ) -> ServerResult<LoginStartReply> {
        self.admit(Route::Auth, ctx)?;
        self.auth.login_start(request, ctx.deadline()).await
    }

    /// `LoginVerify`.
    pub async fn login_verify(
        &self,
        ctx: &RequestContext,
        request: LoginVerifyRequest,
    ) -> ServerResult<LoginGrant> {
        self.admit(Route::Auth, ctx)?;
        self.auth.login_verify(request, ctx.deadline()).await
    }

    /// `Logout` for the context's access token.
    pub async fn logout(&self, ctx: &RequestContext) -> ServerResult<()> {
        self.admit(Route::Auth, ctx)?;
        if let Some(token) = ctx.access_token() {
            self.auth.logout(token, ctx.deadline()).await;
        }
        Ok(())
    }

    /// The caller's own account details.
    pub async fn account_info(&self, ctx: &RequestContext) -> ServerResult<PublicAccount> {
        self.admit(Route::Account, ctx)?;
        let account = self.identity.require(ctx).await?;
        Ok(account.public_view())
    }

    /// `CalendarApplyChanges` for the caller.
    pub async fn save_events(
        &self,
        ctx: &RequestContext,
        changes: &[EventChange],
    ) -> ServerResult<ApplySummary> {
        self.admit(Route::Calendar, ctx)?;
        let account = self.gate.check(ctx, &self.identity, false).await?;
        self.calendar
            .apply_changes(account.id, changes, ctx.origin(), ctx.deadline())
            .await
    }

    /// `CalendarSync` for the caller.
    pub async fn sync_events(
        &self,
        ctx: &RequestContext,
        snapshot: &[SnapshotEntry],
    ) -> ServerResult<SyncDiff> {
        self.admit(Route::Calendar, ctx)?;
        let account = self.gate.check(ctx, &self.identity, false).await?;
        self.calendar
            .sync(account.id, snapshot, ctx.deadline())
            .await
    }

    /// Sends the caller's devices a test notification naming their account.
    pub async fn test_push(&self, ctx: &RequestContext) -> ServerResult<()> {
        self.admit(Route::Account, ctx)?;
        let account = self.identity.require(ctx).await?;
        let body = format!("You are user: {}", account.uuid);
        self.calendar
            .notify_devices(account.id, "Test Notification", &body, ctx.deadline())
            .await
    }

    /// Billing callback: a subscription changed status.
    pub async fn record_subscription_status(
        &self,
        ctx: &RequestContext,
        subscription_id: &str,
        status: &str,
    ) -> ServerResult<u64> {
        self.admit(Route::Billing, ctx)?;
        self.gate
            .record_status(subscription_id, status, ctx.deadline())
            .await
    }

    /// Links billing identifiers to the caller's account. The next calendar
    /// request fetches the subscription's status.
    pub async fn link_subscription(
        &self,
        ctx: &RequestContext,
        customer_id: &str,
        subscription_id: &str,
    ) -> ServerResult<PublicAccount> {
        self.admit(Route::Account, ctx)?;
        let account = self.identity.require(ctx).await?;
        self.gate
            .link(account.id, customer_id, subscription_id, ctx.deadline())
            .await?;
        let refreshed = self.identity.identify(ctx, true).await?.unwrap_or(account);
        Ok(refreshed.public_view())
    }

    /// Login exchanges waiting for their second phase.
    pub fn pending_logins(&self) -> usize {
        self.auth.pending_logins().len()
    }

    /// Clients with a live rate window.
    pub fn tracked_clients(&self) -> usize {
        self.limiter.tracked_clients()
    }
}

impl std::fmt::Debug for AclifeServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AclifeServer")
            .field("config", &self.config)
            .field("auth", &self.auth)
            .field("limiter", &self.limiter)
            .field("sweepers", &self.sweepers.lock().len())
            .finish_non_exhaustive()
    }
}
