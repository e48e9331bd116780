//! Per-request context: who is calling, on which route, by when.

use crate::config::ServerConfig;
use crate::deadline::Deadline;
use crate::push::OriginClient;
use crate::store::Account;
use aclife_ephemeral::RatePolicy;
use parking_lot::Mutex;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

/// Route groups, each with its own request budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Registration, login and logout.
    Auth,
    /// Calendar save and sync.
    Calendar,
    /// Account details.
    Account,
    /// Billing callbacks.
    Billing,
}

impl Route {
    /// Short lowercase name, used in rate-limit keys and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Route::Auth => "auth",
            Route::Calendar => "calendar",
            Route::Account => "account",
            Route::Billing => "billing",
        }
    }

    /// The budget configured for this route.
    pub fn policy(&self, config: &ServerConfig) -> RatePolicy {
        match self {
            Route::Auth => config.auth_rate,
            Route::Calendar => config.calendar_rate,
            Route::Account => config.account_rate,
            Route::Billing => config.billing_rate,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identity used for rate limiting.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

impl ClientKey {
    /// Derives the key from the connection.
    ///
    /// Behind a trusted proxy the `X-Real-IP` header wins when it parses as an
    /// address; otherwise the peer address is used.
    pub fn from_peer(peer: IpAddr, real_ip: Option<&str>, behind_proxy: bool) -> Self {
        let forwarded = behind_proxy
            .then_some(real_ip)
            .flatten()
            .and_then(|header| header.trim().parse::<IpAddr>().ok());
        Self(forwarded.unwrap_or(peer).to_string())
    }

    /// Wraps an arbitrary key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key for the given route's window.
    pub fn scoped(&self, route: Route) -> String {
        format!("{}:{}", route.name(), self.0)
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// State carried through one request.
///
/// The resolved identity is cached here so later steps of the same request
/// do not hit storage again.
#[derive(Debug)]
pub struct RequestContext {
    client: ClientKey,
    deadline: Deadline,
    access_token: Option<String>,
    origin: Option<OriginClient>,
    identity: Mutex<Option<Arc<Account>>>,
}

impl RequestContext {
    /// Creates a context for an anonymous caller.
    pub fn new(client: ClientKey, deadline: Deadline) -> Self {
        Self {
            client,
            deadline,
            access_token: None,
            origin: None,
            identity: Mutex::new(None),
        }
    }

    /// Attaches the caller's access token. Empty tokens are ignored.
    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.access_token = (!token.is_empty()).then_some(token);
        self
    }

    /// Attaches the caller's instance tag, if it is a valid one.
    #[must_use]
    pub fn with_origin(mut self, tag: &str) -> Self {
        self.origin = OriginClient::parse(tag);
        self
    }

    /// Rate-limit identity.
    pub fn client(&self) -> &ClientKey {
        &self.client
    }

    /// Request deadline.
    pub fn deadline(&self) -> &Deadline {
        &self.deadline
    }

    /// Access token, if any.
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    /// Instance tag, if any.
    pub fn origin(&self) -> Option<&OriginClient> {
        self.origin.as_ref()
    }

    pub(crate) fn cached_identity(&self) -> Option<Arc<Account>> {
        self.identity.lock().clone()
    }

    pub(crate) fn cache_identity(&self, account: Option<Arc<Account>>) {
        *self.identity.lock() = account;
    }
}
