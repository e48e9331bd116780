//! Server configuration.

use aclife_ephemeral::RatePolicy;
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use std::time::Duration;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Secret key material that never shows up in `Debug` output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey(Vec<u8>);

impl SecretKey {
    /// Wraps existing key bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Generates 32 random bytes.
    pub fn random() -> Self {
        let mut bytes = vec![0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Returns the key bytes.
    pub fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

/// Configuration for the aclife server core.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// How long a started login may wait for its second phase.
    pub protocol_session_ttl: Duration,
    /// How long an idle client's rate window is retained.
    pub rate_window_retention: Duration,
    /// How long a billing status is trusted.
    pub subscription_cache_ttl: Duration,
    /// Interval between background sweeps of every ephemeral store.
    pub sweep_interval: Duration,
    /// Lifetime of an issued access token.
    pub access_token_lifetime: Duration,
    /// Default deadline for a request.
    pub request_timeout: Duration,
    /// Whether calendar access requires an active subscription.
    pub subscription_required: bool,
    /// Whether to trust the `X-Real-IP` header for client identity.
    pub behind_proxy: bool,
    /// Budget for registration and login.
    pub auth_rate: RatePolicy,
    /// Budget for calendar save and sync.
    pub calendar_rate: RatePolicy,
    /// Budget for account endpoints.
    pub account_rate: RatePolicy,
    /// Budget for billing callbacks.
    pub billing_rate: RatePolicy,
    /// Key for deriving decoy salts for unknown identities.
    pub salt_decoy_key: SecretKey,
}

impl ServerConfig {
    /// Creates a configuration with production defaults.
    pub fn new() -> Self {
        Self {
            protocol_session_ttl: Duration::from_secs(5 * 60),
            rate_window_retention: Duration::from_secs(2 * 60),
            subscription_cache_ttl: Duration::from_secs(5 * 60),
            sweep_interval: Duration::from_secs(60),
            access_token_lifetime: Duration::from_secs(12 * 60 * 60),
            request_timeout: Duration::from_secs(10),
            subscription_required: true,
            behind_proxy: false,
            auth_rate: RatePolicy::per_minute(30),
            calendar_rate: RatePolicy::per_second(20),
            account_rate: RatePolicy::per_second(5),
            billing_rate: RatePolicy::per_second(100),
            salt_decoy_key: SecretKey::random(),
        }
    }

    /// Sets the login exchange TTL.
    pub fn with_protocol_session_ttl(mut self, ttl: Duration) -> Self {
        self.protocol_session_ttl = ttl;
        self
    }

    /// Sets the idle rate window retention.
    pub fn with_rate_window_retention(mut self, retention: Duration) -> Self {
        self.rate_window_retention = retention;
        self
    }

    /// Sets the billing status cache TTL.
    pub fn with_subscription_cache_ttl(mut self, ttl: Duration) -> Self {
        self.subscription_cache_ttl = ttl;
        self
    }

    /// Sets the sweep interval. Sweepers never run more often than once a
    /// second.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Sets the access token lifetime.
    pub fn with_access_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.access_token_lifetime = lifetime;
        self
    }

    /// Sets the default request deadline.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Enables or disables the subscription requirement.
    pub fn with_subscription_required(mut self, required: bool) -> Self {
        self.subscription_required = required;
        self
    }

    /// Trusts `X-Real-IP` when set.
    pub fn with_behind_proxy(mut self, behind_proxy: bool) -> Self {
        self.behind_proxy = behind_proxy;
        self
    }

    /// Sets the authentication route budget.
    pub fn with_auth_rate(mut self, policy: RatePolicy) -> Self {
        self.auth_rate = policy;
        self
    }

    /// Sets the calendar route budget.
    pub fn with_calendar_rate(mut self, policy: RatePolicy) -> Self {
        self.calendar_rate = policy;
        self
    }

    /// Sets the account route budget.
    pub fn with_account_rate(mut self, policy: RatePolicy) -> Self {
        self.account_rate = policy;
        self
    }

    /// Sets the billing route budget.
    pub fn with_billing_rate(mut self, policy: RatePolicy) -> Self {
        self.billing_rate = policy;
        self
    }

    /// Sets the decoy salt key. Use a stable key across restarts so decoy
    /// salts do not change.
    pub fn with_salt_decoy_key(mut self, key: Vec<u8>) -> Self {
        self.salt_decoy_key = SecretKey::new(key);
        self
    }

    /// The longest window any route policy uses.
    pub fn longest_rate_window(&self) -> Duration {
        [
            self.auth_rate.window,
            self.calendar_rate.window,
            self.account_rate.window,
            self.billing_rate.window,
        ]
        .into_iter()
        .max()
        .unwrap_or_default()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.protocol_session_ttl, Duration::from_secs(300));
        assert_eq!(config.rate_window_retention, Duration::from_secs(120));
        assert_eq!(config.access_token_lifetime, Duration::from_secs(43_200));
        assert_eq!(config.auth_rate, RatePolicy::per_minute(30));
        assert!(config.subscription_required);
        assert_eq!(config.salt_decoy_key.expose().len(), 32);
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new()
            .with_subscription_required(false)
            .with_behind_proxy(true)
            .with_auth_rate(RatePolicy::per_second(2))
            .with_salt_decoy_key(vec![1, 2, 3]);

        assert!(!config.subscription_required);
        assert!(config.behind_proxy);
        assert_eq!(config.auth_rate.max_requests, 2);
        assert_eq!(config.salt_decoy_key.expose(), &[1, 2, 3]);
    }

    #[test]
    fn longest_window() {
        let config = ServerConfig::new();
        assert_eq!(config.longest_rate_window(), Duration::from_secs(60));
    }

    #[test]
    fn secret_not_printed() {
        let config = ServerConfig::new().with_salt_decoy_key(vec![0xAB; 4]);
        let printed = format!("{config:?}");
        assert!(printed.contains("SecretKey(..)"));
        assert!(!printed.contains("171"));
    }
}
