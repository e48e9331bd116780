//! Config command implementation.

use aclife_server::{RatePolicy, ServerConfig};
use serde::Serialize;

/// Printable view of a [`ServerConfig`]. The decoy key is never shown.
#[derive(Debug, Serialize)]
pub struct ConfigView {
    /// Login exchange TTL in seconds.
    pub protocol_session_ttl_secs: u64,
    /// Idle rate window retention in seconds.
    pub rate_window_retention_secs: u64,
    /// Billing status cache TTL in seconds.
    pub subscription_cache_ttl_secs: u64,
    /// Sweep interval in seconds.
    pub sweep_interval_secs: u64,
    /// Access token lifetime in seconds.
    pub access_token_lifetime_secs: u64,
    /// Request deadline in seconds.
    pub request_timeout_secs: u64,
    /// Whether calendar access needs an active subscription.
    pub subscription_required: bool,
    /// Whether `X-Real-IP` is trusted.
    pub behind_proxy: bool,
    /// Per-route budgets.
    pub rates: Vec<RateView>,
}

/// One route budget.
#[derive(Debug, Serialize)]
pub struct RateView {
    /// Route group.
    pub route: &'static str,
    /// Requests allowed per window.
    pub max_requests: usize,
    /// Window length in seconds.
    pub window_secs: u64,
}

impl RateView {
    fn new(route: &'static str, policy: RatePolicy) -> Self {
        Self {
            route,
            max_requests: policy.max_requests,
            window_secs: policy.window.as_secs(),
        }
    }
}

impl From<&ServerConfig> for ConfigView {
    fn from(config: &ServerConfig) -> Self {
        Self {
            protocol_session_ttl_secs: config.protocol_session_ttl.as_secs(),
            rate_window_retention_secs: config.rate_window_retention.as_secs(),
            subscription_cache_ttl_secs: config.subscription_cache_ttl.as_secs(),
            sweep_interval_secs: config.sweep_interval.as_secs(),
            access_token_lifetime_secs: config.access_token_lifetime.as_secs(),
            request_timeout_secs: config.request_timeout.as_secs(),
            subscription_required: config.subscription_required,
            behind_proxy: config.behind_proxy,
            rates: vec![
                RateView::new("auth", config.auth_rate),
                RateView::new("calendar", config.calendar_rate),
                RateView::new("account", config.account_rate),
                RateView::new("billing", config.billing_rate),
            ],
        }
    }
}

/// Runs the config command.
pub fn run(config: &ServerConfig, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let view = ConfigView::from(config);
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&view)?),
        "text" => print!("{}", render_text(&view)),
        other => return Err(format!("Unknown format: {other}").into()),
    }
    Ok(())
}

fn render_text(view: &ConfigView) -> String {
    let mut out = String::new();
    out.push_str("aclife server configuration\n");
    out.push_str("===========================\n");
    out.push_str(&format!(
        "Login exchange TTL:      {}s\n",
        view.protocol_session_ttl_secs
    ));
    out.push_str(&format!(
        "Rate window retention:   {}s\n",
        view.rate_window_retention_secs
    ));
    out.push_str(&format!(
        "Subscription cache TTL:  {}s\n",
        view.subscription_cache_ttl_secs
    ));
    out.push_str(&format!("Sweep interval:          {}s\n", view.sweep_interval_secs));
    out.push_str(&format!(
        "Access token lifetime:   {}s\n",
        view.access_token_lifetime_secs
    ));
    out.push_str(&format!("Request timeout:         {}s\n", view.request_timeout_secs));
    out.push_str(&format!(
        "Subscription required:   {}\n",
        view.subscription_required
    ));
    out.push_str(&format!("Behind proxy:            {}\n", view.behind_proxy));
    out.push_str("\nRate limits:\n");
    for rate in &view.rates {
        out.push_str(&format!(
            "  {:<10} {} per {}s\n",
            rate.route, rate.max_requests, rate.window_secs
        ));
    }
    out
}
