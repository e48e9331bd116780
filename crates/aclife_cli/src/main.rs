//! aclife CLI
//!
//! Command-line tools for the aclife server core.
//!
//! # Commands
//!
//! - `config` - Print the effective server configuration
//! - `selftest` - Run register, login, save and sync against an in-memory backend

mod commands;

use aclife_server::{RatePolicy, ServerConfig};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// aclife server tools.
#[derive(Parser)]
#[command(name = "aclife")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Server settings, each overridable from the environment.
#[derive(Args, Debug)]
struct ConfigArgs {
    /// Seconds a started login may wait for its second phase
    #[arg(global = true, long, env = "ACLIFE_PROTOCOL_SESSION_TTL", default_value_t = 300)]
    protocol_session_ttl: u64,

    /// Seconds an idle client's rate window is kept
    #[arg(global = true, long, env = "ACLIFE_RATE_WINDOW_RETENTION", default_value_t = 120)]
    rate_window_retention: u64,

    /// Seconds a billing status is trusted
    #[arg(global = true, long, env = "ACLIFE_SUBSCRIPTION_CACHE_TTL", default_value_t = 300)]
    subscription_cache_ttl: u64,

    /// Seconds between sweeps of expired state
    #[arg(global = true, long, env = "ACLIFE_SWEEP_INTERVAL", default_value_t = 60)]
    sweep_interval: u64,

    /// Hours an access token stays valid
    #[arg(global = true, long, env = "ACLIFE_ACCESS_TOKEN_HOURS", default_value_t = 12)]
    access_token_hours: u64,

    /// Seconds before a request times out
    #[arg(global = true, long, env = "ACLIFE_REQUEST_TIMEOUT", default_value_t = 10)]
    request_timeout: u64,

    /// Require an active subscription for calendar access
    #[arg(
        global = true,
        long,
        env = "ACLIFE_SUBSCRIPTION_REQUIRED",
        default_value_t = true,
        action = ArgAction::Set
    )]
    subscription_required: bool,

    /// Trust the X-Real-IP header
    #[arg(global = true, long, env = "ACLIFE_BEHIND_PROXY")]
    behind_proxy: bool,

    /// Auth requests allowed per minute per client
    #[arg(global = true, long, env = "ACLIFE_AUTH_RATE", default_value_t = 30)]
    auth_rate: usize,

    /// Calendar requests allowed per second per client
    #[arg(global = true, long, env = "ACLIFE_CALENDAR_RATE", default_value_t = 20)]
    calendar_rate: usize,

    /// Account requests allowed per second per client
    #[arg(global = true, long, env = "ACLIFE_ACCOUNT_RATE", default_value_t = 5)]
    account_rate: usize,

    /// Billing callbacks allowed per second per client
    #[arg(global = true, long, env = "ACLIFE_BILLING_RATE", default_value_t = 100)]
    billing_rate: usize,

    /// Hex key for decoy salts (random if unset)
    #[arg(global = true, long, env = "ACLIFE_SALT_DECOY_KEY", hide_env_values = true)]
    salt_decoy_key: Option<String>,
}

impl ConfigArgs {
    fn to_config(&self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        let mut config = ServerConfig::new()
            .with_protocol_session_ttl(Duration::from_secs(self.protocol_session_ttl))
            .with_rate_window_retention(Duration::from_secs(self.rate_window_retention))
            .with_subscription_cache_ttl(Duration::from_secs(self.subscription_cache_ttl))
            .with_sweep_interval(Duration::from_secs(self.sweep_interval))
            .with_access_token_lifetime(Duration::from_secs(self.access_token_hours * 3600))
            .with_request_timeout(Duration::from_secs(self.request_timeout))
            .with_subscription_required(self.subscription_required)
            .with_behind_proxy(self.behind_proxy)
            .with_auth_rate(RatePolicy::per_minute(self.auth_rate))
            .with_calendar_rate(RatePolicy::per_second(self.calendar_rate))
            .with_account_rate(RatePolicy::per_second(self.account_rate))
            .with_billing_rate(RatePolicy::per_second(self.billing_rate));

        if let Some(key) = &self.salt_decoy_key {
            let key = hex::decode(key.trim()).map_err(|e| format!("Invalid decoy key: {e}"))?;
            if key.len() < 16 {
                return Err("Decoy key must be at least 16 bytes".into());
            }
            config = config.with_salt_decoy_key(key);
        }
        if self.sweep_interval == 0 {
            return Err("Sweep interval must be positive".into());
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective server configuration
    Config {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Exercise the full request flow in-process
    Selftest {
        /// Identity to register
        #[arg(long, default_value = "selftest@example.com")]
        email: String,

        /// Password to register with
        #[arg(long, default_value = "correct horse battery staple")]
        password: String,

        /// Number of events to save
        #[arg(long, default_value_t = 3)]
        events: u8,

        /// Argon2id memory cost in KiB
        #[arg(long, default_value_t = 64 * 1024)]
        kdf_memory_kib: u32,

        /// Argon2id passes
        #[arg(long, default_value_t = 3)]
        kdf_iterations: u32,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = cli.config.to_config()?;
    match cli.command {
        Commands::Config { format } => {
            commands::config::run(&config, &format)?;
        }
        Commands::Selftest {
            email,
            password,
            events,
            kdf_memory_kib,
            kdf_iterations,
            format,
        } => {
            let options = commands::selftest::Options {
                email,
                password,
                events,
                kdf: aclife_server::KdfParams::new(kdf_memory_kib, kdf_iterations, 1),
            };
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            let report = runtime.block_on(commands::selftest::run(config, options))?;
            commands::selftest::print(&report, &format)?;
        }
        Commands::Version => {
            println!("aclife CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_server_defaults() {
        let cli = Cli::try_parse_from(["aclife", "config"]).unwrap();
        let config = cli.config.to_config().unwrap();
        let defaults = ServerConfig::default();
        assert_eq!(config.protocol_session_ttl, defaults.protocol_session_ttl);
        assert_eq!(config.access_token_lifetime, defaults.access_token_lifetime);
        assert_eq!(config.auth_rate, defaults.auth_rate);
        assert_eq!(config.billing_rate, defaults.billing_rate);
        assert!(config.subscription_required);
    }

    #[test]
    fn flags_override() {
        let cli = Cli::try_parse_from([
            "aclife",
            "--subscription-required",
            "false",
            "--auth-rate",
            "5",
            "--salt-decoy-key",
            "000102030405060708090a0b0c0d0e0f",
            "config",
        ])
        .unwrap();
        let config = cli.config.to_config().unwrap();
        assert!(!config.subscription_required);
        assert_eq!(config.auth_rate, RatePolicy::per_minute(5));
        assert_eq!(config.salt_decoy_key.expose().len(), 16);
    }

    #[test]
    fn bad_values_rejected() {
        let cli = Cli::try_parse_from(["aclife", "--salt-decoy-key", "zz", "config"]).unwrap();
        assert!(cli.config.to_config().is_err());

        let cli = Cli::try_parse_from(["aclife", "--sweep-interval", "0", "config"]).unwrap();
        assert!(cli.config.to_config().is_err());
    }
}
