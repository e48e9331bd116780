//! Selftest command implementation.
//!
//! Drives one account through register, login, save, sync and logout
//! against an in-memory backend and reports what each step returned.

use aclife_protocol::{
    CalendarEvent, EventChange, EventId, LoginStartReply, LoginStartRequest, SnapshotEntry,
};
use aclife_server::{
    AclifeServer, Backends, KdfParams, MemoryStore, PasswordProofClient, ServerConfig,
    StaticBilling, ACTIVE_STATUS,
};
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

const PEER: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
const SUBSCRIPTION_ID: &str = "selftest";
const ORIGIN: &str = "st0001";

/// Selftest inputs.
#[derive(Debug, Clone)]
pub struct Options {
    /// Identity to register.
    pub email: String,
    /// Password to register with.
    pub password: String,
    /// Events to save.
    pub events: u8,
    /// Client-side stretching cost.
    pub kdf: KdfParams,
}

/// Selftest outcome.
#[derive(Debug, Serialize)]
pub struct Report {
    /// Registered identity.
    pub email: String,
    /// Length of the salt the lookup returned.
    pub salt_len: usize,
    /// Whether the server proof matched.
    pub server_verified: bool,
    /// Subscription status once the first save refreshed it.
    pub subscription_status: Option<String>,
    /// Events saved.
    pub saved: usize,
    /// Events an empty snapshot was told to add.
    pub synced: usize,
    /// Whether a current snapshot produced an empty diff.
    pub up_to_date: bool,
    /// Wall time of the whole run in milliseconds.
    pub elapsed_ms: u128,
}

/// Runs the selftest.
pub async fn run(config: ServerConfig, options: Options) -> Result<Report, Box<dyn std::error::Error>> {
    let started = Instant::now();
    let store = MemoryStore::new();
    let billing = Arc::new(StaticBilling::new());
    billing.set_status(SUBSCRIPTION_ID, ACTIVE_STATUS);
    let server = AclifeServer::new(config, Backends::in_memory(&store, billing));
    server.start();

    let client = PasswordProofClient::new(options.kdf);
    let request = client.registration(&options.email, &options.password)?;
    server.register(&server.context(PEER, None), request).await?;
    info!(email = %options.email, "registered");

    let salt_request = LoginStartRequest {
        email: options.email.clone(),
        client_public: None,
    };
    let salt_len = server
        .login_start(&server.context(PEER, None), salt_request)
        .await?
        .salt()
        .len();

    let attempt = client.start_login(&options.email);
    let challenge = match server
        .login_start(&server.context(PEER, None), attempt.request())
        .await?
    {
        LoginStartReply::Challenge(challenge) => challenge,
        LoginStartReply::Salt { .. } => return Err("server answered without a challenge".into()),
    };
    let proof = attempt.respond(&options.password, &challenge)?;
    let grant = server
        .login_verify(&server.context(PEER, None), proof.request.clone())
        .await?;
    proof.verify_server(&grant.reply.server_proof)?;
    info!(expires_at = grant.expires_at, "logged in");

    let ctx = server
        .context(PEER, None)
        .with_access_token(grant.access_token)
        .with_origin(ORIGIN);
    server
        .link_subscription(&ctx, "selftest-customer", SUBSCRIPTION_ID)
        .await?;

    let events: Vec<CalendarEvent> = (0..options.events)
        .map(|n| CalendarEvent::new(EventId::random(), vec![n; 32], 1_000 + i64::from(n)))
        .collect();
    let changes: Vec<EventChange> = events.iter().map(EventChange::added).collect();
    let summary = server.save_events(&ctx, &changes).await?;
    let account = server.account_info(&ctx).await?;

    let diff = server.sync_events(&ctx, &[]).await?;
    let current: Vec<SnapshotEntry> = events
        .iter()
        .map(|event| SnapshotEntry::new(event.id, event.updated_at))
        .collect();
    let up_to_date = server.sync_events(&ctx, &current).await?.is_empty();

    server.logout(&ctx).await?;
    server.shutdown().await;

    Ok(Report {
        email: options.email,
        salt_len,
        server_verified: true,
        subscription_status: account.subscription_status,
        saved: summary.upserted,
        synced: diff.added.len(),
        up_to_date,
        elapsed_ms: started.elapsed().as_millis(),
    })
}

/// Prints a report.
pub fn print(report: &Report, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(report)?),
        "text" => {
            println!("Selftest for {}", report.email);
            println!("  Salt length:          {} bytes", report.salt_len);
            println!("  Server proof:         {}", verdict(report.server_verified));
            println!(
                "  Subscription:         {}",
                report.subscription_status.as_deref().unwrap_or("none")
            );
            println!("  Events saved:         {}", report.saved);
            println!("  Events synced:        {}", report.synced);
            println!("  Up to date:           {}", verdict(report.up_to_date));
            println!("  Elapsed:              {} ms", report.elapsed_ms);
        }
        other => return Err(format!("Unknown format: {other}").into()),
    }
    Ok(())
}

fn verdict(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "FAILED"
    }
}
