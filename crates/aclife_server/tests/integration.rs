//! End-to-end tests through the server facade with the in-memory backend.

use aclife_protocol::{
    CalendarEvent, EventChange, EventId, LoginStartReply, LoginStartRequest, Reply, SnapshotEntry,
};
use aclife_server::{
    AccountId, AccountStore, AclifeServer, AuthFailure, Backends, FailPoint, KdfParams,
    LogNotifier, MemoryStore, PasswordProofClient, PushError, PushEvent, PushNotifier, RatePolicy,
    RequestContext, ServerConfig, ServerError, SessionRecord, SessionStore, StaticBilling,
    ACTIVE_STATUS,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

const PEER: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 10));
const FAST: KdfParams = KdfParams::new(8, 1, 1);

struct Harness {
    store: MemoryStore,
    billing: Arc<StaticBilling>,
    server: AclifeServer,
    client: PasswordProofClient,
}

impl Harness {
    fn new(config: ServerConfig) -> Self {
        Self::with_push(config, Arc::new(LogNotifier))
    }

    fn with_push(config: ServerConfig, push: Arc<dyn PushNotifier>) -> Self {
        let store = MemoryStore::new();
        let billing = Arc::new(StaticBilling::new());
        let backends = Backends::in_memory(&store, billing.clone()).with_push(push);
        let server = AclifeServer::new(config, backends);
        Self {
            store,
            billing,
            server,
            client: PasswordProofClient::new(FAST),
        }
    }

    fn ctx(&self) -> RequestContext {
        self.server.context(PEER, None)
    }

    async fn register(&self, email: &str, password: &str) -> Result<(), ServerError> {
        let request = self.client.registration(email, password).unwrap();
        self.server.register(&self.ctx(), request).await
    }

    /// Runs both login phases and returns a context carrying the token.
    async fn login(&self, email: &str, password: &str) -> Result<RequestContext, ServerError> {
        let attempt = self.client.start_login(email);
        let challenge = match self.server.login_start(&self.ctx(), attempt.request()).await? {
            LoginStartReply::Challenge(challenge) => challenge,
            LoginStartReply::Salt { .. } => panic!("expected a challenge"),
        };
        let proof = attempt.respond(password, &challenge).unwrap();
        let grant = self
            .server
            .login_verify(&self.ctx(), proof.request.clone())
            .await?;
        proof.verify_server(&grant.reply.server_proof).unwrap();
        Ok(self.ctx().with_access_token(grant.access_token).with_origin("dev001"))
    }

    /// Registers, logs in and activates a subscription.
    async fn subscriber(&self, email: &str) -> RequestContext {
        self.register(email, "pw").await.unwrap();
        let ctx = self.login(email, "pw").await.unwrap();
        let subscription = format!("sub_{email}");
        self.billing.set_status(&subscription, ACTIVE_STATUS);
        self.server
            .link_subscription(&ctx, "cus_1", &subscription)
            .await
            .unwrap();
        ctx
    }
}

#[derive(Default)]
struct Outbox(Mutex<Vec<(AccountId, PushEvent)>>);

#[async_trait]
impl PushNotifier for Outbox {
    async fn notify(&self, owner: AccountId, event: PushEvent) -> Result<(), PushError> {
        self.0.lock().push((owner, event));
        Ok(())
    }
}

fn event(n: u8, ts: i64) -> CalendarEvent {
    CalendarEvent::new(EventId::from_bytes([n; 16]), vec![n; 8], ts)
}

#[tokio::test]
async fn register_login_save_sync_logout() {
    let h = Harness::new(ServerConfig::default());
    let ctx = h.subscriber("ada@example.com").await;

    let info = h.server.account_info(&ctx).await.unwrap();
    assert_eq!(info.email, "ada@example.com");

    let summary = h
        .server
        .save_events(
            &ctx,
            &[EventChange::added(&event(1, 100)), EventChange::added(&event(2, 200))],
        )
        .await
        .unwrap();
    assert_eq!(summary.upserted, 2);

    let snapshot = [
        SnapshotEntry::new(EventId::from_bytes([1; 16]), 50),
        SnapshotEntry::new(EventId::from_bytes([3; 16]), 10),
    ];
    let diff = h.server.sync_events(&ctx, &snapshot).await.unwrap();
    assert_eq!(diff.added, vec![event(2, 200)]);
    assert_eq!(diff.updated, vec![event(1, 100)]);
    assert_eq!(diff.deleted, vec![EventId::from_bytes([3; 16])]);

    let body = serde_json::to_value(Reply::success(diff.to_wire())).unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(
        body["data"]["deleted"][0],
        "03030303-0303-0303-0303-030303030303"
    );

    let info = h.server.account_info(&ctx).await.unwrap();
    assert_eq!(info.subscription_status.as_deref(), Some(ACTIVE_STATUS));

    let token = ctx.access_token().unwrap().to_owned();
    h.server.logout(&ctx).await.unwrap();
    assert_eq!(h.store.session_count(), 0);
    assert_eq!(
        h.server.account_info(&h.ctx().with_access_token(token)).await,
        Err(ServerError::Unauthorized(AuthFailure::NotLoggedIn))
    );
}

#[tokio::test]
async fn second_registration_conflicts_and_keeps_first() {
    let h = Harness::new(ServerConfig::default());
    h.register("ada@example.com", "first").await.unwrap();

    let err = h.register("ada@example.com", "second").await.unwrap_err();
    assert_eq!(err.http_status(), 409);
    assert_eq!(err.public_message(), "Email already in use.");
    assert_eq!(h.store.account_count(), 1);

    assert!(h.login("ada@example.com", "first").await.is_ok());
    assert_eq!(
        h.login("ada@example.com", "second").await.map(|_| ()),
        Err(ServerError::invalid_credentials())
    );
}

#[tokio::test]
async fn malformed_ephemeral_indistinguishable_from_unknown_identity() {
    let h = Harness::new(ServerConfig::default());
    h.register("ada@example.com", "pw").await.unwrap();

    let start = |email: &str, a: Vec<u8>| LoginStartRequest {
        email: email.into(),
        client_public: Some(a),
    };
    let malformed = h
        .server
        .login_start(&h.ctx(), start("ada@example.com", vec![0; 512]))
        .await
        .unwrap_err();
    let unknown = h
        .server
        .login_start(
            &h.ctx(),
            h.client.start_login("nobody@example.com").request(),
        )
        .await
        .unwrap_err();

    let as_json = |err: &ServerError| serde_json::to_string(&err.to_reply::<()>()).unwrap();
    assert_eq!(as_json(&malformed), as_json(&unknown));
    assert_eq!(malformed.http_status(), unknown.http_status());
    assert_eq!(h.server.pending_logins(), 0);
}

#[tokio::test]
async fn salt_lookup_same_shape_for_unknown_identity() {
    let h = Harness::new(ServerConfig::default());
    h.register("ada@example.com", "pw").await.unwrap();
    let lookup = |email: &str| LoginStartRequest {
        email: email.into(),
        client_public: None,
    };

    let known = h.server.login_start(&h.ctx(), lookup("ada@example.com")).await.unwrap();
    let unknown = h.server.login_start(&h.ctx(), lookup("eve@example.com")).await.unwrap();
    let shape = |reply: &LoginStartReply| {
        let value = serde_json::to_value(reply).unwrap();
        let mut keys: Vec<String> = value.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        (keys, reply.salt().len())
    };
    assert_eq!(shape(&known), shape(&unknown));
}

#[tokio::test]
async fn consumed_session_id_cannot_be_replayed() {
    let h = Harness::new(ServerConfig::default());
    h.register("ada@example.com", "pw").await.unwrap();

    let attempt = h.client.start_login("ada@example.com");
    let challenge = match h.server.login_start(&h.ctx(), attempt.request()).await.unwrap() {
        LoginStartReply::Challenge(challenge) => challenge,
        LoginStartReply::Salt { .. } => panic!("expected a challenge"),
    };
    let proof = attempt.respond("pw", &challenge).unwrap();

    assert!(h
        .server
        .login_verify(&h.ctx(), proof.request.clone())
        .await
        .is_ok());
    for _ in 0..3 {
        assert_eq!(
            h.server
                .login_verify(&h.ctx(), proof.request.clone())
                .await
                .map(|_| ()),
            Err(ServerError::Unauthorized(AuthFailure::ExpiredSession))
        );
    }
}

#[tokio::test(start_paused = true)]
async fn unfinished_login_expires_after_ttl_and_sweep() {
    let h = Harness::new(
        ServerConfig::default()
            .with_protocol_session_ttl(Duration::from_secs(300))
            .with_sweep_interval(Duration::from_secs(60))
            .with_request_timeout(Duration::from_secs(3600)),
    );
    h.server.start();
    h.register("ada@example.com", "pw").await.unwrap();

    let attempt = h.client.start_login("ada@example.com");
    let challenge = match h.server.login_start(&h.ctx(), attempt.request()).await.unwrap() {
        LoginStartReply::Challenge(challenge) => challenge,
        LoginStartReply::Salt { .. } => panic!("expected a challenge"),
    };
    assert_eq!(h.server.pending_logins(), 1);

    tokio::time::sleep(Duration::from_secs(300 + 60 + 1)).await;
    assert_eq!(h.server.pending_logins(), 0);

    let proof = attempt.respond("pw", &challenge).unwrap();
    let err = h
        .server
        .login_verify(&h.ctx(), proof.request)
        .await
        .unwrap_err();
    assert_eq!(err.public_message(), "Invalid or expired session.");
    h.server.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn burst_beyond_budget_rejected_until_window_passes() {
    let h = Harness::new(ServerConfig::default().with_auth_rate(RatePolicy::per_minute(3)));
    let lookup = || LoginStartRequest {
        email: "ada@example.com".into(),
        client_public: None,
    };

    for _ in 0..3 {
        assert!(h.server.login_start(&h.ctx(), lookup()).await.is_ok());
    }
    let err = h.server.login_start(&h.ctx(), lookup()).await.unwrap_err();
    assert_eq!(err, ServerError::RateLimited);
    assert_eq!(err.http_status(), 429);
    assert_ne!(err.public_message(), ServerError::invalid_credentials().public_message());

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert!(h.server.login_start(&h.ctx(), lookup()).await.is_ok());
}

#[tokio::test]
async fn failed_batch_leaves_no_trace() {
    let h = Harness::new(ServerConfig::default());
    let ctx = h.subscriber("ada@example.com").await;
    h.server
        .save_events(&ctx, &[EventChange::added(&event(1, 100))])
        .await
        .unwrap();

    h.store.fail_next(FailPoint::UpsertEvents);
    let err = h
        .server
        .save_events(
            &ctx,
            &[
                EventChange::deleted(EventId::from_bytes([1; 16])),
                EventChange::added(&event(2, 100)),
            ],
        )
        .await
        .unwrap_err();
    assert_eq!(err.public_message(), "An unexpected error occurred.");

    let diff = h.server.sync_events(&ctx, &[]).await.unwrap();
    assert_eq!(diff.added, vec![event(1, 100)]);
}

#[tokio::test]
async fn inactive_subscription_blocks_calendar() {
    let h = Harness::new(ServerConfig::default());
    h.register("ada@example.com", "pw").await.unwrap();
    let ctx = h.login("ada@example.com", "pw").await.unwrap();

    let err = h.server.sync_events(&ctx, &[]).await.unwrap_err();
    assert_eq!(err, ServerError::Unauthorized(AuthFailure::SubscriptionRequired));
    assert_eq!(err.http_status(), 402);

    h.billing.set_status("sub_1", "canceled");
    h.server.link_subscription(&ctx, "cus_1", "sub_1").await.unwrap();
    assert!(h.server.sync_events(&ctx, &[]).await.is_err());

    h.server
        .record_subscription_status(&h.ctx(), "sub_1", ACTIVE_STATUS)
        .await
        .unwrap();
    assert!(h.server.sync_events(&ctx, &[]).await.is_ok());
}

#[tokio::test]
async fn subscription_optional_when_disabled() {
    let h = Harness::new(ServerConfig::default().with_subscription_required(false));
    h.register("ada@example.com", "pw").await.unwrap();
    let ctx = h.login("ada@example.com", "pw").await.unwrap();
    assert!(h.server.sync_events(&ctx, &[]).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn slow_store_surfaces_timeout() {
    let h = Harness::new(ServerConfig::default().with_request_timeout(Duration::from_secs(10)));
    let ctx = h.subscriber("ada@example.com").await;

    h.store.set_latency(Duration::from_secs(30));
    let err = h.server.sync_events(&ctx, &[]).await.unwrap_err();
    assert!(matches!(err, ServerError::Timeout { .. }));
    assert_eq!(err.public_message(), "Request timed out.");
}

#[tokio::test]
async fn expired_access_token_is_not_logged_in() {
    let h = Harness::new(ServerConfig::default());
    h.register("ada@example.com", "pw").await.unwrap();
    let ctx = h.login("ada@example.com", "pw").await.unwrap();
    let owner = h.server.account_info(&ctx).await.unwrap();
    assert_eq!(owner.email, "ada@example.com");

    let account = h.store.find_by_email("ada@example.com").await.unwrap().unwrap();
    h.store
        .insert_session(SessionRecord {
            owner: account.id,
            token: "old".into(),
            created_at: 0,
            expires_at: 1,
        })
        .await
        .unwrap();
    let stale = h.ctx().with_access_token("old");
    assert_eq!(
        h.server.account_info(&stale).await,
        Err(ServerError::Unauthorized(AuthFailure::NotLoggedIn))
    );
}

#[tokio::test]
async fn test_push_reaches_only_the_caller() {
    let outbox = Arc::new(Outbox::default());
    let h = Harness::with_push(ServerConfig::default(), outbox.clone());

    assert_eq!(
        h.server.test_push(&h.ctx()).await,
        Err(ServerError::Unauthorized(AuthFailure::NotLoggedIn))
    );
    assert!(outbox.0.lock().is_empty());

    h.register("ada@example.com", "pw").await.unwrap();
    let ctx = h.login("ada@example.com", "pw").await.unwrap();
    let account = h.server.account_info(&ctx).await.unwrap();
    h.server.test_push(&ctx).await.unwrap();

    let sent = outbox.0.lock().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].1,
        PushEvent::Notification {
            title: "Test Notification".into(),
            body: format!("You are user: {}", account.uuid),
        }
    );
}
