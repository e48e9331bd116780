//! Password-proof registration and login.
//!
//! Login is a two-phase exchange. Phase one stores the server half of the
//! exchange in a [`TtlStore`] under a random session identifier; phase two
//! takes it back out. Removal happens at lookup, so an identifier can be
//! presented at most once whatever the outcome.
//!
//! Every credential failure in phase one (unknown identity, malformed or
//! oversized `A`) yields the same [`AuthFailure::InvalidCredentials`].

pub mod client;
pub mod exchange;
pub mod validate;

use crate::config::{SecretKey, ServerConfig};
use crate::deadline::Deadline;
use crate::error::{AuthFailure, ServerError, ServerResult};
use crate::store::{
    duration_millis, now_millis, AccountId, AccountStore, NewAccount, SessionRecord, SessionStore,
};
use aclife_ephemeral::TtlStore;
use aclife_protocol::{
    LoginChallenge, LoginStartReply, LoginStartRequest, LoginVerifyReply, LoginVerifyRequest,
    RegisterRequest, TimestampMillis,
};
use exchange::{random_token, ServerExchange};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};
use validate::{MAX_EXCHANGE_VALUE_LEN, PROTOCOL_SALT_LEN};

/// Server state bridging the two login phases.
#[derive(Debug)]
pub struct PendingLogin {
    exchange: ServerExchange,
    owner: AccountId,
    email: String,
    created_at: Instant,
}

impl PendingLogin {
    /// Account the exchange was started for.
    pub fn owner(&self) -> AccountId {
        self.owner
    }

    /// When phase one completed.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }
}

/// Pending logins keyed by session identifier.
pub type PendingLogins = TtlStore<String, PendingLogin>;

/// Outcome of a successful second phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginGrant {
    /// Body returned to the client.
    pub reply: LoginVerifyReply,
    /// Opaque access token, delivered out of band.
    pub access_token: String,
    /// When the token stops being accepted.
    pub expires_at: TimestampMillis,
}

/// Drives registration, login and logout.
pub struct AuthService {
    accounts: Arc<dyn AccountStore>,
    sessions: Arc<dyn SessionStore>,
    pending: Arc<PendingLogins>,
    access_token_lifetime: Duration,
    decoy_key: SecretKey,
}

impl AuthService {
    /// Creates the service over the given stores.
    pub fn new(
        config: &ServerConfig,
        accounts: Arc<dyn AccountStore>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            accounts,
            sessions,
            pending: Arc::new(TtlStore::new(config.protocol_session_ttl)),
            access_token_lifetime: config.access_token_lifetime,
            decoy_key: config.salt_decoy_key.clone(),
        }
    }

    /// The pending-login store, for sweeping.
    pub fn pending_logins(&self) -> Arc<PendingLogins> {
        Arc::clone(&self.pending)
    }

    /// Stores a new credential record.
    pub async fn register(&self, request: RegisterRequest, deadline: &Deadline) -> ServerResult<()> {
        validate::registration(&request)?;

        let account = deadline
            .run(
                "insert_account",
                self.accounts.insert_account(NewAccount {
                    email: request.email,
                    salt: request.salt,
                    srp_salt: request.srp_salt,
                    verifier: request.verifier,
                    challenge: request.challenge,
                }),
            )
            .await?;

        info!(user_id = %account.id, "account registered");
        Ok(())
    }

    /// First login phase.
    ///
    /// Without `A` this is a salt lookup: known identities get their stored
    /// protocol salt, unknown ones a stable decoy of the same length.
    pub async fn login_start(
        &self,
        request: LoginStartRequest,
        deadline: &Deadline,
    ) -> ServerResult<LoginStartReply> {
        if validate::identity(&request.email).is_err() {
            return Err(ServerError::invalid_credentials());
        }

        let account = deadline
            .run("find_account", self.accounts.find_by_email(&request.email))
            .await?;

        let Some(client_public) = request.client_public else {
            let salt = match account {
                Some(account) => account.srp_salt,
                None => self.decoy_salt(&request.email)?,
            };
            return Ok(LoginStartReply::Salt { salt });
        };

        let Some(account) = account else {
            debug!("login started for unknown identity");
            return Err(ServerError::invalid_credentials());
        };
        if client_public.len() > MAX_EXCHANGE_VALUE_LEN {
            debug!(user_id = %account.id, "client ephemeral too long");
            return Err(ServerError::invalid_credentials());
        }

        let verifier = account.verifier.clone();
        let began = deadline
            .run("begin_exchange", async move {
                tokio::task::spawn_blocking(move || {
                    ServerExchange::begin(&verifier, &client_public)
                })
                .await
                .map_err(|err| ServerError::Internal(err.to_string()))
            })
            .await?;
        let exchange = began.map_err(|err| {
            debug!(user_id = %account.id, error = ?err, "client ephemeral rejected");
            ServerError::invalid_credentials()
        })?;

        let session_id = random_token();
        let server_public = exchange.server_public().to_vec();
        self.pending.insert(
            session_id.clone(),
            PendingLogin {
                exchange,
                owner: account.id,
                email: account.email,
                created_at: Instant::now(),
            },
        );
        debug!(user_id = %account.id, "login exchange started");

        Ok(LoginStartReply::Challenge(LoginChallenge {
            salt: account.srp_salt,
            server_public,
            session_id,
        }))
    }

    /// Second login phase. On success a session record is persisted and the
    /// server proof returned.
    pub async fn login_verify(
        &self,
        request: LoginVerifyRequest,
        deadline: &Deadline,
    ) -> ServerResult<LoginGrant> {
        let Some(pending) = self.pending.remove(&request.session_id) else {
            debug!("unknown or expired login exchange");
            return Err(ServerError::Unauthorized(AuthFailure::ExpiredSession));
        };
        if pending.email != request.email {
            debug!(user_id = %pending.owner, "login exchange presented by another identity");
            return Err(ServerError::Unauthorized(AuthFailure::InvalidSession));
        }
        if request.client_proof.len() > MAX_EXCHANGE_VALUE_LEN
            || pending.exchange.verify_client(&request.client_proof).is_err()
        {
            debug!(user_id = %pending.owner, "client proof rejected");
            return Err(ServerError::invalid_credentials());
        }

        let created_at = now_millis();
        let expires_at = created_at.saturating_add(duration_millis(self.access_token_lifetime));
        let access_token = random_token();
        deadline
            .run(
                "insert_session",
                self.sessions.insert_session(SessionRecord {
                    owner: pending.owner,
                    token: access_token.clone(),
                    created_at,
                    expires_at,
                }),
            )
            .await?;

        info!(user_id = %pending.owner, "login succeeded");
        Ok(LoginGrant {
            reply: LoginVerifyReply {
                server_proof: pending.exchange.server_proof().to_vec(),
            },
            access_token,
            expires_at,
        })
    }

    /// Deletes the session for `token`. Never fails; a missing session or a
    /// store error is only logged.
    pub async fn logout(&self, token: &str, deadline: &Deadline) {
        if token.is_empty() {
            return;
        }
        match deadline
            .run("delete_session", self.sessions.delete_session(token))
            .await
        {
            Ok(existed) => debug!(existed, "logout"),
            Err(err) => debug!(error = %err, "logout ignored store failure"),
        }
    }

    /// Decoy protocol salt for an identity with no account: the first bytes
    /// of HMAC-SHA-256 over the identity.
    fn decoy_salt(&self, email: &str) -> ServerResult<Vec<u8>> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.decoy_key.expose())
            .map_err(|err| ServerError::Internal(err.to_string()))?;
        mac.update(email.as_bytes());
        let digest = mac.finalize().into_bytes();
        Ok(digest[..PROTOCOL_SALT_LEN].to_vec())
    }
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("pending", &self.pending.len())
            .field("access_token_lifetime", &self.access_token_lifetime)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::client::{KdfParams, PasswordProofClient};
    use super::*;
    use crate::store::{FailPoint, MemoryStore};

    const FAST: KdfParams = KdfParams::new(8, 1, 1);

    fn service(store: &MemoryStore) -> AuthService {
        AuthService::new(
            &ServerConfig::default(),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
        )
    }

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(30))
    }

    async fn registered(store: &MemoryStore, email: &str, password: &str) -> AuthService {
        let auth = service(store);
        let request = PasswordProofClient::new(FAST)
            .registration(email, password)
            .unwrap();
        auth.register(request, &deadline()).await.unwrap();
        auth
    }

    fn challenge(reply: LoginStartReply) -> LoginChallenge {
        match reply {
            LoginStartReply::Challenge(challenge) => challenge,
            LoginStartReply::Salt { .. } => panic!("expected a challenge"),
        }
    }

    #[tokio::test]
    async fn register_then_login() {
        let store = MemoryStore::new();
        let auth = registered(&store, "ada@example.com", "pw").await;
        let client = PasswordProofClient::new(FAST);

        let attempt = client.start_login("ada@example.com");
        let challenge = challenge(auth.login_start(attempt.request(), &deadline()).await.unwrap());
        assert_eq!(challenge.session_id.len(), 64);
        assert_eq!(auth.pending.len(), 1);

        let proof = attempt.respond("pw", &challenge).unwrap();
        let grant = auth
            .login_verify(proof.request.clone(), &deadline())
            .await
            .unwrap();
        assert!(proof.verify_server(&grant.reply.server_proof).is_ok());
        assert_eq!(grant.access_token.len(), 64);
        assert_eq!(store.session_count(), 1);
        assert!(auth.pending.is_empty());
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let store = MemoryStore::new();
        let auth = registered(&store, "ada@example.com", "pw").await;
        let again = PasswordProofClient::new(FAST)
            .registration("ada@example.com", "other")
            .unwrap();
        assert_eq!(
            auth.register(again, &deadline()).await,
            Err(ServerError::Conflict("Email already in use.".into()))
        );
        assert_eq!(store.account_count(), 1);
    }

    #[tokio::test]
    async fn registration_validates_before_storing() {
        let store = MemoryStore::new();
        let auth = service(&store);
        let mut request = PasswordProofClient::new(FAST)
            .registration("not-an-email", "pw")
            .unwrap();
        assert!(matches!(
            auth.register(request.clone(), &deadline()).await,
            Err(ServerError::InvalidInput(_))
        ));
        request.email = "ada@example.com".into();
        request.salt = vec![0; 17];
        assert!(auth.register(request, &deadline()).await.is_err());
        assert_eq!(store.account_count(), 0);
    }

    #[tokio::test]
    async fn salt_lookup_shape_does_not_reveal_existence() {
        let store = MemoryStore::new();
        let auth = registered(&store, "ada@example.com", "pw").await;
        let lookup = |email: &str| LoginStartRequest {
            email: email.into(),
            client_public: None,
        };

        let known = auth.login_start(lookup("ada@example.com"), &deadline()).await.unwrap();
        let unknown = auth.login_start(lookup("bob@example.com"), &deadline()).await.unwrap();
        let unknown_again = auth.login_start(lookup("bob@example.com"), &deadline()).await.unwrap();

        assert!(matches!(known, LoginStartReply::Salt { .. }));
        assert!(matches!(unknown, LoginStartReply::Salt { .. }));
        assert_eq!(known.salt().len(), unknown.salt().len());
        assert_eq!(unknown, unknown_again);
    }

    #[tokio::test]
    async fn short_protocol_salt_refused_at_registration() {
        let store = MemoryStore::new();
        let auth = service(&store);
        let mut request = PasswordProofClient::new(FAST)
            .registration("ada@example.com", "pw")
            .unwrap();
        request.srp_salt.truncate(8);
        assert!(matches!(
            auth.register(request, &deadline()).await,
            Err(ServerError::InvalidInput(_))
        ));
        assert_eq!(store.account_count(), 0);

        let unknown = auth
            .login_start(
                LoginStartRequest {
                    email: "ada@example.com".into(),
                    client_public: None,
                },
                &deadline(),
            )
            .await
            .unwrap();
        assert_eq!(unknown.salt().len(), PROTOCOL_SALT_LEN);
    }

    #[tokio::test]
    async fn malformed_ephemeral_matches_unknown_identity() {
        let store = MemoryStore::new();
        let auth = registered(&store, "ada@example.com", "pw").await;
        let start = |email: &str, a: Vec<u8>| LoginStartRequest {
            email: email.into(),
            client_public: Some(a),
        };

        let zero = auth
            .login_start(start("ada@example.com", vec![0; 512]), &deadline())
            .await
            .unwrap_err();
        let oversized = auth
            .login_start(start("ada@example.com", vec![1; 521]), &deadline())
            .await
            .unwrap_err();
        let unknown = auth
            .login_start(start("bob@example.com", vec![1; 512]), &deadline())
            .await
            .unwrap_err();

        assert_eq!(zero, unknown);
        assert_eq!(oversized, unknown);
        assert_eq!(unknown.public_message(), "Invalid credentials.");
        assert!(auth.pending.is_empty());
    }

    #[tokio::test]
    async fn session_id_is_single_use() {
        let store = MemoryStore::new();
        let auth = registered(&store, "ada@example.com", "pw").await;
        let attempt = PasswordProofClient::new(FAST).start_login("ada@example.com");
        let challenge = challenge(auth.login_start(attempt.request(), &deadline()).await.unwrap());
        let proof = attempt.respond("pw", &challenge).unwrap();

        assert!(auth.login_verify(proof.request.clone(), &deadline()).await.is_ok());
        assert_eq!(
            auth.login_verify(proof.request, &deadline()).await,
            Err(ServerError::Unauthorized(AuthFailure::ExpiredSession))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_verifies_grant_one_session() {
        let store = MemoryStore::new();
        let auth = Arc::new(registered(&store, "ada@example.com", "pw").await);
        let attempt = PasswordProofClient::new(FAST).start_login("ada@example.com");
        let challenge = challenge(auth.login_start(attempt.request(), &deadline()).await.unwrap());
        let proof = attempt.respond("pw", &challenge).unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let auth = Arc::clone(&auth);
                let request = proof.request.clone();
                tokio::spawn(async move { auth.login_verify(request, &deadline()).await })
            })
            .collect();

        let mut granted = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(grant) => {
                    assert!(proof.verify_server(&grant.reply.server_proof).is_ok());
                    granted += 1;
                }
                Err(err) => {
                    assert_eq!(err, ServerError::Unauthorized(AuthFailure::ExpiredSession));
                }
            }
        }
        assert_eq!(granted, 1);
        assert_eq!(store.session_count(), 1);
        assert!(auth.pending.is_empty());
    }

    #[tokio::test]
    async fn wrong_identity_consumes_exchange() {
        let store = MemoryStore::new();
        let auth = registered(&store, "ada@example.com", "pw").await;
        let attempt = PasswordProofClient::new(FAST).start_login("ada@example.com");
        let challenge = challenge(auth.login_start(attempt.request(), &deadline()).await.unwrap());
        let mut proof = attempt.respond("pw", &challenge).unwrap().request;

        proof.email = "mallory@example.com".into();
        assert_eq!(
            auth.login_verify(proof.clone(), &deadline()).await,
            Err(ServerError::Unauthorized(AuthFailure::InvalidSession))
        );
        proof.email = "ada@example.com".into();
        assert_eq!(
            auth.login_verify(proof, &deadline()).await,
            Err(ServerError::Unauthorized(AuthFailure::ExpiredSession))
        );
    }

    #[tokio::test]
    async fn wrong_password_rejected() {
        let store = MemoryStore::new();
        let auth = registered(&store, "ada@example.com", "pw").await;
        let attempt = PasswordProofClient::new(FAST).start_login("ada@example.com");
        let challenge = challenge(auth.login_start(attempt.request(), &deadline()).await.unwrap());
        let proof = attempt.respond("not pw", &challenge).unwrap();

        assert_eq!(
            auth.login_verify(proof.request, &deadline()).await,
            Err(ServerError::invalid_credentials())
        );
        assert_eq!(store.session_count(), 0);
    }

    #[tokio::test]
    async fn session_store_failure_is_internal() {
        let store = MemoryStore::new();
        let auth = registered(&store, "ada@example.com", "pw").await;
        let attempt = PasswordProofClient::new(FAST).start_login("ada@example.com");
        let challenge = challenge(auth.login_start(attempt.request(), &deadline()).await.unwrap());
        let proof = attempt.respond("pw", &challenge).unwrap();

        store.fail_next(FailPoint::InsertSession);
        let err = auth.login_verify(proof.request, &deadline()).await.unwrap_err();
        assert!(err.is_server_error());
        assert_eq!(err.public_message(), "An unexpected error occurred.");
    }

    #[tokio::test]
    async fn logout_is_idempotent() {
        let store = MemoryStore::new();
        let auth = registered(&store, "ada@example.com", "pw").await;
        let attempt = PasswordProofClient::new(FAST).start_login("ada@example.com");
        let challenge = challenge(auth.login_start(attempt.request(), &deadline()).await.unwrap());
        let proof = attempt.respond("pw", &challenge).unwrap();
        let grant = auth.login_verify(proof.request, &deadline()).await.unwrap();

        auth.logout(&grant.access_token, &deadline()).await;
        assert_eq!(store.session_count(), 0);
        auth.logout(&grant.access_token, &deadline()).await;
        auth.logout("", &deadline()).await;
    }

    #[test]
    fn decoy_salt_depends_on_key() {
        let store = MemoryStore::new();
        let a = AuthService::new(
            &ServerConfig::default().with_salt_decoy_key(vec![1; 32]),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
        );
        let b = AuthService::new(
            &ServerConfig::default().with_salt_decoy_key(vec![2; 32]),
            Arc::new(store.clone()),
            Arc::new(store),
        );
        let salt = a.decoy_salt("bob@example.com").unwrap();
        assert_eq!(salt.len(), PROTOCOL_SALT_LEN);
        assert_eq!(salt, a.decoy_salt("bob@example.com").unwrap());
        assert_ne!(salt, b.decoy_salt("bob@example.com").unwrap());
    }
}
