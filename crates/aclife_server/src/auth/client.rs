//! Reference client for the password-proof exchange.
//!
//! Real clients run this logic in the browser or app. This implementation
//! exists so the server can be exercised end to end, and it doubles as
//! executable documentation of what a client must do:
//!
//! 1. Stretch the password with Argon2id over the protocol salt.
//! 2. Derive the verifier (registration) or the proof `M1` (login).
//! 3. Check the server proof `M2` before trusting the session.

use super::exchange::{random_bytes, EPHEMERAL_LEN};
use aclife_protocol::{LoginChallenge, LoginStartRequest, LoginVerifyRequest, RegisterRequest};
use argon2::{Algorithm, Argon2, Params, Version};
use sha2::Sha256;
use srp::client::{SrpClient, SrpClientVerifier};
use srp::groups::G_4096;
use thiserror::Error;
use zeroize::Zeroizing;

/// Salt length used for new registrations.
pub const SALT_LEN: usize = 16;
/// Challenge length used for new registrations.
pub const CHALLENGE_LEN: usize = 64;
/// Argon2id output length.
pub const STRETCHED_LEN: usize = 32;

/// Errors raised by the reference client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Key stretching failed, usually because of invalid parameters.
    #[error("key derivation failed: {0}")]
    Kdf(String),

    /// The server's values were rejected by the protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server could not prove knowledge of the verifier.
    #[error("server proof mismatch")]
    ServerProofMismatch,
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes.
    pub iterations: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl KdfParams {
    /// Creates parameters.
    pub const fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Self {
        Self {
            memory_kib,
            iterations,
            parallelism,
        }
    }

    /// Stretches `identity:password` over `salt`.
    pub fn stretch(
        &self,
        identity: &str,
        password: &str,
        salt: &[u8],
    ) -> Result<Zeroizing<[u8; STRETCHED_LEN]>, ClientError> {
        let params = Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(STRETCHED_LEN),
        )
        .map_err(|err| ClientError::Kdf(err.to_string()))?;

        let input = Zeroizing::new(format!("{identity}:{password}"));
        let mut out = Zeroizing::new([0u8; STRETCHED_LEN]);
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            .hash_password_into(input.as_bytes(), salt, &mut out[..])
            .map_err(|err| ClientError::Kdf(err.to_string()))?;
        Ok(out)
    }
}

impl Default for KdfParams {
    /// 64 MiB, three passes, one lane.
    fn default() -> Self {
        Self::new(64 * 1024, 3, 1)
    }
}

/// Client half of registration and login.
#[derive(Debug, Clone, Default)]
pub struct PasswordProofClient {
    kdf: KdfParams,
}

impl PasswordProofClient {
    /// Creates a client with the given stretching cost.
    pub fn new(kdf: KdfParams) -> Self {
        Self { kdf }
    }

    /// Computes fresh registration material for `email`.
    ///
    /// The authentication salt and challenge are random placeholders for the
    /// client-side key hierarchy, which the server stores but never reads.
    pub fn registration(&self, email: &str, password: &str) -> Result<RegisterRequest, ClientError> {
        let srp_salt = random_bytes(SALT_LEN);
        let stretched = self.kdf.stretch(email, password, &srp_salt)?;
        let verifier = SrpClient::<Sha256>::new(&G_4096).compute_verifier(
            email.as_bytes(),
            &stretched[..],
            &srp_salt,
        );

        Ok(RegisterRequest {
            email: email.to_owned(),
            salt: random_bytes(SALT_LEN),
            srp_salt,
            verifier,
            challenge: random_bytes(CHALLENGE_LEN),
        })
    }

    /// Begins a login by drawing a private ephemeral.
    pub fn start_login(&self, email: &str) -> LoginAttempt {
        let secret = Zeroizing::new(random_bytes(EPHEMERAL_LEN));
        let client_public = SrpClient::<Sha256>::new(&G_4096).compute_public_ephemeral(&secret);
        LoginAttempt {
            kdf: self.kdf,
            email: email.to_owned(),
            secret,
            client_public,
        }
    }
}

/// A login in progress on the client.
pub struct LoginAttempt {
    kdf: KdfParams,
    email: String,
    secret: Zeroizing<Vec<u8>>,
    client_public: Vec<u8>,
}

impl LoginAttempt {
    /// The first-phase request carrying `A`.
    pub fn request(&self) -> LoginStartRequest {
        LoginStartRequest {
            email: self.email.clone(),
            client_public: Some(self.client_public.clone()),
        }
    }

    /// Answers the server challenge with a proof.
    pub fn respond(
        &self,
        password: &str,
        challenge: &LoginChallenge,
    ) -> Result<ClientProof, ClientError> {
        let stretched = self.kdf.stretch(&self.email, password, &challenge.salt)?;
        let verifier = SrpClient::<Sha256>::new(&G_4096)
            .process_reply(
                &self.secret,
                self.email.as_bytes(),
                &stretched[..],
                &challenge.salt,
                &challenge.server_public,
            )
            .map_err(|err| ClientError::Protocol(format!("{err:?}")))?;

        Ok(ClientProof {
            request: LoginVerifyRequest {
                email: self.email.clone(),
                session_id: challenge.session_id.clone(),
                client_proof: verifier.proof().to_vec(),
            },
            verifier,
        })
    }
}

impl std::fmt::Debug for LoginAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginAttempt")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// The client proof plus the state needed to check the server's answer.
pub struct ClientProof {
    /// Second-phase request carrying `M1`.
    pub request: LoginVerifyRequest,
    verifier: SrpClientVerifier<Sha256>,
}

impl ClientProof {
    /// Checks the server proof `M2`. Only after this succeeds has the server
    /// proven it holds the verifier.
    pub fn verify_server(&self, server_proof: &[u8]) -> Result<(), ClientError> {
        self.verifier
            .verify_server(server_proof)
            .map_err(|_| ClientError::ServerProofMismatch)
    }

    /// The shared session key both sides derived.
    pub fn session_key(&self) -> &[u8] {
        self.verifier.key()
    }
}

impl std::fmt::Debug for ClientProof {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientProof")
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}
