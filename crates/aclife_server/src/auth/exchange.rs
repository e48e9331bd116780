//! Server side of the SRP-6a exchange.
//!
//! Negotiation parameters are fixed: the RFC 5054 4096-bit group with
//! SHA-256. Clients stretch the password with Argon2id before it enters the
//! protocol (see [`super::client`]); the server only ever sees the verifier.

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use srp::groups::G_4096;
use srp::server::{SrpServer, SrpServerVerifier};
use srp::types::SrpAuthError;
use zeroize::Zeroizing;

/// Length of the random private ephemeral value, in bytes.
pub const EPHEMERAL_LEN: usize = 64;

/// Length of session identifiers and access tokens before hex encoding.
pub const TOKEN_BYTES: usize = 32;

/// Server state carried from the first login phase to the second.
pub struct ServerExchange {
    server_public: Vec<u8>,
    verifier: SrpServerVerifier<Sha256>,
}

impl ServerExchange {
    /// Draws a private ephemeral, computes `B` and absorbs the client's `A`.
    ///
    /// Fails if `A` is not a valid group element.
    pub fn begin(password_verifier: &[u8], client_public: &[u8]) -> Result<Self, SrpAuthError> {
        let mut secret = Zeroizing::new([0u8; EPHEMERAL_LEN]);
        OsRng.fill_bytes(&mut secret[..]);

        let server = SrpServer::<Sha256>::new(&G_4096);
        let server_public = server.compute_public_ephemeral(&secret[..], password_verifier);
        let verifier = server.process_reply(&secret[..], password_verifier, client_public)?;
        Ok(Self {
            server_public,
            verifier,
        })
    }

    /// The server public ephemeral `B`.
    pub fn server_public(&self) -> &[u8] {
        &self.server_public
    }

    /// Checks the client proof `M1` in constant time.
    pub fn verify_client(&self, client_proof: &[u8]) -> Result<(), SrpAuthError> {
        self.verifier.verify_client(client_proof)
    }

    /// The server proof `M2`.
    pub fn server_proof(&self) -> &[u8] {
        self.verifier.proof()
    }
}

impl std::fmt::Debug for ServerExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerExchange").finish_non_exhaustive()
    }
}

/// 256 random bits as lowercase hex.
pub fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// `len` random bytes.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
}
