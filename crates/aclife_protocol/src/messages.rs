//! Authentication messages and the response envelope.

use crate::b64;
use serde::{Deserialize, Serialize};

/// Response envelope: `{success, message?, data?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply<T> {
    /// Whether the request succeeded.
    pub success: bool,
    /// Short human-readable message, mainly on failure.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// Response payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Reply<T> {
    /// A successful reply carrying `data`.
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            message: String::new(),
            data: Some(data),
        }
    }

    /// A successful reply with no payload.
    pub fn empty() -> Self {
        Self {
            success: true,
            message: String::new(),
            data: None,
        }
    }

    /// A failed reply.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

/// Registration material computed by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// Identity (email address).
    pub email: String,
    /// Salt the client uses for its own key derivation.
    #[serde(with = "b64")]
    pub salt: Vec<u8>,
    /// Salt for the password-proof protocol.
    #[serde(with = "b64")]
    pub srp_salt: Vec<u8>,
    /// Password-proof verifier.
    #[serde(with = "b64")]
    pub verifier: Vec<u8>,
    /// Fixed-length client challenge blob.
    #[serde(with = "b64")]
    pub challenge: Vec<u8>,
}

/// First login phase. Without `A` this is a bare salt lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginStartRequest {
    /// Identity (email address).
    pub email: String,
    /// Client public ephemeral value.
    #[serde(
        rename = "A",
        default,
        with = "b64::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub client_public: Option<Vec<u8>>,
}

/// Server half of the first login phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginChallenge {
    /// Protocol salt.
    #[serde(with = "b64")]
    pub salt: Vec<u8>,
    /// Server public ephemeral value.
    #[serde(rename = "B", with = "b64")]
    pub server_public: Vec<u8>,
    /// Identifier of the pending exchange.
    pub session_id: String,
}

/// Reply to [`LoginStartRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LoginStartReply {
    /// The exchange was started.
    Challenge(LoginChallenge),
    /// Salt lookup only.
    Salt {
        /// Protocol salt.
        #[serde(with = "b64")]
        salt: Vec<u8>,
    },
}

impl LoginStartReply {
    /// The protocol salt, present in both forms.
    pub fn salt(&self) -> &[u8] {
        match self {
            LoginStartReply::Challenge(challenge) => &challenge.salt,
            LoginStartReply::Salt { salt } => salt,
        }
    }
}

/// Second login phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginVerifyRequest {
    /// Identity (email address).
    pub email: String,
    /// Identifier returned by the first phase.
    pub session_id: String,
    /// Client proof.
    #[serde(rename = "M1", with = "b64")]
    pub client_proof: Vec<u8>,
}

/// Body of a successful second phase. The access token is delivered out of
/// band as an opaque credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginVerifyReply {
    /// Server proof, which the client must check before trusting the session.
    #[serde(rename = "M2", with = "b64")]
    pub server_proof: Vec<u8>,
}

/// Account details safe to return to the account owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicAccount {
    /// Public account identifier.
    pub uuid: String,
    /// Identity (email address).
    pub email: String,
    /// Billing status, if a subscription is linked.
    #[serde(default)]
    pub subscription_status: Option<String>,
    /// Client key-derivation salt.
    #[serde(with = "b64")]
    pub salt: Vec<u8>,
    /// Client challenge blob.
    #[serde(with = "b64")]
    pub challenge: Vec<u8>,
}
