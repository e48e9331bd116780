//! Input bounds for authentication requests.

use crate::error::{ServerError, ServerResult};
use aclife_protocol::RegisterRequest;
use regex::Regex;
use std::sync::OnceLock;

/// Maximum identity length accepted on any auth request, in bytes.
pub const MAX_IDENTITY_LEN: usize = 260;
/// Maximum length of a syntactically valid email address.
pub const MAX_EMAIL_LEN: usize = 254;
/// Maximum salt length, in bytes.
pub const MAX_SALT_LEN: usize = 16;
/// Required protocol salt length, in bytes. Decoy salts for unknown
/// identities have the same length.
pub const PROTOCOL_SALT_LEN: usize = 16;
/// Maximum verifier length, in bytes.
pub const MAX_VERIFIER_LEN: usize = 520;
/// Maximum challenge length, in bytes.
pub const MAX_CHALLENGE_LEN: usize = 64;
/// Maximum client ephemeral or proof length, in bytes.
pub const MAX_EXCHANGE_VALUE_LEN: usize = 520;

const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$";

fn email_regex() -> Option<&'static Regex> {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(EMAIL_PATTERN).ok()).as_ref()
}

/// Returns true if `email` is a plausible address.
pub fn is_valid_email(email: &str) -> bool {
    email.len() <= MAX_EMAIL_LEN && email_regex().is_some_and(|re| re.is_match(email))
}

/// Checks that a field is present and at most `max` bytes long.
pub fn bounded(field: &'static str, len: usize, max: usize) -> ServerResult<()> {
    if len == 0 {
        return Err(ServerError::InvalidInput(format!("{field} is missing")));
    }
    if len > max {
        return Err(ServerError::InvalidInput(format!(
            "{field} exceeds {max} bytes"
        )));
    }
    Ok(())
}

/// Checks that a field is exactly `len` bytes long.
pub fn exact(field: &'static str, actual: usize, len: usize) -> ServerResult<()> {
    if actual != len {
        return Err(ServerError::InvalidInput(format!(
            "{field} must be {len} bytes"
        )));
    }
    Ok(())
}

/// Checks the identity carried by login requests.
pub fn identity(email: &str) -> ServerResult<()> {
    bounded("email", email.len(), MAX_IDENTITY_LEN)
}

/// Checks every registration field.
pub fn registration(request: &RegisterRequest) -> ServerResult<()> {
    identity(&request.email)?;
    bounded("salt", request.salt.len(), MAX_SALT_LEN)?;
    exact("srpSalt", request.srp_salt.len(), PROTOCOL_SALT_LEN)?;
    bounded("verifier", request.verifier.len(), MAX_VERIFIER_LEN)?;
    bounded("challenge", request.challenge.len(), MAX_CHALLENGE_LEN)?;
    if !is_valid_email(&request.email) {
        return Err(ServerError::InvalidInput("email is malformed".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RegisterRequest {
        RegisterRequest {
            email: "ada@example.com".into(),
            salt: vec![1; 16],
            srp_salt: vec![2; 16],
            verifier: vec![3; 512],
            challenge: vec![4; 64],
        }
    }

    #[test]
    fn accepts_valid_registration() {
        assert!(registration(&request()).is_ok());
    }

    #[test]
    fn rejects_missing_fields() {
        let mut req = request();
        req.challenge.clear();
        assert!(matches!(registration(&req), Err(ServerError::InvalidInput(_))));

        let mut req = request();
        req.email.clear();
        assert!(registration(&req).is_err());
    }

    #[test]
    fn rejects_oversized_fields() {
        let mut req = request();
        req.salt = vec![1; 17];
        assert!(registration(&req).is_err());

        let mut req = request();
        req.verifier = vec![1; 521];
        assert!(registration(&req).is_err());

        let mut req = request();
        req.challenge = vec![1; 65];
        assert!(registration(&req).is_err());

        let mut req = request();
        req.email = format!("{}@example.com", "a".repeat(250));
        assert!(registration(&req).is_err());
    }

    #[test]
    fn protocol_salt_must_be_full_length() {
        let mut req = request();
        req.srp_salt = vec![2; 8];
        assert_eq!(
            registration(&req),
            Err(ServerError::InvalidInput("srpSalt must be 16 bytes".into()))
        );
        req.srp_salt.clear();
        assert!(registration(&req).is_err());
    }

    #[test]
    fn email_syntax() {
        assert!(is_valid_email("first.last+tag@sub.example.org"));
        assert!(!is_valid_email("no-at-sign.example.com"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a@example.c"));
        assert!(!is_valid_email("spaces in@example.com"));
        assert!(!is_valid_email(&format!("{}@example.com", "a".repeat(243))));
    }

    #[test]
    fn bounded_messages() {
        assert_eq!(
            bounded("salt", 0, 16),
            Err(ServerError::InvalidInput("salt is missing".into()))
        );
        assert!(bounded("salt", 16, 16).is_ok());
    }
}
