//! Ephemeral credential issued by the broker.
//!
//! Held in memory only. Never serialized, never written to disk; `Debug`
//! redacts key material so accidental logging cannot leak it.

use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;

pub struct Credential {
    pub access_key_id: String,
    pub secret_key: SecretString,
    /// STS-style backends return a session token alongside the key pair.
    pub session_token: Option<SecretString>,
    pub lease_id: String,
    /// Remaining lease lifetime at issuance, in seconds. Always > 0.
    pub lease_duration: u64,
    pub issued_at: DateTime<Utc>,
}

impl Credential {
    /// Moment the lease lapses if neither renewed nor revoked.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.issued_at + Duration::seconds(self.lease_duration as i64)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_key_id", &self.access_key_id)
            .field("secret_key", &"[REDACTED]")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("lease_id", &self.lease_id)
            .field("lease_duration", &self.lease_duration)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Credential {
        Credential {
            access_key_id: "AK1".to_string(),
            secret_key: SecretString::from("SK1"),
            session_token: None,
            lease_id: "aws/creds/terraform-role/L1".to_string(),
            lease_duration: 3600,
            issued_at: Utc::now(),
        }
    }

    #[test]
    fn test_expires_at_adds_lease_duration() {
        let cred = sample();
        assert_eq!(
            cred.expires_at() - cred.issued_at,
            Duration::seconds(3600)
        );
    }

    #[test]
    fn test_is_expired_at() {
        let cred = sample();
        assert!(!cred.is_expired_at(cred.issued_at + Duration::seconds(10)));
        assert!(cred.is_expired_at(cred.issued_at + Duration::seconds(3600)));
    }

    #[test]
    fn test_debug_redacts_secret_material() {
        let mut cred = sample();
        cred.session_token = Some(SecretString::from("ST1"));
        let rendered = format!("{:?}", cred);
        assert!(rendered.contains("AK1"));
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("SK1"));
        assert!(!rendered.contains("ST1"));
    }
}
