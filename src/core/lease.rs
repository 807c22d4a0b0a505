//! In-memory lease tracking for issued credentials.
//!
//! A run owns at most one live lease. Revocation through the tracker is
//! best-effort by contract: the caller reports failures but never escalates
//! them into a failed run.

use crate::core::broker::CredentialSource;
use crate::error::BrokerError;
use crate::models::credential::Credential;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct TrackedLease {
    lease_id: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct LeaseTracker {
    lease: Option<TrackedLease>,
}

impl LeaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the lease of a freshly issued credential.
    pub fn track(&mut self, credential: &Credential) {
        if let Some(prev) = &self.lease {
            // one live credential per run; a leftover lease means the
            // previous one was neither revoked nor allowed to lapse
            warn!(lease_id = %prev.lease_id, "replacing an unrevoked tracked lease");
        }
        debug!(lease_id = %credential.lease_id, "tracking lease");
        self.lease = Some(TrackedLease {
            lease_id: credential.lease_id.clone(),
            expires_at: credential.expires_at(),
        });
    }

    pub fn lease_id(&self) -> Option<&str> {
        self.lease.as_ref().map(|l| l.lease_id.as_str())
    }

    pub fn has_live_lease(&self) -> bool {
        self.lease.is_some()
    }

    /// Revoke the tracked lease, clearing it regardless of outcome.
    ///
    /// A lease that already lapsed locally is reported as a revocation
    /// failure without a backend round-trip.
    pub fn revoke(&mut self, source: &dyn CredentialSource) -> Result<(), BrokerError> {
        let lease = match self.lease.take() {
            Some(lease) => lease,
            None => return Ok(()),
        };
        if Utc::now() >= lease.expires_at {
            return Err(BrokerError::Revocation {
                reason: "lease already expired".to_string(),
            });
        }
        source.revoke(&lease.lease_id)
    }
}
