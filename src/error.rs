//! Error taxonomy for broker and lease operations.
//!
//! Fatal kinds (`Auth`, `RoleNotFound`, exhausted `BackendUnavailable`) abort
//! the run before any downstream command executes. `Revocation` is reported
//! but never fatal. Error messages carry status and role/lease metadata only;
//! credential values must never appear here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    /// Bearer token rejected or insufficient (401/403 and other 4xx).
    #[error("broker rejected request (HTTP {status}): authentication or authorization failed")]
    Auth { status: u16 },

    /// The named role does not exist on the backend (404).
    #[error("role '{role}' not found on broker")]
    RoleNotFound { role: String },

    /// Network failure or 5xx; retryable up to the configured attempt limit.
    #[error("broker unavailable: {reason}")]
    BackendUnavailable { reason: String },

    /// Backend rejected the revocation, or the lease already expired.
    #[error("lease revocation failed: {reason}")]
    Revocation { reason: String },

    /// Broker returned a 2xx body that does not match the issue contract.
    #[error("malformed broker response: {reason}")]
    MalformedResponse { reason: String },

    /// Missing or invalid client configuration.
    #[error("configuration error: {reason}")]
    Config { reason: String },
}

impl BrokerError {
    /// Whether the error warrants another issuance attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BrokerError::BackendUnavailable { .. })
    }

    /// Stable kind label used in logs and audit entries.
    pub fn kind(&self) -> &'static str {
        match self {
            BrokerError::Auth { .. } => "auth",
            BrokerError::RoleNotFound { .. } => "role-not-found",
            BrokerError::BackendUnavailable { .. } => "backend-unavailable",
            BrokerError::Revocation { .. } => "revocation",
            BrokerError::MalformedResponse { .. } => "malformed-response",
            BrokerError::Config { .. } => "config",
        }
    }
}
