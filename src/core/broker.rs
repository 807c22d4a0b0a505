//! HTTP client for the credential-issuing backend.
//!
//! Issues fresh credentials for a named role over `GET /issue/{role}` with a
//! bearer token, mapping the HTTP status class onto the error taxonomy.
//! 5xx and transport failures are retried with bounded exponential backoff;
//! 4xx responses are never retried. No caching: every call hits the backend.

use crate::core::config::Config;
use crate::error::BrokerError;
use crate::models::credential::Credential;
use chrono::Utc;
use rand::Rng;
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Seam between the orchestrator and the backend, so pipeline logic can be
/// exercised against a stub without a live broker.
pub trait CredentialSource {
    fn issue(&self, role: &str) -> Result<Credential, BrokerError>;
    fn revoke(&self, lease_id: &str) -> Result<(), BrokerError>;
}

pub struct BrokerClient {
    config: Config,
    client: Client,
}

/// Wire format of a successful issue response.
#[derive(Deserialize)]
struct IssueResponse {
    access_key: String,
    secret_key: SecretString,
    lease_id: String,
    lease_duration: u64,
    #[serde(default)]
    session_token: Option<SecretString>,
}

impl BrokerClient {
    pub fn new(config: Config) -> Result<Self, BrokerError> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| BrokerError::Config {
                reason: format!("build HTTP client: {}", e),
            })?;
        Ok(Self { config, client })
    }

    fn issue_once(&self, role: &str) -> Result<Credential, BrokerError> {
        let url = format!("{}/issue/{}", self.config.broker_addr, role);
        let response = self
            .client
            .get(url)
            .bearer_auth(self.config.broker_token.expose_secret())
            .send()
            .map_err(|e| BrokerError::BackendUnavailable {
                reason: transport_reason(&e),
            })?;
        match classify(response.status()) {
            StatusClass::Ok => parse_issue_body(role, response),
            StatusClass::NotFound => Err(BrokerError::RoleNotFound {
                role: role.to_string(),
            }),
            StatusClass::ClientError(status) => Err(BrokerError::Auth { status }),
            StatusClass::ServerError(status) => Err(BrokerError::BackendUnavailable {
                reason: format!("HTTP {}", status),
            }),
        }
    }

    /// Delay before retry attempt `attempt` (1-based): exponential with jitter.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.backoff_base;
        let exp = base.saturating_mul(1u32 << (attempt - 1).min(16));
        let jitter_ms = if base.as_millis() > 1 {
            rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 2)
        } else {
            0
        };
        exp + Duration::from_millis(jitter_ms)
    }
}

impl CredentialSource for BrokerClient {
    fn issue(&self, role: &str) -> Result<Credential, BrokerError> {
        let attempts = self.config.retry_attempts;
        let mut last_err = None;
        for attempt in 1..=attempts {
            match self.issue_once(role) {
                Ok(cred) => {
                    debug!(role, attempt, "credential issued");
                    return Ok(cred);
                }
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        role,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "broker unavailable, retrying"
                    );
                    thread::sleep(delay);
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        // unreachable with attempts >= 1, but keep the loop honest
        Err(last_err.unwrap_or(BrokerError::BackendUnavailable {
            reason: "no attempts made".to_string(),
        }))
    }

    fn revoke(&self, lease_id: &str) -> Result<(), BrokerError> {
        // Lease ids may contain '/', so the id travels in the body.
        let url = format!("{}/revoke", self.config.broker_addr);
        let response = self
            .client
            .post(url)
            .bearer_auth(self.config.broker_token.expose_secret())
            .json(&serde_json::json!({ "lease_id": lease_id }))
            .send()
            .map_err(|e| BrokerError::Revocation {
                reason: transport_reason(&e),
            })?;
        let status = response.status();
        if status.is_success() {
            debug!(lease_id, "lease revoked");
            return Ok(());
        }
        Err(BrokerError::Revocation {
            reason: format!("HTTP {}", status.as_u16()),
        })
    }
}

enum StatusClass {
    Ok,
    NotFound,
    ClientError(u16),
    ServerError(u16),
}

fn classify(status: StatusCode) -> StatusClass {
    if status.is_success() {
        StatusClass::Ok
    } else if status == StatusCode::NOT_FOUND {
        StatusClass::NotFound
    } else if status.is_client_error() {
        StatusClass::ClientError(status.as_u16())
    } else {
        StatusClass::ServerError(status.as_u16())
    }
}

/// Reqwest error text can embed the request URL but never credential
/// material; keep only a coarse description to stay on the safe side.
fn transport_reason(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        "connection failed".to_string()
    } else {
        "transport error".to_string()
    }
}

fn parse_issue_body(role: &str, response: Response) -> Result<Credential, BrokerError> {
    let body: IssueResponse =
        response.json().map_err(|_| BrokerError::MalformedResponse {
            reason: "issue response is not valid JSON for the issue contract".to_string(),
        })?;
    if body.access_key.is_empty() || body.lease_id.is_empty() {
        return Err(BrokerError::MalformedResponse {
            reason: "issue response missing access_key or lease_id".to_string(),
        });
    }
    if body.lease_duration == 0 {
        return Err(BrokerError::MalformedResponse {
            reason: "issue response carries zero lease_duration".to_string(),
        });
    }
    debug!(role, lease_duration = body.lease_duration, "issue response accepted");
    Ok(Credential {
        access_key_id: body.access_key,
        secret_key: body.secret_key,
        session_token: body.session_token,
        lease_id: body.lease_id,
        lease_duration: body.lease_duration,
        issued_at: Utc::now(),
    })
}
