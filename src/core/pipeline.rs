//! Pipeline orchestrator: issue, inject, run, revoke.
//!
//! Drives the state machine
//! `Idle -> Requesting -> Injected -> Running -> Revoking -> Done | Failed`.
//! A failed issuance or injection moves straight to `Failed` and guarantees
//! the downstream command never starts. Once the command ran, revocation is
//! attempted regardless of its exit code, and a revocation failure never
//! demotes `Done` to `Failed`.

use crate::constants;
use crate::core::broker::CredentialSource;
use crate::core::config::Config;
use crate::core::inject;
use crate::core::lease::LeaseTracker;
use crate::models::run::{PipelineRun, RunError, RunOutcome, RunState};
use crate::util::proc::{self, WaitOutcome};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct Orchestrator<'a, S: CredentialSource> {
    source: &'a S,
    config: &'a Config,
    cancel: Arc<AtomicBool>,
    /// When false, the lease is left to expire instead of being revoked.
    revoke_on_exit: bool,
}

impl<'a, S: CredentialSource> Orchestrator<'a, S> {
    pub fn new(source: &'a S, config: &'a Config, cancel: Arc<AtomicBool>) -> Self {
        Self {
            source,
            config,
            cancel,
            revoke_on_exit: true,
        }
    }

    pub fn revoke_on_exit(mut self, revoke: bool) -> Self {
        self.revoke_on_exit = revoke;
        self
    }

    /// Execute one pipeline run to its terminal state.
    pub fn execute(&self, run: &PipelineRun) -> RunOutcome {
        let mut states = vec![RunState::Idle];
        let mut tracker = LeaseTracker::new();

        transition(&mut states, RunState::Requesting);
        let credential = match self.source.issue(&run.role) {
            Ok(cred) => cred,
            Err(e) => {
                transition(&mut states, RunState::Failed);
                return outcome(states, None, None, Some(RunError::Broker(e)), None);
            }
        };
        let lease_id = credential.lease_id.clone();
        tracker.track(&credential);
        transition(&mut states, RunState::Injected);

        let env = match inject::inject(
            &credential,
            self.config.region.as_deref(),
            &run.environment_overrides,
        ) {
            Ok(env) => env,
            Err(e) => {
                let revocation_error = self.try_revoke(&mut tracker);
                transition(&mut states, RunState::Failed);
                return outcome(
                    states,
                    Some(lease_id),
                    None,
                    Some(RunError::Inject(e)),
                    revocation_error,
                );
            }
        };

        transition(&mut states, RunState::Running);
        let waited = proc::run_with_env(
            &run.target_command,
            &env,
            self.config.command_timeout,
            &self.cancel,
        );
        drop(env);

        match waited {
            Ok(wait_outcome) => {
                transition(&mut states, RunState::Revoking);
                let revocation_error = self.try_revoke(&mut tracker);
                let exit_code = match wait_outcome {
                    WaitOutcome::Exited(code) => code,
                    WaitOutcome::TimedOut => constants::EXIT_TIMEOUT,
                    WaitOutcome::Cancelled => constants::EXIT_CANCELLED,
                };
                transition(&mut states, RunState::Done);
                outcome(states, Some(lease_id), Some(exit_code), None, revocation_error)
            }
            Err(e) => {
                // spawn failed; the lease is live but unused
                let revocation_error = self.try_revoke(&mut tracker);
                transition(&mut states, RunState::Failed);
                outcome(
                    states,
                    Some(lease_id),
                    None,
                    Some(RunError::Spawn(e)),
                    revocation_error,
                )
            }
        }
    }

    fn try_revoke(&self, tracker: &mut LeaseTracker) -> Option<crate::error::BrokerError> {
        if !self.revoke_on_exit {
            debug!("revocation disabled, leaving lease to expire");
            return None;
        }
        match tracker.revoke(self.source) {
            Ok(()) => None,
            Err(e) => {
                warn!(error = %e, "best-effort revocation failed");
                Some(e)
            }
        }
    }
}

fn transition(states: &mut Vec<RunState>, next: RunState) {
    let from = states.last().copied().unwrap_or(RunState::Idle);
    debug!(%from, to = %next, "state transition");
    states.push(next);
}

fn outcome(
    states: Vec<RunState>,
    lease_id: Option<String>,
    exit_code: Option<i32>,
    error: Option<RunError>,
    revocation_error: Option<crate::error::BrokerError>,
) -> RunOutcome {
    let state = states.last().copied().unwrap_or(RunState::Failed);
    RunOutcome {
        state,
        states,
        exit_code,
        lease_id,
        error,
        revocation_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BrokerError;
    use crate::models::credential::Credential;
    use chrono::Utc;
    use secrecy::SecretString;
    use std::cell::RefCell;
    use std::time::Duration;

    struct StubBroker {
        issue_result: fn() -> Result<Credential, BrokerError>,
        fail_revoke: bool,
        issued: RefCell<u32>,
        revoked: RefCell<Vec<String>>,
    }

    impl StubBroker {
        fn succeeding() -> Self {
            Self {
                issue_result: || Ok(test_credential()),
                fail_revoke: false,
                issued: RefCell::new(0),
                revoked: RefCell::new(Vec::new()),
            }
        }

        fn denying() -> Self {
            Self {
                issue_result: || Err(BrokerError::Auth { status: 403 }),
                fail_revoke: false,
                issued: RefCell::new(0),
                revoked: RefCell::new(Vec::new()),
            }
        }
    }

    impl CredentialSource for StubBroker {
        fn issue(&self, _role: &str) -> Result<Credential, BrokerError> {
            *self.issued.borrow_mut() += 1;
            (self.issue_result)()
        }

        fn revoke(&self, lease_id: &str) -> Result<(), BrokerError> {
            self.revoked.borrow_mut().push(lease_id.to_string());
            if self.fail_revoke {
                return Err(BrokerError::Revocation {
                    reason: "backend rejected".to_string(),
                });
            }
            Ok(())
        }
    }

    fn test_credential() -> Credential {
        Credential {
            access_key_id: "AK1".to_string(),
            secret_key: SecretString::from("SK1"),
            session_token: None,
            lease_id: "L1".to_string(),
            lease_duration: 3600,
            issued_at: Utc::now(),
        }
    }

    fn test_config() -> Config {
        Config {
            broker_addr: "http://unused".to_string(),
            broker_token: SecretString::from("tok"),
            region: Some("eu-central-1".to_string()),
            http_timeout: Duration::from_secs(1),
            retry_attempts: 1,
            backoff_base: Duration::from_millis(1),
            command_timeout: Duration::from_secs(10),
            audit_path: None,
        }
    }

    fn cancel_flag() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(false))
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn test_successful_run_ends_done_and_revokes() {
        let broker = StubBroker::succeeding();
        let config = test_config();
        let orchestrator = Orchestrator::new(&broker, &config, cancel_flag());

        let run = PipelineRun::new("terraform-role", sh("exit 0"));
        let outcome = orchestrator.execute(&run);

        assert_eq!(outcome.state, RunState::Done);
        assert_eq!(outcome.exit_code, Some(0));
        assert!(outcome.error.is_none());
        assert!(outcome.revocation_error.is_none());
        assert_eq!(*broker.issued.borrow(), 1);
        assert_eq!(broker.revoked.borrow().as_slice(), ["L1"]);
        assert_eq!(
            outcome.states,
            vec![
                RunState::Idle,
                RunState::Requesting,
                RunState::Injected,
                RunState::Running,
                RunState::Revoking,
                RunState::Done,
            ]
        );
    }

    #[test]
    fn test_downstream_exit_code_propagates() {
        let broker = StubBroker::succeeding();
        let config = test_config();
        let orchestrator = Orchestrator::new(&broker, &config, cancel_flag());

        let run = PipelineRun::new("terraform-role", sh("exit 3"));
        let outcome = orchestrator.execute(&run);

        assert_eq!(outcome.state, RunState::Done);
        assert_eq!(outcome.result_code(), 3);
        // revocation still attempted on a failing command
        assert_eq!(broker.revoked.borrow().len(), 1);
    }

    #[test]
    fn test_denied_issuance_never_runs_downstream() {
        let dir = tempfile::TempDir::new().unwrap();
        let marker = dir.path().join("ran");
        let broker = StubBroker::denying();
        let config = test_config();
        let orchestrator = Orchestrator::new(&broker, &config, cancel_flag());

        let run = PipelineRun::new(
            "terraform-role",
            sh(&format!("touch {}", marker.display())),
        );
        let outcome = orchestrator.execute(&run);

        assert_eq!(outcome.state, RunState::Failed);
        assert_eq!(
            outcome.states,
            vec![RunState::Idle, RunState::Requesting, RunState::Failed]
        );
        assert_eq!(outcome.exit_code, None);
        assert_eq!(outcome.error.as_ref().unwrap().kind(), "auth");
        assert!(!marker.exists());
        assert!(broker.revoked.borrow().is_empty());
    }

    #[test]
    fn test_revocation_failure_keeps_done_status() {
        let mut broker = StubBroker::succeeding();
        broker.fail_revoke = true;
        let config = test_config();
        let orchestrator = Orchestrator::new(&broker, &config, cancel_flag());

        let run = PipelineRun::new("terraform-role", sh("exit 0"));
        let outcome = orchestrator.execute(&run);

        assert_eq!(outcome.state, RunState::Done);
        assert_eq!(outcome.exit_code, Some(0));
        assert!(matches!(
            outcome.revocation_error,
            Some(BrokerError::Revocation { .. })
        ));
    }

    #[test]
    fn test_injection_failure_revokes_and_fails() {
        let broker = StubBroker::succeeding();
        let config = test_config();
        let orchestrator = Orchestrator::new(&broker, &config, cancel_flag());

        let mut run = PipelineRun::new("terraform-role", sh("exit 0"));
        run.environment_overrides =
            vec![("AWS_ACCESS_KEY_ID".to_string(), "evil".to_string())];
        let outcome = orchestrator.execute(&run);

        assert_eq!(outcome.state, RunState::Failed);
        assert_eq!(outcome.error.as_ref().unwrap().kind(), "config");
        assert_eq!(broker.revoked.borrow().as_slice(), ["L1"]);
        assert!(!outcome.states.contains(&RunState::Running));
    }

    #[test]
    fn test_spawn_failure_fails_but_revokes() {
        let broker = StubBroker::succeeding();
        let config = test_config();
        let orchestrator = Orchestrator::new(&broker, &config, cancel_flag());

        let run = PipelineRun::new(
            "terraform-role",
            vec!["definitely-not-a-binary-xyz".to_string()],
        );
        let outcome = orchestrator.execute(&run);

        assert_eq!(outcome.state, RunState::Failed);
        assert_eq!(outcome.error.as_ref().unwrap().kind(), "spawn");
        assert_eq!(broker.revoked.borrow().len(), 1);
    }

    #[test]
    fn test_no_revoke_leaves_lease_alone() {
        let broker = StubBroker::succeeding();
        let config = test_config();
        let orchestrator =
            Orchestrator::new(&broker, &config, cancel_flag()).revoke_on_exit(false);

        let run = PipelineRun::new("terraform-role", sh("exit 0"));
        let outcome = orchestrator.execute(&run);

        assert_eq!(outcome.state, RunState::Done);
        assert!(broker.revoked.borrow().is_empty());
    }

    #[test]
    fn test_timeout_kills_command_and_still_revokes() {
        let broker = StubBroker::succeeding();
        let mut config = test_config();
        config.command_timeout = Duration::from_millis(300);
        let orchestrator = Orchestrator::new(&broker, &config, cancel_flag());

        let run = PipelineRun::new("terraform-role", sh("sleep 30"));
        let outcome = orchestrator.execute(&run);

        assert_eq!(outcome.state, RunState::Done);
        assert_eq!(outcome.exit_code, Some(constants::EXIT_TIMEOUT));
        assert_eq!(broker.revoked.borrow().len(), 1);
    }

    #[test]
    fn test_cancellation_revokes_before_exit() {
        let broker = StubBroker::succeeding();
        let config = test_config();
        let cancel = Arc::new(AtomicBool::new(true));
        let orchestrator = Orchestrator::new(&broker, &config, cancel);

        let run = PipelineRun::new("terraform-role", sh("sleep 30"));
        let outcome = orchestrator.execute(&run);

        assert_eq!(outcome.exit_code, Some(constants::EXIT_CANCELLED));
        assert_eq!(broker.revoked.borrow().len(), 1);
    }
}
