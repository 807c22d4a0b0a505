//! Pipeline run description and orchestrator states.

use crate::error::BrokerError;

/// One orchestrator invocation: a role, a downstream command, and any extra
/// environment entries layered on top of the injected credential variables.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub role: String,
    pub target_command: Vec<String>,
    pub environment_overrides: Vec<(String, String)>,
}

impl PipelineRun {
    pub fn new(role: impl Into<String>, target_command: Vec<String>) -> Self {
        Self {
            role: role.into(),
            target_command,
            environment_overrides: Vec::new(),
        }
    }
}

/// Orchestrator state machine.
///
/// `Idle -> Requesting -> Injected -> Running -> Revoking -> Done | Failed`.
/// Any state may transition to `Failed` on an unrecoverable error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Requesting,
    Injected,
    Running,
    Revoking,
    Done,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Requesting => "requesting",
            RunState::Injected => "injected",
            RunState::Running => "running",
            RunState::Revoking => "revoking",
            RunState::Done => "done",
            RunState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal error that prevented the downstream command from completing.
#[derive(Debug)]
pub enum RunError {
    /// Issuance failed; no downstream command was executed.
    Broker(BrokerError),
    /// Environment injection failed after issuance.
    Inject(BrokerError),
    /// The downstream command could not be spawned.
    Spawn(std::io::Error),
}

impl RunError {
    /// Stable kind label for logs and audit entries.
    pub fn kind(&self) -> &'static str {
        match self {
            RunError::Broker(e) | RunError::Inject(e) => e.kind(),
            RunError::Spawn(_) => "spawn",
        }
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::Broker(e) => write!(f, "credential issuance failed: {}", e),
            RunError::Inject(e) => write!(f, "environment injection failed: {}", e),
            RunError::Spawn(e) => write!(f, "failed to start downstream command: {}", e),
        }
    }
}

impl std::error::Error for RunError {}

/// Terminal result of a pipeline run.
#[derive(Debug)]
pub struct RunOutcome {
    pub state: RunState,
    /// Every state visited, `Idle` first, terminal state last.
    pub states: Vec<RunState>,
    /// Exit code of the downstream command, once `Running` was reached.
    pub exit_code: Option<i32>,
    /// Lease id of the issued credential, for reporting and audit
    /// fingerprinting. In memory only; never persisted as-is.
    pub lease_id: Option<String>,
    /// Fatal error when the run never completed the downstream command.
    pub error: Option<RunError>,
    /// Non-fatal revocation failure, reported but not affecting `state`.
    pub revocation_error: Option<BrokerError>,
}

impl RunOutcome {
    /// Process exit code for the orchestrator itself.
    pub fn result_code(&self) -> i32 {
        match self.exit_code {
            Some(code) => code,
            None => crate::constants::EXIT_FATAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_code_propagates_downstream_exit() {
        let outcome = RunOutcome {
            state: RunState::Done,
            states: vec![RunState::Idle, RunState::Done],
            exit_code: Some(2),
            lease_id: Some("L1".to_string()),
            error: None,
            revocation_error: None,
        };
        assert_eq!(outcome.result_code(), 2);
    }

    #[test]
    fn test_result_code_fatal_when_never_ran() {
        let outcome = RunOutcome {
            state: RunState::Failed,
            states: vec![RunState::Idle, RunState::Requesting, RunState::Failed],
            exit_code: None,
            lease_id: None,
            error: Some(RunError::Broker(BrokerError::Auth { status: 403 })),
            revocation_error: None,
        };
        assert_eq!(outcome.result_code(), crate::constants::EXIT_FATAL);
    }

    #[test]
    fn test_run_error_kind_labels() {
        let broker = RunError::Broker(BrokerError::Auth { status: 403 });
        assert_eq!(broker.kind(), "auth");
        let spawn = RunError::Spawn(std::io::Error::other("enoent"));
        assert_eq!(spawn.kind(), "spawn");
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(RunState::Requesting.as_str(), "requesting");
        assert_eq!(RunState::Done.to_string(), "done");
    }
}
