//! The full pipeline: issue, inject, run the downstream command, revoke.

use crate::cli::{self, RunContext};
use crate::core::audit::AuditEvent;
use crate::core::broker::BrokerClient;
use crate::core::pipeline::Orchestrator;
use crate::models::run::PipelineRun;
use anyhow::{anyhow, Context, Result};
use clap::Args;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Broker role to issue a credential for
    #[arg(long, value_parser = cli::parse_role_name)]
    pub role: String,

    /// Downstream command timeout in seconds (overrides config)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Extra environment for the downstream command (KEY=VALUE, repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Leave the lease to expire instead of revoking it
    #[arg(long)]
    pub no_revoke: bool,

    /// Downstream command and its arguments (after `--`)
    #[arg(last = true, required = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

fn parse_env_pair(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("'{}' is not KEY=VALUE", s))?;
    if key.is_empty() {
        return Err("environment key cannot be empty".into());
    }
    Ok((key.to_string(), value.to_string()))
}

pub fn run(ctx: RunContext, args: RunArgs) -> Result<i32> {
    let mut parts = ctx.parts;
    if args.timeout.is_some() {
        parts.command_timeout_secs = args.timeout;
    }
    let config = parts.finish()?;

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("install termination signal handler")?;

    let broker = BrokerClient::new(config.clone()).map_err(|e| anyhow!(e))?;
    let orchestrator =
        Orchestrator::new(&broker, &config, cancel).revoke_on_exit(!args.no_revoke);

    let mut pipeline_run = PipelineRun::new(args.role.clone(), args.command);
    pipeline_run.environment_overrides = args.env;

    let outcome = orchestrator.execute(&pipeline_run);

    cli::audit_best_effort(
        config.audit_path.as_deref(),
        AuditEvent {
            action: "run",
            role: Some(&args.role),
            lease_id: outcome.lease_id.as_deref(),
            outcome: outcome.state.as_str(),
            error_kind: outcome.error.as_ref().map(|e| e.kind()),
            exit_code: outcome.exit_code,
        },
    );

    if let Some(revocation_error) = &outcome.revocation_error {
        eprintln!("warning: {}", revocation_error);
    }
    if let Some(error) = &outcome.error {
        return Err(anyhow!("{}", error));
    }
    Ok(outcome.result_code())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_pair() {
        assert_eq!(
            parse_env_pair("TF_VAR_x=1").unwrap(),
            ("TF_VAR_x".to_string(), "1".to_string())
        );
        assert_eq!(
            parse_env_pair("A=b=c").unwrap(),
            ("A".to_string(), "b=c".to_string())
        );
        assert!(parse_env_pair("NOEQUALS").is_err());
        assert!(parse_env_pair("=value").is_err());
    }
}
