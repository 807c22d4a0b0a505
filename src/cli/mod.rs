//! CLI routing and command dispatch.

use crate::constants;
use crate::core::audit::AuditEvent;
use crate::core::config::{ConfigFile, ConfigParts};
use anyhow::Result;
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use std::path::{Path, PathBuf};

pub mod audit;
pub mod doctor;
pub mod issue;
pub mod revoke;
pub mod run;

/// Shared context passed to all command handlers.
pub struct RunContext {
    pub parts: ConfigParts,
    pub non_interactive: bool,
}

/// Append an event to the audit trail when auditing is configured.
/// Best-effort: a failing audit write warns but never fails the command.
pub fn audit_best_effort(audit_path: Option<&Path>, event: AuditEvent<'_>) {
    let Some(path) = audit_path else { return };
    if let Err(e) = crate::core::audit::record(path, event) {
        eprintln!("warning: audit trail write failed: {:#}", e);
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "leaserun",
    version,
    about = "Run commands under ephemeral broker-issued cloud credentials"
)]
pub struct Cli {
    /// Broker base URL
    #[arg(long, global = true, env = constants::ENV_BROKER_ADDR, value_name = "URL")]
    pub broker_addr: Option<String>,

    /// Bearer token for the broker
    #[arg(long, global = true, env = constants::ENV_BROKER_TOKEN, value_name = "TOKEN", hide_env_values = true)]
    pub broker_token: Option<String>,

    /// Region injected into the downstream environment
    #[arg(long, global = true, env = constants::ENV_AWS_REGION, value_name = "REGION")]
    pub region: Option<String>,

    /// Config file path (default: ./leaserun.toml if present)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Run in non-interactive mode (no prompts, suitable for CI)
    #[arg(long, global = true, env = "LEASERUN_NON_INTERACTIVE")]
    pub non_interactive: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch the parsed command, returning the process exit code.
    pub fn run(self) -> Result<i32> {
        let mut parts = ConfigParts {
            broker_addr: self.broker_addr,
            broker_token: self.broker_token.map(SecretString::from),
            region: self.region,
            ..Default::default()
        };

        if let Some(path) = ConfigParts::config_file_path(self.config) {
            let file = ConfigFile::load(&path)?;
            parts.merge_file(file);
            parts.file_path = Some(path);
        }

        let ctx = RunContext {
            parts,
            non_interactive: self.non_interactive,
        };

        match self.command {
            Commands::Run(args) => run::run(ctx, args),
            Commands::Issue(args) => issue::run(ctx, args),
            Commands::Revoke(args) => revoke::run(ctx, args),
            Commands::Doctor(args) => doctor::run(ctx, args),
            Commands::Audit { command } => audit::run(ctx, command),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Issue a credential, run a command under it, then revoke the lease
    Run(run::RunArgs),
    /// Issue a credential and print it for manual use
    Issue(issue::IssueArgs),
    /// Revoke a lease by id
    Revoke(revoke::RevokeArgs),
    /// Diagnose configuration and broker reachability (safe, read-only)
    Doctor(doctor::DoctorArgs),
    /// Inspect the local audit trail
    Audit {
        #[command(subcommand)]
        command: audit::AuditCommand,
    },
}

/// Role names are backend-side identifiers; keep them path-safe.
pub fn parse_role_name(s: &str) -> Result<String, String> {
    if s.is_empty() {
        return Err("role cannot be empty".into());
    }
    if s.contains("..") {
        return Err("path traversal not allowed".into());
    }
    if !s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
    {
        return Err("only [a-zA-Z0-9._-] allowed".into());
    }
    Ok(s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_role_name_accepts_simple_names() {
        assert_eq!(
            parse_role_name("terraform-role").unwrap(),
            "terraform-role"
        );
        assert_eq!(parse_role_name("ci_plan.v2").unwrap(), "ci_plan.v2");
    }

    #[test]
    fn test_parse_role_name_rejects_traversal_and_slashes() {
        assert!(parse_role_name("").is_err());
        assert!(parse_role_name("../etc").is_err());
        assert!(parse_role_name("a/b").is_err());
        assert!(parse_role_name("role name").is_err());
    }
}
