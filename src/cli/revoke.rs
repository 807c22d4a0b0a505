//! Explicit lease revocation.

use crate::cli::{self, RunContext};
use crate::core::audit::AuditEvent;
use crate::core::broker::{BrokerClient, CredentialSource};
use anyhow::{anyhow, bail, Result};
use clap::Args;
use dialoguer::Confirm;

#[derive(Args, Debug)]
pub struct RevokeArgs {
    /// Lease id as returned by `leaserun issue`
    pub lease_id: String,

    /// Skip the confirmation prompt
    #[arg(long)]
    pub yes: bool,
}

pub fn run(ctx: RunContext, args: RevokeArgs) -> Result<i32> {
    let config = ctx.parts.finish()?;

    if !args.yes {
        if ctx.non_interactive {
            bail!("refusing to revoke without --yes in non-interactive mode");
        }
        let confirmed = Confirm::new()
            .with_prompt(format!("Revoke lease '{}'?", args.lease_id))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("aborted");
            return Ok(0);
        }
    }

    let broker = BrokerClient::new(config.clone()).map_err(|e| anyhow!(e))?;
    let result = broker.revoke(&args.lease_id);

    cli::audit_best_effort(
        config.audit_path.as_deref(),
        AuditEvent {
            action: "revoke",
            role: None,
            lease_id: Some(&args.lease_id),
            outcome: if result.is_ok() { "done" } else { "failed" },
            error_kind: result.as_ref().err().map(|e| e.kind()),
            exit_code: None,
        },
    );

    result.map_err(|e| anyhow!(e))?;
    println!("lease revoked");
    Ok(0)
}
