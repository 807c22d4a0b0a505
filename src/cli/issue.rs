//! Issue a credential and print it for manual use (e.g. `eval` in a shell
//! step that cannot wrap its command in `leaserun run`).

use crate::cli::{self, RunContext};
use crate::core::audit::AuditEvent;
use crate::core::broker::{BrokerClient, CredentialSource};
use anyhow::{anyhow, bail, Result};
use clap::{Args, ValueEnum};
use secrecy::ExposeSecret;
use zeroize::Zeroizing;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum IssueFormat {
    /// `export KEY='VALUE'` lines for shell eval
    Export,
    /// JSON object; the secret key is masked unless --stdout is given
    Json,
}

#[derive(Args, Debug)]
pub struct IssueArgs {
    /// Broker role to issue a credential for
    #[arg(long, value_parser = cli::parse_role_name)]
    pub role: String,

    /// Output format
    #[arg(long, value_enum, default_value_t = IssueFormat::Export)]
    pub format: IssueFormat,

    /// Allow printing secret material to stdout (dangerous)
    #[arg(long)]
    pub stdout: bool,
}

pub fn run(ctx: RunContext, args: IssueArgs) -> Result<i32> {
    let config = ctx.parts.finish()?;
    if args.format == IssueFormat::Export && !args.stdout {
        bail!(
            "refusing to print secret material without --stdout; \
             use 'leaserun run' to avoid exposing the credential entirely"
        );
    }

    let broker = BrokerClient::new(config.clone()).map_err(|e| anyhow!(e))?;
    let issued = broker.issue(&args.role);

    cli::audit_best_effort(
        config.audit_path.as_deref(),
        AuditEvent {
            action: "issue",
            role: Some(&args.role),
            lease_id: issued.as_ref().ok().map(|c| c.lease_id.as_str()),
            outcome: if issued.is_ok() { "done" } else { "failed" },
            error_kind: issued.as_ref().err().map(|e| e.kind()),
            exit_code: None,
        },
    );
    let credential = issued.map_err(|e| anyhow!(e))?;

    match args.format {
        IssueFormat::Export => {
            eprintln!(
                "warning: secret material on stdout; lease '{}' expires at {}",
                credential.lease_id,
                credential.expires_at().to_rfc3339()
            );
            let mut out = Zeroizing::new(String::new());
            out.push_str(&format!(
                "export AWS_ACCESS_KEY_ID='{}'\n",
                credential.access_key_id
            ));
            out.push_str(&format!(
                "export AWS_SECRET_ACCESS_KEY='{}'\n",
                credential.secret_key.expose_secret()
            ));
            if let Some(token) = &credential.session_token {
                out.push_str(&format!(
                    "export AWS_SESSION_TOKEN='{}'\n",
                    token.expose_secret()
                ));
            }
            if let Some(region) = &config.region {
                out.push_str(&format!("export AWS_DEFAULT_REGION='{}'\n", region));
            }
            print!("{}", out.as_str());
        }
        IssueFormat::Json => {
            let secret = if args.stdout {
                Zeroizing::new(credential.secret_key.expose_secret().to_string())
            } else {
                Zeroizing::new("********".to_string())
            };
            let body = serde_json::json!({
                "access_key_id": credential.access_key_id,
                "secret_key": secret.as_str(),
                "lease_id": credential.lease_id,
                "lease_duration": credential.lease_duration,
                "issued_at": credential.issued_at.to_rfc3339(),
                "expires_at": credential.expires_at().to_rfc3339(),
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }
    Ok(0)
}
