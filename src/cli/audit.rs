//! Audit trail inspection.

use crate::cli::RunContext;
use crate::core::audit;
use anyhow::{bail, Result};
use chrono::{DateTime, Local};
use clap::{Args, Subcommand};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Table};

#[derive(Subcommand, Debug)]
pub enum AuditCommand {
    /// Display the audit trail
    Show(AuditShowArgs),
    /// Verify audit chain integrity
    Verify(AuditVerifyArgs),
}

#[derive(Args, Debug)]
pub struct AuditShowArgs {
    /// Maximum number of entries to display (most recent last)
    #[arg(long, default_value_t = 50)]
    pub limit: usize,
}

#[derive(Args, Debug)]
pub struct AuditVerifyArgs {}

pub fn run(ctx: RunContext, cmd: AuditCommand) -> Result<i32> {
    let Some(path) = ctx.parts.audit_path.clone() else {
        bail!("auditing is not configured (set audit_path in leaserun.toml)");
    };
    match cmd {
        AuditCommand::Show(args) => {
            show(&path, args)?;
            Ok(0)
        }
        AuditCommand::Verify(_) => verify(&path),
    }
}

fn show(path: &std::path::Path, args: AuditShowArgs) -> Result<()> {
    let entries = audit::read_entries(path)?;
    if entries.is_empty() {
        println!("No audit entries found.");
        return Ok(());
    }
    let start = entries.len().saturating_sub(args.limit);
    let entries = &entries[start..];

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        Cell::new("Timestamp").add_attribute(Attribute::Bold),
        Cell::new("Action").add_attribute(Attribute::Bold),
        Cell::new("Role").add_attribute(Attribute::Bold),
        Cell::new("Lease").add_attribute(Attribute::Bold),
        Cell::new("Actor").add_attribute(Attribute::Bold),
        Cell::new("Outcome").add_attribute(Attribute::Bold),
    ]);

    for entry in entries {
        let local: DateTime<Local> = entry.timestamp.into();
        let outcome = match &entry.error_kind {
            Some(kind) => format!("{} ({})", entry.outcome, kind),
            None => match entry.exit_code {
                Some(code) => format!("{} (exit {})", entry.outcome, code),
                None => entry.outcome.clone(),
            },
        };
        table.add_row(vec![
            local.format("%Y-%m-%d %H:%M:%S").to_string(),
            entry.action.clone(),
            entry.role.clone().unwrap_or_else(|| "-".to_string()),
            entry
                .lease_fingerprint
                .clone()
                .unwrap_or_else(|| "-".to_string()),
            entry.actor.clone(),
            outcome,
        ]);
    }

    println!("{}", table);
    println!("\n{} entries shown.", entries.len());
    Ok(())
}

fn verify(path: &std::path::Path) -> Result<i32> {
    let report = audit::verify_chain(path)?;
    if report.entries == 0 {
        println!("No audit entries to verify.");
        return Ok(0);
    }
    match report.broken_at {
        None => {
            println!("Audit chain: {} entries verified, 0 errors", report.entries);
            Ok(0)
        }
        Some(line) => {
            println!(
                "Audit chain: {} entries, broken at line {}",
                report.entries, line
            );
            Ok(1)
        }
    }
}
