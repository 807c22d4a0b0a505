//! Diagnostics for broker configuration and reachability.
//!
//! Read-only and safe to run in CI setup steps; never issues a credential.

use crate::cli::RunContext;
use crate::constants;
use anyhow::Result;
use clap::Args;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Skip the broker reachability probe (offline check only)
    #[arg(long)]
    pub offline: bool,
}

pub fn run(ctx: RunContext, args: DoctorArgs) -> Result<i32> {
    let parts = &ctx.parts;
    let mut ok = 0u32;
    let mut warn = 0u32;
    let mut fail = 0u32;

    println!("Doctor: leaserun configuration");

    match &parts.file_path {
        Some(path) => println!("  [INFO] config file: {}", path.display()),
        None => println!("  [INFO] no config file (flags/env only)"),
    }

    match &parts.broker_addr {
        Some(addr) => {
            println!("  [PASS] broker address configured: {}", addr);
            ok += 1;
        }
        None => {
            println!(
                "  [FAIL] broker address missing (set --broker-addr or {})",
                constants::ENV_BROKER_ADDR
            );
            fail += 1;
        }
    }

    if parts.broker_token.is_some() {
        println!("  [PASS] broker token configured");
        ok += 1;
    } else {
        println!(
            "  [FAIL] broker token missing (set --broker-token or {})",
            constants::ENV_BROKER_TOKEN
        );
        fail += 1;
    }

    match &parts.region {
        Some(region) => {
            println!("  [PASS] region: {}", region);
            ok += 1;
        }
        None => {
            println!(
                "  [WARN] no region configured; downstream tools must supply their own"
            );
            warn += 1;
        }
    }

    match &parts.audit_path {
        Some(path) => {
            println!("  [INFO] audit trail: {}", path.display());
            let writable = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| p.exists())
                .unwrap_or(true);
            if writable {
                ok += 1;
            } else {
                println!("  [WARN] audit trail directory does not exist");
                warn += 1;
            }
        }
        None => println!("  [INFO] auditing disabled (no audit_path configured)"),
    }

    if !args.offline {
        if let Some(addr) = &parts.broker_addr {
            match probe(addr) {
                Ok(status) => {
                    // any HTTP response proves the broker answers; auth comes later
                    println!("  [PASS] broker reachable (HTTP {})", status);
                    ok += 1;
                }
                Err(reason) => {
                    println!("  [FAIL] broker unreachable: {}", reason);
                    fail += 1;
                }
            }
        }
    }

    println!();
    println!("Doctor summary: {} pass, {} warn, {} fail", ok, warn, fail);
    Ok(if fail > 0 { 1 } else { 0 })
}

fn probe(addr: &str) -> Result<u16, String> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| e.to_string())?;
    client
        .get(addr.trim_end_matches('/'))
        .send()
        .map(|r| r.status().as_u16())
        .map_err(|_| "connection failed or timed out".to_string())
}
