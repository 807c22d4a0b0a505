//! Ephemeral-credential pipeline runner for CI.
//!
//! Requests a short-lived cloud credential from a broker for a named role,
//! injects it into the environment of one downstream command (typically
//! `terraform plan`), awaits the command with a mandatory timeout, then
//! best-effort revokes the lease. Credentials live in memory only.
//!
//! ## Modules
//! - `cli` — Command-line handlers
//! - `core` — Broker client, injector, orchestrator, lease tracking, audit
//! - `models` — Data structures
//! - `util` — Process execution

pub mod cli;
pub mod constants;
pub mod core;
pub mod error;
pub mod models;
pub mod util;
