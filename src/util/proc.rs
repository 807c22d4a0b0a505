//! Downstream process execution with environment overlay, mandatory timeout,
//! and cooperative cancellation.

use crate::constants;
use crate::core::inject::InjectedEnv;
use std::io;
use std::process::{Child, Command};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How the awaited child ended.
#[derive(Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    Exited(i32),
    /// Killed after exceeding the configured timeout.
    TimedOut,
    /// Killed after the cancellation flag was raised (termination signal).
    Cancelled,
}

/// Spawn `command` with the injected environment layered over the inherited
/// one, then await it, polling for timeout and cancellation.
pub fn run_with_env(
    command: &[String],
    env: &InjectedEnv,
    timeout: Duration,
    cancel: &AtomicBool,
) -> io::Result<WaitOutcome> {
    let (program, args) = command.split_first().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "empty downstream command")
    })?;

    let mut child = Command::new(program)
        .args(args)
        .envs(env.iter())
        .spawn()?;
    debug!(program = %program, pid = child.id(), "downstream command started");

    wait_with_deadline(&mut child, timeout, cancel)
}

fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
    cancel: &AtomicBool,
) -> io::Result<WaitOutcome> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            let code = status.code().unwrap_or(constants::EXIT_FATAL);
            return Ok(WaitOutcome::Exited(code));
        }
        if cancel.load(Ordering::SeqCst) {
            warn!(pid = child.id(), "cancellation requested, killing downstream command");
            kill_and_reap(child);
            return Ok(WaitOutcome::Cancelled);
        }
        if Instant::now() >= deadline {
            warn!(pid = child.id(), "downstream command timed out, killing");
            kill_and_reap(child);
            return Ok(WaitOutcome::TimedOut);
        }
        thread::sleep(Duration::from_millis(constants::WAIT_POLL_INTERVAL_MS));
    }
}

fn kill_and_reap(child: &mut Child) {
    // kill already-exited children returns InvalidInput; either way reap
    let _ = child.kill();
    let _ = child.wait();
}
