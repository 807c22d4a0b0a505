//! Centralized constants for defaults, limits, and environment key names.

/// Default HTTP timeout for broker requests, in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;

/// Default number of issuance attempts against an unavailable backend.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Default base delay for exponential backoff between retries, in milliseconds.
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 250;

/// Default timeout for the downstream command, in seconds.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 3600;

/// Poll interval while awaiting the downstream command, in milliseconds.
pub const WAIT_POLL_INTERVAL_MS: u64 = 100;

/// Exit code when the downstream command exceeds its timeout.
pub const EXIT_TIMEOUT: i32 = 124;

/// Exit code when the run is cancelled by a termination signal.
pub const EXIT_CANCELLED: i32 = 130;

/// Exit code for fatal errors before the downstream command starts.
pub const EXIT_FATAL: i32 = 1;

/// Environment variable for the broker address.
pub const ENV_BROKER_ADDR: &str = "LEASERUN_BROKER_ADDR";

/// Environment variable for the broker bearer token.
pub const ENV_BROKER_TOKEN: &str = "LEASERUN_BROKER_TOKEN";

/// Environment variable for the injected AWS region.
pub const ENV_AWS_REGION: &str = "LEASERUN_AWS_REGION";

/// Environment variable pointing at an optional config file.
pub const ENV_CONFIG_FILE: &str = "LEASERUN_CONFIG";

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "leaserun.toml";

/// Injected variable names for the downstream process.
pub const VAR_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const VAR_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const VAR_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";
pub const VAR_DEFAULT_REGION: &str = "AWS_DEFAULT_REGION";
pub const VAR_REGION: &str = "AWS_REGION";

/// Length of the hex lease fingerprint stored in audit entries.
pub const LEASE_FINGERPRINT_LEN: usize = 16;
