//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and a process exit code.

use miette::Diagnostic;
use thiserror::Error;

use ncsync_config::ConfigError;
use ncsync_core::CoreError;

pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    /// Check finished; some devices are out of sync or have no verdict.
    pub const NOT_IN_SYNC: i32 = 10;
    /// Check stopped before every device had a result.
    pub const INCOMPLETE: i32 = 11;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Cannot reach {target}")]
    #[diagnostic(
        code(ncsync::connection_failed),
        help(
            "{reason}\n\
             Check that the SSH intermediary is reachable without a password prompt.\n\
             Try: ncsync --mode direct test <target> from inside the network"
        )
    )]
    ConnectionFailed { target: String, reason: String },

    #[error("Could not run an external command: {message}")]
    #[diagnostic(
        code(ncsync::transport),
        help("ncsync shells out to `ssh` and `curl`; make sure both are on PATH.")
    )]
    Transport { message: String },

    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(ncsync::timeout),
        help("Increase the limit with --timeout or `defaults.request_timeout`.")
    )]
    Timeout { seconds: u64 },

    // ── Authentication ───────────────────────────────────────────────

    #[error("Authentication failed")]
    #[diagnostic(
        code(ncsync::auth_failed),
        help(
            "{message}\n\
             Store the right password with: ncsync config set-password <target>"
        )
    )]
    AuthFailed { message: String },

    #[error("No credentials configured for target '{target}'")]
    #[diagnostic(
        code(ncsync::no_credentials),
        help(
            "Set `password_env` for the target, or run: ncsync config set-password {target}"
        )
    )]
    NoCredentials { target: String },

    // ── Lookup ───────────────────────────────────────────────────────

    #[error("Target '{name}' not found in configuration")]
    #[diagnostic(
        code(ncsync::target_not_found),
        help(
            "Available targets: {available}\n\
             Run: ncsync targets"
        )
    )]
    TargetNotFound { name: String, available: String },

    // ── Management API ───────────────────────────────────────────────

    #[error("Management API error ({status}): {message}")]
    #[diagnostic(code(ncsync::api_error))]
    ApiError { status: String, message: String },

    #[error("Unexpected response: {message}")]
    #[diagnostic(code(ncsync::parse), help("Response began with: {snippet}"))]
    Parse { message: String, snippet: String },

    // ── Sync outcome ─────────────────────────────────────────────────

    #[error("{target}: {not_in_sync} of {total} devices are not in sync")]
    #[diagnostic(code(ncsync::not_in_sync))]
    NotInSync {
        target: String,
        not_in_sync: usize,
        total: usize,
    },

    #[error("{target}: check incomplete ({checked} of {total} devices checked)")]
    #[diagnostic(code(ncsync::incomplete))]
    Incomplete {
        target: String,
        checked: usize,
        total: usize,
        #[help]
        reason: Option<String>,
    },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(ncsync::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error(transparent)]
    #[diagnostic(code(ncsync::config))]
    Config(Box<figment::Error>),

    #[error("Keyring error: {message}")]
    #[diagnostic(code(ncsync::keyring))]
    Keyring { message: String },

    #[error("Internal error: {0}")]
    #[diagnostic(code(ncsync::internal))]
    Internal(String),

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for CliError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Transport { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::TargetNotFound { .. } => exit_code::NOT_FOUND,
            Self::Validation { .. } => exit_code::USAGE,
            Self::NotInSync { .. } => exit_code::NOT_IN_SYNC,
            Self::Incomplete { .. } => exit_code::INCOMPLETE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Connectivity { target, reason } => {
                CliError::ConnectionFailed { target, reason }
            }
            CoreError::Transport { message } => CliError::Transport { message },
            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },
            CoreError::Authentication { message } => CliError::AuthFailed { message },
            CoreError::Api { message, status } => CliError::ApiError {
                status: status.map_or_else(|| "-".into(), |s| s.to_string()),
                message,
            },
            CoreError::Parse { message, snippet } => CliError::Parse { message, snippet },
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::UnknownTarget { id } => CliError::TargetNotFound {
                name: id,
                available: String::new(),
            },
            ConfigError::NoCredentials { target } => CliError::NoCredentials { target },
            ConfigError::Keyring(e) => CliError::Keyring {
                message: e.to_string(),
            },
            ConfigError::Serialization(e) => CliError::Internal(e.to_string()),
            ConfigError::Figment(e) => CliError::Config(e),
            ConfigError::Io(e) => CliError::Io(e),
        }
    }
}
