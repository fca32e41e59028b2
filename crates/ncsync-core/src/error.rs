// ── Core error types ──
//
// Domain errors from ncsync-core. Callers never see curl exit codes or raw
// process failures; the `From<ncsync_api::Error>` impl translates them.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connectivity ─────────────────────────────────────────────────
    /// The tunnel could not be established or verified, or nothing answered
    /// at the API address. Retryable.
    #[error("Cannot reach {target}: {reason}")]
    Connectivity { target: String, reason: String },

    /// An external process could not be run or failed outright. Retryable.
    #[error("Transport failure: {message}")]
    Transport { message: String },

    #[error("Management API timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Management API ───────────────────────────────────────────────
    #[error("Management API error: {message}")]
    Api { message: String, status: Option<u16> },

    #[error("Unexpected response: {message}")]
    Parse { message: String, snippet: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// Whether retrying the same operation later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connectivity { .. } | Self::Transport { .. } | Self::Timeout { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<ncsync_api::Error> for CoreError {
    fn from(err: ncsync_api::Error) -> Self {
        match err {
            ncsync_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            ncsync_api::Error::ConnectionRefused { url } => CoreError::Connectivity {
                target: url,
                reason: "connection refused".into(),
            },
            e @ (ncsync_api::Error::Process { .. } | ncsync_api::Error::Spawn(_)) => {
                CoreError::Transport {
                    message: e.to_string(),
                }
            }
            ncsync_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            ncsync_api::Error::Authentication { message } => CoreError::Authentication { message },
            ncsync_api::Error::Http { status, snippet } => CoreError::Api {
                message: if snippet.is_empty() {
                    "request rejected".into()
                } else {
                    snippet
                },
                status,
            },
            ncsync_api::Error::Parse { message, snippet } => CoreError::Parse { message, snippet },
        }
    }
}
