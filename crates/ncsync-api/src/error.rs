use thiserror::Error;

/// Maximum number of body/stderr characters carried in error values.
pub(crate) const SNIPPET_LEN: usize = 200;

/// Top-level error type for the `ncsync-api` crate.
///
/// Covers every way a single management-API request can fail: the external
/// HTTP process could not run, it ran but reported a transport failure, the
/// API answered with an HTTP error, or the body could not be interpreted.
/// `ncsync-core` maps these into domain errors and per-device statuses.
///
/// A timeout exit that still delivered a body is *not* an error here; see
/// [`Delivery::ToleratedTimeout`](crate::Delivery::ToleratedTimeout).
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// The request timed out without delivering any output.
    #[error("Request timed out after {timeout_secs}s with no response body")]
    Timeout { timeout_secs: u64 },

    /// Nothing accepted the TCP connection (tunnel down, API not listening).
    #[error("Connection refused by {url}")]
    ConnectionRefused { url: String },

    /// The HTTP process exited with a failure status not covered above.
    #[error("HTTP process failed (exit {}): {stderr}", display_code(.code))]
    Process { code: Option<i32>, stderr: String },

    /// The HTTP process could not be started or did not exit in time.
    #[error("Failed to run HTTP process: {0}")]
    Spawn(#[from] std::io::Error),

    /// URL construction failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Management API ──────────────────────────────────────────────
    /// Credentials rejected (HTTP 401).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Any other non-2xx response.
    #[error("Management API error (HTTP {}): {snippet}", display_status(.status))]
    Http { status: Option<u16>, snippet: String },

    // ── Data ────────────────────────────────────────────────────────
    /// The response body did not have the expected structure.
    #[error("Unexpected response: {message} (body preview: {snippet:?})")]
    Parse { message: String, snippet: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::ConnectionRefused { .. } | Self::Spawn(_)
        )
    }

    /// Returns `true` if the API could not be reached at all, as opposed to
    /// answering with something we could not use.
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::ConnectionRefused { .. }
                | Self::Process { .. }
                | Self::Spawn(_)
        )
    }

    /// The HTTP status carried by this error, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => *status,
            Self::Authentication { .. } => Some(401),
            _ => None,
        }
    }
}

/// First [`SNIPPET_LEN`] characters of a body, lossily decoded.
pub(crate) fn snippet(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .take(SNIPPET_LEN)
        .collect::<String>()
        .trim()
        .to_owned()
}

#[allow(clippy::ref_option)]
fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "by signal".into(), |c| c.to_string())
}

#[allow(clippy::ref_option)]
fn display_status(status: &Option<u16>) -> String {
    status.map_or_else(|| "unknown".into(), |s| s.to_string())
}
