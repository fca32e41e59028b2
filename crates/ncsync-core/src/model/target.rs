// ── Target ──
//
// One managed environment. Reachability is decided once at startup and
// stored on the value; nothing in the core inspects the host environment.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

use ncsync_api::ApiEndpoint;

use crate::error::CoreError;
use crate::tunnel::signature::ForwardSpec;

/// How the management API of a target is reached.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReachabilityMode {
    /// Connect straight to `remote_host:remote_port`.
    Direct,
    /// Forward `localhost:local_port` through the intermediary host.
    Tunneled,
}

/// SSH hop used to reach a segmented target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intermediary {
    pub host: String,
    /// Only set when the hop listens on a non-default port.
    pub port: Option<u16>,
}

/// Basic-auth credentials for the management API.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

/// A managed environment the engine can connect to and check.
#[derive(Debug, Clone)]
pub struct Target {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Free-form grouping label, e.g. `integration` or `production`.
    pub environment: Option<String>,
    pub platform: Option<String>,
    pub remote_host: String,
    pub remote_port: u16,
    pub intermediary: Option<Intermediary>,
    /// `https` when true, plain `http` otherwise.
    pub https: bool,
    pub local_port: u16,
    pub credentials: Credentials,
    pub reachability: ReachabilityMode,
}

impl Target {
    pub fn is_direct(&self) -> bool {
        self.reachability == ReachabilityMode::Direct
    }

    pub fn scheme(&self) -> &'static str {
        if self.https { "https" } else { "http" }
    }

    /// Base URL of the management API as seen from this host.
    pub fn base_url(&self) -> Result<Url, CoreError> {
        let raw = match self.reachability {
            ReachabilityMode::Tunneled => {
                format!("{}://localhost:{}/", self.scheme(), self.local_port)
            }
            ReachabilityMode::Direct => format!(
                "{}://{}:{}/",
                self.scheme(),
                bracket_ipv6(&self.remote_host),
                self.remote_port
            ),
        };
        Url::parse(&raw).map_err(|e| CoreError::Config {
            message: format!("target '{}' has an invalid address ({raw}): {e}", self.id),
        })
    }

    pub fn endpoint(&self) -> Result<ApiEndpoint, CoreError> {
        Ok(ApiEndpoint::new(
            self.base_url()?,
            self.credentials.username.clone(),
            self.credentials.password.clone(),
        ))
    }

    /// The `-L` forward a tunnel for this target must carry.
    pub fn forward_spec(&self) -> ForwardSpec {
        ForwardSpec {
            local_port: self.local_port,
            remote_host: self.remote_host.clone(),
            remote_port: self.remote_port,
        }
    }
}

fn bracket_ipv6(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]")
    } else {
        host.to_owned()
    }
}
