//! Shared configuration for ncsync.
//!
//! TOML target definitions, credential resolution (env + keyring +
//! plaintext), reachability-mode detection, and translation to
//! `ncsync_core::Target` / `ncsync_core::EngineConfig`. The CLI layers
//! its flag overrides on top.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use ncsync_api::{TlsMode, TransportConfig};
use ncsync_core::{
    Credentials, EngineConfig, Intermediary, ReachabilityMode, Target, TunnelSettings,
};

/// Keyring service name for stored passwords.
pub const KEYRING_SERVICE: &str = "ncsync";

/// Environment variable holding a fallback username.
pub const USERNAME_ENV: &str = "NCSYNC_USERNAME";

const DEFAULT_USERNAME: &str = "admin";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no target named '{id}' in the configuration")]
    UnknownTarget { id: String },

    #[error("no credentials configured for target '{target}'")]
    NoCredentials { target: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,

    /// Target definitions keyed by identifier.
    #[serde(default)]
    pub targets: BTreeMap<String, TargetProfile>,
}

/// How the Direct/Tunneled decision is made.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ModeSetting {
    /// Direct when the local hostname contains `direct_hostname`.
    #[default]
    Auto,
    Direct,
    Tunneled,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default)]
    pub mode: ModeSetting,

    /// In auto mode, hostnames containing this (case-insensitive) are
    /// inside the management network.
    #[serde(default = "default_direct_hostname")]
    pub direct_hostname: String,

    /// Intermediary for targets that don't name their own; empty disables it.
    #[serde(default = "default_ssh_host")]
    pub ssh_host: Option<String>,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Seconds; curl `--connect-timeout`.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Seconds; curl `--max-time`.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Seconds to wait for a new tunnel's port to accept connections.
    #[serde(default = "default_tunnel_deadline")]
    pub tunnel_deadline: u64,

    /// Skip TLS verification (management APIs ship self-signed certs).
    #[serde(default = "default_insecure")]
    pub insecure: bool,

    /// CA bundle used when `insecure` is off.
    pub ca_cert: Option<PathBuf>,

    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            mode: ModeSetting::Auto,
            direct_hostname: default_direct_hostname(),
            ssh_host: default_ssh_host(),
            concurrency: default_concurrency(),
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
            tunnel_deadline: default_tunnel_deadline(),
            insecure: default_insecure(),
            ca_cert: None,
            output: default_output(),
            color: default_color(),
        }
    }
}

fn default_direct_hostname() -> String {
    "dev-vm".into()
}
#[allow(clippy::unnecessary_wraps)]
fn default_ssh_host() -> Option<String> {
    Some("devm".into())
}
fn default_concurrency() -> usize {
    ncsync_core::DEFAULT_CONCURRENCY
}
fn default_connect_timeout() -> u64 {
    5
}
fn default_request_timeout() -> u64 {
    10
}
fn default_tunnel_deadline() -> u64 {
    15
}
fn default_insecure() -> bool {
    true
}
fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}

/// One target as written in the config file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TargetProfile {
    /// Display name (defaults to the identifier).
    pub name: Option<String>,
    pub description: Option<String>,

    /// Management API address as seen from inside the network.
    pub host: String,

    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Local end of the tunnel (defaults to `port`). Must be unique
    /// across targets that can be connected at the same time.
    pub local_port: Option<u16>,

    /// Intermediary host; falls back to `defaults.ssh_host`.
    pub ssh_host: Option<String>,
    pub ssh_port: Option<u16>,

    #[serde(default = "default_https")]
    pub https: bool,

    /// Tunnel even when the host is otherwise Direct.
    #[serde(default)]
    pub always_tunnel: bool,

    pub environment: Option<String>,
    pub platform: Option<String>,

    pub username: Option<String>,
    /// Environment variable containing the password.
    pub password_env: Option<String>,
    /// Plaintext password (prefer keyring or env var).
    pub password: Option<String>,
}

fn default_api_port() -> u16 {
    8888
}
fn default_https() -> bool {
    true
}

impl TargetProfile {
    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(id)
    }

    pub fn local_port(&self) -> u16 {
        self.local_port.unwrap_or(self.port)
    }
}

impl Config {
    pub fn target(&self, id: &str) -> Result<&TargetProfile, ConfigError> {
        self.targets
            .get(id)
            .ok_or_else(|| ConfigError::UnknownTarget { id: id.into() })
    }

    /// Targets matching the optional environment and platform labels.
    pub fn targets_filtered<'a>(
        &'a self,
        environment: Option<&'a str>,
        platform: Option<&'a str>,
    ) -> impl Iterator<Item = (&'a String, &'a TargetProfile)> + 'a {
        self.targets.iter().filter(move |(_, p)| {
            environment.is_none_or(|env| p.environment.as_deref() == Some(env))
                && platform.is_none_or(|plat| p.platform.as_deref() == Some(plat))
        })
    }

    /// Check for local-port collisions between targets.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen: BTreeMap<u16, &str> = BTreeMap::new();
        for (id, profile) in &self.targets {
            if profile.host.trim().is_empty() {
                return Err(ConfigError::Validation {
                    field: format!("targets.{id}.host"),
                    reason: "must not be empty".into(),
                });
            }
            if let Some(other) = seen.insert(profile.local_port(), id) {
                return Err(ConfigError::Validation {
                    field: format!("targets.{id}.local_port"),
                    reason: format!("port {} is also used by '{other}'", profile.local_port()),
                });
            }
        }
        Ok(())
    }

    /// Starter configuration written by `config init`.
    pub fn starter() -> Self {
        let mut targets = BTreeMap::new();
        targets.insert(
            "titan-integration".into(),
            TargetProfile {
                name: Some("Titan Integration".into()),
                description: Some("Titan integration environment for testing".into()),
                host: "198.51.100.10".into(),
                local_port: Some(8889),
                environment: Some("integration".into()),
                platform: Some("titan".into()),
                password_env: Some("NCSYNC_PASS_INT".into()),
                ..TargetProfile::starter_base()
            },
        );
        targets.insert(
            "titan-production".into(),
            TargetProfile {
                name: Some("Titan Production".into()),
                description: Some("Titan production environment - use with caution".into()),
                host: "198.51.100.23".into(),
                local_port: Some(8892),
                ssh_host: Some("jump01".into()),
                ssh_port: Some(443),
                https: false,
                always_tunnel: true,
                environment: Some("production".into()),
                platform: Some("titan".into()),
                password_env: Some("NCSYNC_PASS_PROD".into()),
                ..TargetProfile::starter_base()
            },
        );
        Self {
            defaults: Defaults::default(),
            targets,
        }
    }
}

impl TargetProfile {
    fn starter_base() -> Self {
        Self {
            port: default_api_port(),
            https: default_https(),
            username: Some(DEFAULT_USERNAME.into()),
            ..Self::default()
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "ncsync", "ncsync").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("ncsync");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load config from `path` (a missing file is fine) + environment.
///
/// Environment keys use the `NCSYNC_` prefix with `__` as the nesting
/// separator, e.g. `NCSYNC_DEFAULTS__CONCURRENCY=4`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading configuration");
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("NCSYNC_").split("__"));

    let config: Config = figment.extract()?;
    config.validate()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML at `path`, creating parent directories.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

fn keyring_entry(target_id: &str) -> Result<keyring::Entry, keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{target_id}/password"))
}

fn keyring_password(target_id: &str) -> Option<String> {
    keyring_entry(target_id)
        .and_then(|entry| entry.get_password())
        .ok()
}

/// Store a target's password in the system keyring.
pub fn store_password(target_id: &str, password: &str) -> Result<(), ConfigError> {
    keyring_entry(target_id)?.set_password(password)?;
    Ok(())
}

/// Resolve the API password: `password_env` → keyring → plaintext.
pub fn resolve_password(
    profile: &TargetProfile,
    target_id: &str,
) -> Result<SecretString, ConfigError> {
    resolve_password_with(
        profile,
        target_id,
        |name| std::env::var(name).ok(),
        keyring_password,
    )
}

/// [`resolve_password`] with injectable lookups.
pub fn resolve_password_with(
    profile: &TargetProfile,
    target_id: &str,
    env: impl Fn(&str) -> Option<String>,
    keyring: impl Fn(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    // 1. Profile's password_env → env var lookup
    if let Some(value) = profile.password_env.as_deref().and_then(&env) {
        return Ok(SecretString::from(value));
    }

    // 2. System keyring
    if let Some(secret) = keyring(target_id) {
        return Ok(SecretString::from(secret));
    }

    // 3. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        target: target_id.into(),
    })
}

/// Username: profile → `NCSYNC_USERNAME` → `admin`.
pub fn resolve_username(profile: &TargetProfile, env: impl Fn(&str) -> Option<String>) -> String {
    profile
        .username
        .clone()
        .or_else(|| env(USERNAME_ENV))
        .unwrap_or_else(|| DEFAULT_USERNAME.into())
}

// ── Reachability ────────────────────────────────────────────────────

/// Global mode from the setting and (for `auto`) the local hostname.
pub fn resolve_mode(
    setting: ModeSetting,
    direct_hostname: &str,
    hostname: Option<&str>,
) -> ReachabilityMode {
    match setting {
        ModeSetting::Direct => ReachabilityMode::Direct,
        ModeSetting::Tunneled => ReachabilityMode::Tunneled,
        ModeSetting::Auto => {
            let inside = !direct_hostname.is_empty()
                && hostname.is_some_and(|h| {
                    h.to_lowercase()
                        .contains(&direct_hostname.to_lowercase())
                });
            if inside {
                ReachabilityMode::Direct
            } else {
                ReachabilityMode::Tunneled
            }
        }
    }
}

/// Resolve the global mode once, reading the hostname if needed.
pub fn detect_mode(defaults: &Defaults, setting: Option<ModeSetting>) -> ReachabilityMode {
    let setting = setting.unwrap_or(defaults.mode);
    let host = match setting {
        ModeSetting::Auto => hostname::get()
            .ok()
            .map(|h| h.to_string_lossy().into_owned()),
        _ => None,
    };
    let mode = resolve_mode(setting, &defaults.direct_hostname, host.as_deref());
    debug!(%setting, hostname = ?host, %mode, "reachability mode resolved");
    mode
}

// ── Translation to core types ───────────────────────────────────────

/// Build a `Target` from a profile with the given global mode and
/// password already resolved.
pub fn profile_to_target(
    id: &str,
    profile: &TargetProfile,
    defaults: &Defaults,
    global_mode: ReachabilityMode,
    username: String,
    password: SecretString,
) -> Target {
    let intermediary = profile
        .ssh_host
        .clone()
        .or_else(|| defaults.ssh_host.clone())
        .filter(|h| !h.trim().is_empty())
        .map(|host| Intermediary {
            host,
            port: profile.ssh_port,
        });

    let reachability = match (&intermediary, profile.always_tunnel) {
        (None, _) => ReachabilityMode::Direct,
        (Some(_), true) => ReachabilityMode::Tunneled,
        (Some(_), false) => global_mode,
    };

    Target {
        id: id.into(),
        name: profile.display_name(id).into(),
        description: profile.description.clone(),
        environment: profile.environment.clone(),
        platform: profile.platform.clone(),
        remote_host: profile.host.clone(),
        remote_port: profile.port,
        intermediary,
        https: profile.https,
        local_port: profile.local_port(),
        credentials: Credentials { username, password },
        reachability,
    }
}

/// Look up `id` and build its `Target`, resolving credentials from the
/// process environment and keyring.
pub fn resolve_target(
    config: &Config,
    id: &str,
    global_mode: ReachabilityMode,
) -> Result<Target, ConfigError> {
    let profile = config.target(id)?;
    let password = resolve_password(profile, id)?;
    let username = resolve_username(profile, |name| std::env::var(name).ok());
    Ok(profile_to_target(
        id,
        profile,
        &config.defaults,
        global_mode,
        username,
        password,
    ))
}

/// Engine tuning from `[defaults]`.
pub fn engine_config(defaults: &Defaults) -> EngineConfig {
    let tls = if defaults.insecure {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca) = defaults.ca_cert {
        TlsMode::CustomCa(ca.clone())
    } else {
        TlsMode::System
    };

    EngineConfig {
        transport: TransportConfig {
            tls,
            connect_timeout: Duration::from_secs(defaults.connect_timeout),
            max_time: Duration::from_secs(defaults.request_timeout),
            ..TransportConfig::default()
        },
        tunnel: TunnelSettings {
            deadline: Duration::from_secs(defaults.tunnel_deadline),
            ..TunnelSettings::default()
        },
        concurrency: defaults.concurrency.max(1),
    }
}
