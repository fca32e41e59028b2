//! Shared helpers for command handlers.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use ncsync_config::{Config, ModeSetting};
use ncsync_core::{Engine, ReachabilityMode, Target};

use crate::cli::{GlobalOpts, ModeArg};
use crate::error::CliError;
use crate::output;

impl From<ModeArg> for ModeSetting {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Auto => Self::Auto,
            ModeArg::Direct => Self::Direct,
            ModeArg::Tunneled => Self::Tunneled,
        }
    }
}

/// Config file in effect: `--config` / `NCSYNC_CONFIG`, else the platform path.
pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(ncsync_config::config_path)
}

pub fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(ncsync_config::load_config_from(&config_file(global))?)
}

/// Everything a target-bound command needs, resolved once at startup.
pub struct Context {
    pub config: Config,
    pub mode: ReachabilityMode,
    pub engine: Engine,
    pub color: bool,
}

impl Context {
    pub fn load(global: &GlobalOpts) -> Result<Self, CliError> {
        let config = load_config(global)?;
        let mode = ncsync_config::detect_mode(&config.defaults, global.mode.map(Into::into));

        let mut engine_config = ncsync_config::engine_config(&config.defaults);
        if let Some(secs) = global.timeout {
            engine_config.transport.max_time = Duration::from_secs(secs);
        }

        Ok(Self {
            engine: Engine::system(engine_config),
            config,
            mode,
            color: output::should_color(&global.color),
        })
    }

    /// Fully resolved target, credentials included.
    pub fn target(&self, id: &str) -> Result<Target, CliError> {
        self.ensure_known(id)?;
        Ok(ncsync_config::resolve_target(&self.config, id, self.mode)?)
    }

    /// Target for tunnel management only; the API password is not needed.
    pub fn tunnel_target(&self, id: &str) -> Result<Target, CliError> {
        self.ensure_known(id)?;
        let profile = self.config.target(id)?;
        let username = ncsync_config::resolve_username(profile, |name| std::env::var(name).ok());
        Ok(ncsync_config::profile_to_target(
            id,
            profile,
            &self.config.defaults,
            self.mode,
            username,
            SecretString::from(String::new()),
        ))
    }

    fn ensure_known(&self, id: &str) -> Result<(), CliError> {
        if self.config.targets.contains_key(id) {
            Ok(())
        } else {
            Err(target_not_found(&self.config, id))
        }
    }
}

pub fn target_not_found(config: &Config, id: &str) -> CliError {
    let available: Vec<&str> = config.targets.keys().map(String::as_str).collect();
    CliError::TargetNotFound {
        name: id.into(),
        available: if available.is_empty() {
            "(none)".into()
        } else {
            available.join(", ")
        },
    }
}

/// Prompt for confirmation; refuses when stdin is not a terminal.
pub fn confirm(message: &str) -> Result<bool, CliError> {
    if !std::io::stdin().is_terminal() {
        return Ok(false);
    }
    dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))
}
