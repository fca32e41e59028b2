//! Config subcommand handlers.

use ncsync_config::Config;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

const REDACTED: &str = "********";

/// Map an interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let color = output::should_color(&global.color);
    match args.command {
        // ── Path ────────────────────────────────────────────────────
        ConfigCommand::Path => {
            println!("{}", util::config_file(global).display());
            Ok(())
        }

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let mut cfg = util::load_config(global)?;
            for profile in cfg.targets.values_mut() {
                if profile.password.is_some() {
                    profile.password = Some(REDACTED.into());
                }
            }
            let out = output::render_single(
                &global.output,
                &cfg,
                |c| toml::to_string_pretty(c).unwrap_or_else(|e| format!("{c:#?}\n# {e}")),
                |c| c.targets.keys().cloned().collect::<Vec<_>>().join("\n"),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Init: starter file ──────────────────────────────────────
        ConfigCommand::Init { force } => {
            let path = util::config_file(global);
            if path.exists()
                && !force
                && !util::confirm(&format!("Overwrite {}?", path.display()))?
            {
                return Err(CliError::Validation {
                    field: "config".into(),
                    reason: format!(
                        "{} already exists; pass --force to overwrite",
                        path.display()
                    ),
                });
            }

            ncsync_config::save_config_to(&Config::starter(), &path)?;
            output::success(
                &format!("Configuration written to {}", path.display()),
                color,
                global.quiet,
            );
            if !global.quiet {
                eprintln!(
                    "  Edit the targets, then store passwords with: \
                     ncsync config set-password <target>"
                );
            }
            Ok(())
        }

        // ── SetPassword ─────────────────────────────────────────────
        ConfigCommand::SetPassword { target } => {
            let cfg = util::load_config(global)?;
            if !cfg.targets.contains_key(&target) {
                return Err(util::target_not_found(&cfg, &target));
            }

            let secret = rpassword::prompt_password(format!("Password for {target}: "))
                .map_err(prompt_err)?;
            if secret.is_empty() {
                return Err(CliError::Validation {
                    field: "password".into(),
                    reason: "value cannot be empty".into(),
                });
            }

            ncsync_config::store_password(&target, &secret)?;
            output::success(
                &format!("Password stored in system keyring for target '{target}'"),
                color,
                global.quiet,
            );
            Ok(())
        }
    }
}
