//! `targets`: list configured targets.

use serde::Serialize;
use tabled::Tabled;

use ncsync_core::Target;

use crate::cli::{GlobalOpts, TargetsArgs};
use crate::error::CliError;
use crate::output;

use super::util::Context;

#[derive(Serialize)]
struct TargetSummary {
    id: String,
    name: String,
    environment: Option<String>,
    platform: Option<String>,
    mode: String,
    api_url: String,
    local_port: u16,
    via: Option<String>,
    description: Option<String>,
}

impl From<&Target> for TargetSummary {
    fn from(t: &Target) -> Self {
        Self {
            id: t.id.clone(),
            name: t.name.clone(),
            environment: t.environment.clone(),
            platform: t.platform.clone(),
            mode: t.reachability.to_string(),
            api_url: format!("{}://{}:{}", t.scheme(), t.remote_host, t.remote_port),
            local_port: t.local_port,
            via: t.intermediary.as_ref().map(|hop| match hop.port {
                Some(port) => format!("{}:{port}", hop.host),
                None => hop.host.clone(),
            }),
            description: t.description.clone(),
        }
    }
}

#[derive(Tabled)]
struct TargetRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Env")]
    environment: String,
    #[tabled(rename = "Platform")]
    platform: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "API")]
    api_url: String,
    #[tabled(rename = "Local")]
    local_port: u16,
    #[tabled(rename = "Via")]
    via: String,
}

impl From<&TargetSummary> for TargetRow {
    fn from(s: &TargetSummary) -> Self {
        Self {
            id: s.id.clone(),
            name: s.name.clone(),
            environment: s.environment.clone().unwrap_or_default(),
            platform: s.platform.clone().unwrap_or_default(),
            mode: s.mode.clone(),
            api_url: s.api_url.clone(),
            local_port: s.local_port,
            via: s.via.clone().unwrap_or_else(|| "-".into()),
        }
    }
}

pub fn handle(ctx: &Context, args: &TargetsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let summaries = ctx
        .config
        .targets_filtered(args.environment.as_deref(), args.platform.as_deref())
        .map(|(id, _)| ctx.tunnel_target(id).map(|t| TargetSummary::from(&t)))
        .collect::<Result<Vec<_>, _>>()?;

    if summaries.is_empty() && matches!(global.output, crate::cli::OutputFormat::Table) {
        if !global.quiet {
            eprintln!("No matching targets. Add some with: ncsync config init");
        }
        return Ok(());
    }

    let out = output::render_list(&global.output, &summaries, |s| TargetRow::from(s), |s| {
        s.id.clone()
    });
    output::print_output(&out, global.quiet);
    Ok(())
}
