//! `connect`, `disconnect`, `status`: tunnel lifecycle commands.

use chrono::Local;
use serde::Serialize;
use tabled::Tabled;

use ncsync_core::{ReachabilityMode, Tunnel, TunnelState};

use crate::cli::{GlobalOpts, StatusArgs, TargetArg};
use crate::error::CliError;
use crate::output;

use super::util::Context;

fn detail(t: &Tunnel, color: bool) -> String {
    [
        format!("Target:   {}", t.target_id),
        format!("State:    {}", output::paint_state(t.state, color)),
        format!("Port:     localhost:{}", t.local_port),
        format!(
            "PID:      {}",
            t.pid.map_or_else(|| "-".into(), |pid| pid.to_string())
        ),
        format!(
            "Since:    {}",
            t.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        ),
    ]
    .join("\n")
}

pub async fn connect(ctx: &Context, args: &TargetArg, global: &GlobalOpts) -> Result<(), CliError> {
    let target = ctx.tunnel_target(&args.target)?;
    let tunnel = ctx.engine.ensure_connected(&target).await?;

    if target.reachability == ReachabilityMode::Direct {
        output::success(
            &format!("{} is reached directly; no tunnel needed", target.id),
            ctx.color,
            global.quiet,
        );
        return Ok(());
    }

    let color = ctx.color;
    let out = output::render_single(&global.output, &tunnel, |t| detail(t, color), |t| {
        t.local_port.to_string()
    });
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn disconnect(
    ctx: &Context,
    args: &TargetArg,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let target = ctx.tunnel_target(&args.target)?;
    if ctx.engine.disconnect(&target).await {
        output::success(
            &format!("Tunnel for {} on port {} closed", target.id, target.local_port),
            ctx.color,
            global.quiet,
        );
    } else if !global.quiet {
        eprintln!("No tunnel for {} was running", target.id);
    }
    Ok(())
}

// ── Status ──────────────────────────────────────────────────────────

#[derive(Serialize)]
struct StatusEntry {
    target: String,
    mode: ReachabilityMode,
    local_port: u16,
    state: TunnelState,
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Port")]
    local_port: String,
    #[tabled(rename = "State")]
    state: String,
}

pub async fn status(ctx: &Context, args: &StatusArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let ids: Vec<String> = match &args.target {
        Some(id) => vec![id.clone()],
        None => ctx.config.targets.keys().cloned().collect(),
    };

    let mut entries = Vec::with_capacity(ids.len());
    for id in &ids {
        let target = ctx.tunnel_target(id)?;
        entries.push(StatusEntry {
            state: ctx.engine.tunnel_status(&target).await,
            target: target.id,
            mode: target.reachability,
            local_port: target.local_port,
        });
    }

    let out = output::render_list(
        &global.output,
        &entries,
        |e| StatusRow {
            target: e.target.clone(),
            mode: e.mode.to_string(),
            local_port: match e.mode {
                ReachabilityMode::Direct => "-".into(),
                ReachabilityMode::Tunneled => e.local_port.to_string(),
            },
            state: e.state.to_string(),
        },
        |e| format!("{}\t{}", e.target, e.state),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}
