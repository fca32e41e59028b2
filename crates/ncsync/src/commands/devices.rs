//! `devices` and `test`: read-only management-API queries.

use serde::Serialize;
use tabled::Tabled;

use crate::cli::{GlobalOpts, OutputFormat, TargetArg};
use crate::error::CliError;
use crate::output;

use super::util::Context;

/// Inventory entry plus its position; repeated names stay distinct rows.
#[derive(Serialize)]
struct Device<'a> {
    #[serde(skip)]
    index: usize,
    name: &'a str,
}

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Device")]
    name: String,
}

pub async fn list(ctx: &Context, args: &TargetArg, global: &GlobalOpts) -> Result<(), CliError> {
    let target = ctx.target(&args.target)?;
    let inventory = ctx.engine.inventory(&target).await?;

    let devices: Vec<Device<'_>> = inventory
        .iter()
        .enumerate()
        .map(|(i, d)| Device {
            index: i + 1,
            name: &d.name,
        })
        .collect();
    let out = output::render_list(
        &global.output,
        &devices,
        |d| DeviceRow {
            index: d.index,
            name: d.name.to_owned(),
        },
        |d| d.name.to_owned(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

#[derive(Serialize)]
struct ConnectionCheck {
    target: String,
    api_url: String,
    reachable: bool,
}

pub async fn test(ctx: &Context, args: &TargetArg, global: &GlobalOpts) -> Result<(), CliError> {
    let target = ctx.target(&args.target)?;
    ctx.engine.test_connection(&target).await?;

    let check = ConnectionCheck {
        api_url: target.base_url()?.to_string(),
        target: target.id,
        reachable: true,
    };

    if matches!(global.output, OutputFormat::Table) {
        output::success(
            &format!("{}: management API answered at {}", check.target, check.api_url),
            ctx.color,
            global.quiet,
        );
        return Ok(());
    }

    let out = output::render_single(&global.output, &check, |_| String::new(), |c| {
        c.api_url.clone()
    });
    output::print_output(&out, global.quiet);
    Ok(())
}
