//! Command dispatch: bridges CLI args -> engine calls -> output formatting.

pub mod check;
pub mod config_cmd;
pub mod devices;
pub mod targets;
pub mod tunnel;
pub mod util;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

use self::util::Context;

/// Dispatch a target-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Targets(args) => targets::handle(ctx, &args, global),
        Command::Connect(args) => tunnel::connect(ctx, &args, global).await,
        Command::Disconnect(args) => tunnel::disconnect(ctx, &args, global).await,
        Command::Status(args) => tunnel::status(ctx, &args, global).await,
        Command::Devices(args) => devices::list(ctx, &args, global).await,
        Command::Test(args) => devices::test(ctx, &args, global).await,
        Command::Check(args) => check::handle(ctx, &args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "config and completions are not dispatched".into(),
        )),
    }
}
