//! `check`: sync-check every device on a target.

use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tabled::Tabled;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use ncsync_core::{CheckOptions, Progress, SyncReport, SyncResult, SyncStatus};

use crate::cli::{CheckArgs, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::util::Context;

#[derive(Tabled)]
struct ResultRow {
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Time")]
    elapsed: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

impl From<&SyncResult> for ResultRow {
    fn from(r: &SyncResult) -> Self {
        Self {
            device: r.device.clone(),
            status: r.status.label().to_owned(),
            elapsed: output::fmt_elapsed(r.elapsed),
            detail: r.detail().unwrap_or_default().to_owned(),
        }
    }
}

pub async fn handle(ctx: &Context, args: &CheckArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let target = ctx.target(&args.target)?;

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let show_progress = !args.no_progress && !global.quiet && std::io::stderr().is_terminal();
    let (progress_tx, progress_task) = if show_progress {
        let (tx, rx) = mpsc::unbounded_channel();
        (Some(tx), Some(tokio::spawn(draw_progress(rx, target.id.clone()))))
    } else {
        (None, None)
    };

    let options = CheckOptions {
        concurrency: args.concurrency.map(usize::from),
        progress: progress_tx,
        cancel,
    };
    let report = ctx.engine.check_all_with(&target, options).await;

    // The sender is dropped with `options`, so the bar task finishes.
    if let Some(task) = progress_task {
        let _ = task.await;
    }
    interrupt.abort();

    print_report(&report, global, ctx.color);
    outcome(&report)
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("interrupted; waiting for in-flight checks to finish");
        cancel.cancel();
    }
}

async fn draw_progress(mut rx: mpsc::UnboundedReceiver<Progress>, target_id: String) {
    let bar = ProgressBar::new_spinner();
    bar.set_message(format!("{target_id}: fetching inventory"));
    bar.enable_steady_tick(Duration::from_millis(100));

    let style = ProgressStyle::with_template(
        "{spinner} {prefix} [{bar:30}] {pos}/{len} {wide_msg}",
    )
    .map(|s| s.progress_chars("=> "));

    let mut started = false;
    while let Some(event) = rx.recv().await {
        if !started {
            if let Ok(ref style) = style {
                bar.set_style(style.clone());
            }
            bar.set_prefix(target_id.clone());
            bar.set_length(u64::try_from(event.total).unwrap_or(u64::MAX));
            started = true;
        }
        bar.set_position(u64::try_from(event.done).unwrap_or(u64::MAX));
        bar.set_message(format!("{} {}", event.device, event.status.label()));
    }
    bar.finish_and_clear();
}

fn print_report(report: &SyncReport, global: &GlobalOpts, color: bool) {
    match global.output {
        OutputFormat::Table => {
            if !report.results.is_empty() {
                let rows: Vec<ResultRow> = report.results.iter().map(ResultRow::from).collect();
                output::print_output(&output::render_table(&rows), global.quiet);
            }
            if !global.quiet {
                eprintln!("{}", summary(report, color));
            }
        }
        OutputFormat::Plain => {
            let lines: Vec<String> = report
                .results
                .iter()
                .map(|r| format!("{}\t{}", r.device, r.status.label()))
                .collect();
            output::print_output(&lines.join("\n"), global.quiet);
        }
        _ => {
            let out = output::render_single(&global.output, report, |_| String::new(), |_| {
                String::new()
            });
            output::print_output(&out, global.quiet);
        }
    }
}

fn summary(report: &SyncReport, color: bool) -> String {
    let c = &report.counts;
    let parts = [
        (c.in_sync, SyncStatus::InSync),
        (c.out_of_sync, SyncStatus::OutOfSync),
        (c.unreachable, SyncStatus::Unreachable),
        (c.error, SyncStatus::Error(String::new())),
    ]
    .iter()
    .filter(|(n, _)| *n > 0)
    .map(|(n, status)| format!("{n} {}", output::paint_status(status, color)))
    .collect::<Vec<_>>()
    .join(", ");

    let head = format!(
        "{}: {} devices in {}",
        report.target_id,
        report.total,
        output::fmt_elapsed(report.elapsed)
    );
    let head = if color { head.bold().to_string() } else { head };
    if parts.is_empty() {
        head
    } else {
        format!("{head} ({parts})")
    }
}

/// Exit status for a finished report.
fn outcome(report: &SyncReport) -> Result<(), CliError> {
    if !report.complete {
        return Err(CliError::Incomplete {
            target: report.target_id.clone(),
            checked: report.results.len(),
            total: report.total,
            reason: report.error.clone(),
        });
    }
    let not_in_sync = report.total - report.counts.in_sync;
    if not_in_sync > 0 {
        return Err(CliError::NotInSync {
            target: report.target_id.clone(),
            not_in_sync,
            total: report.total,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::exit_code;

    fn result(device: &str, status: SyncStatus) -> SyncResult {
        SyncResult::new(device, status, Duration::from_millis(12))
    }

    #[test]
    fn all_in_sync_is_success() {
        let report = SyncReport::from_results(
            "t",
            2,
            vec![result("a", SyncStatus::InSync), result("b", SyncStatus::InSync)],
            Duration::from_secs(1),
        );
        assert!(outcome(&report).is_ok());
    }

    #[test]
    fn drift_exits_not_in_sync() {
        let report = SyncReport::from_results(
            "t",
            2,
            vec![result("a", SyncStatus::InSync), result("b", SyncStatus::OutOfSync)],
            Duration::from_secs(1),
        );
        let err = outcome(&report).expect_err("should fail");
        assert_eq!(err.exit_code(), exit_code::NOT_IN_SYNC);
    }

    #[test]
    fn missing_results_exit_incomplete() {
        let report = SyncReport::from_results(
            "t",
            3,
            vec![result("a", SyncStatus::InSync)],
            Duration::from_secs(1),
        );
        let err = outcome(&report).expect_err("should fail");
        assert_eq!(err.exit_code(), exit_code::INCOMPLETE);

        let aborted = SyncReport::aborted("t", "no tunnel".into(), Duration::ZERO);
        assert_eq!(outcome(&aborted).expect_err("should fail").exit_code(), exit_code::INCOMPLETE);
    }

    #[test]
    fn summary_lists_only_nonzero_counts() {
        let report = SyncReport::from_results(
            "titan-e2e",
            3,
            vec![
                result("a", SyncStatus::InSync),
                result("b", SyncStatus::Unreachable),
                result("c", SyncStatus::InSync),
            ],
            Duration::from_millis(1500),
        );
        assert_eq!(
            summary(&report, false),
            "titan-e2e: 3 devices in 1s 500ms (2 in-sync, 1 unreachable)"
        );
    }
}
