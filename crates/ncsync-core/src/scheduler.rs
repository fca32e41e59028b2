// ── Sync-check fan-out ──
//
// A fixed pool of workers pulls device names from a shared queue and runs
// one check-sync request each. Results land in a per-device slot keyed by
// queue position, so repeated names keep separate entries. A failing
// device never stops the others.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::join_all;
use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use ncsync_api::{CommandRunner, InventoryEntry, ManagementClient, SyncStatus};

use crate::model::{Progress, SyncResult};

/// Default number of concurrent in-flight check-sync requests.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Options for one sync-check run.
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// Overrides the engine's configured worker count.
    pub concurrency: Option<usize>,
    /// Receives one event per finished device.
    pub progress: Option<mpsc::UnboundedSender<Progress>>,
    /// Stop dispatching new checks once cancelled.
    pub cancel: CancellationToken,
}

/// Results of a fan-out, in no particular order.
#[derive(Debug)]
pub struct Collected {
    pub results: Vec<SyncResult>,
    pub elapsed: Duration,
}

/// Check every device in `devices` with at most `concurrency` requests in
/// flight.
///
/// Workers run as detached tasks: if this future is dropped, in-flight
/// checks still finish but nobody collects them.
pub async fn check_devices<R>(
    client: &ManagementClient<R>,
    devices: Vec<InventoryEntry>,
    concurrency: usize,
    progress: Option<mpsc::UnboundedSender<Progress>>,
    cancel: &CancellationToken,
) -> Collected
where
    R: CommandRunner + 'static,
{
    let started = Instant::now();
    let total = devices.len();
    if total == 0 {
        return Collected {
            results: Vec::new(),
            elapsed: started.elapsed(),
        };
    }

    let (queue_tx, queue_rx) = mpsc::unbounded_channel();
    for (slot, device) in devices.into_iter().enumerate() {
        // The receiver is alive in this scope, so sending cannot fail.
        let _ = queue_tx.send((slot, device.name));
    }
    drop(queue_tx);

    let shared = Arc::new(Shared {
        queue: Mutex::new(queue_rx),
        slots: DashMap::with_capacity(total),
        done: AtomicUsize::new(0),
        total,
        progress,
    });

    let workers = concurrency.clamp(1, total);
    debug!(total, workers, "dispatching sync checks");
    let handles: Vec<_> = (0..workers)
        .map(|id| {
            tokio::spawn(worker(
                id,
                client.clone(),
                Arc::clone(&shared),
                cancel.clone(),
            ))
        })
        .collect();

    for joined in join_all(handles).await {
        if let Err(e) = joined {
            warn!(error = %e, "sync-check worker failed");
        }
    }

    let results = shared
        .slots
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    Collected {
        results,
        elapsed: started.elapsed(),
    }
}

struct Shared {
    queue: Mutex<mpsc::UnboundedReceiver<(usize, String)>>,
    slots: DashMap<usize, SyncResult>,
    done: AtomicUsize,
    total: usize,
    progress: Option<mpsc::UnboundedSender<Progress>>,
}

async fn worker<R>(
    id: usize,
    client: ManagementClient<R>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) where
    R: CommandRunner + 'static,
{
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            item = async { shared.queue.lock().await.recv().await } => item,
        };
        let Some((slot, device)) = next else {
            break;
        };

        let started = Instant::now();
        let outcome = client.check_sync(&device).await;
        let result = to_result(device, outcome, started.elapsed());

        let done = shared.done.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(progress) = &shared.progress {
            let _ = progress.send(Progress {
                done,
                total: shared.total,
                device: result.device.clone(),
                status: result.status.clone(),
            });
        }
        shared.slots.insert(slot, result);
    }
    debug!(worker = id, "sync-check worker finished");
}

/// Map one check outcome onto the device's status.
///
/// No answer at all (timeout, refused, process failure) is `Unreachable`;
/// an answer we could not use is `Error`.
fn to_result(
    device: String,
    outcome: Result<SyncStatus, ncsync_api::Error>,
    elapsed: Duration,
) -> SyncResult {
    match outcome {
        Ok(status) => {
            if let SyncStatus::Error(detail) = &status {
                warn!(%device, %detail, "unrecognised check-sync response");
            }
            SyncResult::new(device, status, elapsed)
        }
        Err(e) if e.is_unreachable() => {
            warn!(%device, error = %e, "device check got no answer");
            SyncResult::unreachable(device, e.to_string(), elapsed)
        }
        Err(e) => {
            warn!(%device, error = %e, "device check failed");
            SyncResult::new(device, SyncStatus::Error(e.to_string()), elapsed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failures_are_unreachable() {
        let r = to_result(
            "pe-01".into(),
            Err(ncsync_api::Error::Timeout { timeout_secs: 10 }),
            Duration::ZERO,
        );
        assert_eq!(r.status, SyncStatus::Unreachable);
        assert!(r.reason.is_some_and(|s| s.contains("timed out")));
    }

    #[test]
    fn http_failures_are_errors() {
        let r = to_result(
            "pe-01".into(),
            Err(ncsync_api::Error::Http {
                status: Some(500),
                snippet: "internal".into(),
            }),
            Duration::ZERO,
        );
        assert!(matches!(r.status, SyncStatus::Error(ref d) if d.contains("500")));
    }
}
