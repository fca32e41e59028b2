// ── Engine facade ──
//
// Wires the tunnel manager, management-API client, and scheduler together
// and exposes the operations front-ends call. Targets are passed in per
// call; the engine keeps no per-target state beyond the tunnel table.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{info, warn};

use ncsync_api::{CommandRunner, InventoryEntry, ManagementClient, SystemRunner};

use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::model::{SyncReport, Target, Tunnel, TunnelState};
use crate::probe::{ProcessProbe, SystemProbe};
use crate::scheduler::{CheckOptions, check_devices};
use crate::tunnel::TunnelManager;

/// Entry point for consumers.
///
/// Cheaply cloneable; clones share the tunnel table.
pub struct Engine<P = SystemProbe, R = SystemRunner> {
    inner: Arc<EngineInner<P, R>>,
}

struct EngineInner<P, R> {
    config: EngineConfig,
    runner: Arc<R>,
    tunnels: TunnelManager<P, R>,
}

impl<P, R> Clone for Engine<P, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Engine {
    /// Engine that drives real `ssh` / `curl` processes.
    pub fn system(config: EngineConfig) -> Self {
        Self::new(config, Arc::new(SystemProbe), Arc::new(SystemRunner))
    }
}

impl<P, R> Engine<P, R>
where
    P: ProcessProbe,
    R: CommandRunner + 'static,
{
    pub fn new(config: EngineConfig, probe: Arc<P>, runner: Arc<R>) -> Self {
        let tunnels = TunnelManager::new(probe, Arc::clone(&runner), config.tunnel.clone());
        Self {
            inner: Arc::new(EngineInner {
                config,
                runner,
                tunnels,
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// API client for `target`, addressed per its reachability mode.
    pub fn client(&self, target: &Target) -> Result<ManagementClient<R>, CoreError> {
        Ok(ManagementClient::new(
            target.endpoint()?,
            self.inner.config.transport.clone(),
            Arc::clone(&self.inner.runner),
        ))
    }

    // ── Connectivity ─────────────────────────────────────────────────

    pub async fn ensure_connected(&self, target: &Target) -> Result<Tunnel, CoreError> {
        self.inner.tunnels.ensure_connected(target).await
    }

    /// Returns whether a tunnel process was terminated.
    pub async fn disconnect(&self, target: &Target) -> bool {
        self.inner.tunnels.disconnect(target).await
    }

    pub async fn tunnel_status(&self, target: &Target) -> TunnelState {
        self.inner.tunnels.status(target).await
    }

    pub async fn tunnels(&self) -> Vec<Tunnel> {
        self.inner.tunnels.tunnels().await
    }

    // ── Management API ───────────────────────────────────────────────

    /// Connect if needed, then fetch the device inventory.
    pub async fn inventory(&self, target: &Target) -> Result<Vec<InventoryEntry>, CoreError> {
        self.ensure_connected(target).await?;
        let devices = self.client(target)?.fetch_inventory().await?;
        info!(target = %target.id, devices = devices.len(), "inventory fetched");
        Ok(devices)
    }

    /// Connect if needed, then verify the API answers with a device tree.
    pub async fn test_connection(&self, target: &Target) -> Result<(), CoreError> {
        self.ensure_connected(target).await?;
        self.client(target)?.test_connection().await?;
        Ok(())
    }

    // ── Sync checks ──────────────────────────────────────────────────

    pub async fn check_all(&self, target: &Target) -> SyncReport {
        self.check_all_with(target, CheckOptions::default()).await
    }

    /// Check every device on `target`.
    ///
    /// Never fails: connectivity or inventory problems produce an
    /// incomplete report carrying the error, and per-device failures are
    /// recorded as that device's status.
    pub async fn check_all_with(&self, target: &Target, options: CheckOptions) -> SyncReport {
        let started = Instant::now();

        let devices = match self.inventory(target).await {
            Ok(devices) => devices,
            Err(e) => {
                warn!(target = %target.id, error = %e, "sync check aborted before dispatch");
                return SyncReport::aborted(&target.id, e.to_string(), started.elapsed());
            }
        };
        let client = match self.client(target) {
            Ok(client) => client,
            Err(e) => return SyncReport::aborted(&target.id, e.to_string(), started.elapsed()),
        };

        let total = devices.len();
        let concurrency = options
            .concurrency
            .unwrap_or(self.inner.config.concurrency);
        let collected = check_devices(
            &client,
            devices,
            concurrency,
            options.progress,
            &options.cancel,
        )
        .await;

        let report = SyncReport::from_results(
            &target.id,
            total,
            collected.results,
            started.elapsed(),
        );
        info!(
            target = %target.id,
            total,
            in_sync = report.counts.in_sync,
            out_of_sync = report.counts.out_of_sync,
            unreachable = report.counts.unreachable,
            error = report.counts.error,
            complete = report.complete,
            elapsed_ms = report.elapsed.as_millis(),
            "sync check finished"
        );
        report
    }
}
