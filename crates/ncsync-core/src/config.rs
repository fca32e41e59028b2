// ── Runtime engine configuration ──
//
// How the engine talks to targets: curl transport tuning, tunnel timing,
// fan-out width. Built by the CLI from the config file; core never reads
// files or the environment itself.

use ncsync_api::TransportConfig;

use crate::scheduler::DEFAULT_CONCURRENCY;
use crate::tunnel::TunnelSettings;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub transport: TransportConfig,
    pub tunnel: TunnelSettings,
    /// Concurrent check-sync requests per `check_all`.
    pub concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            tunnel: TunnelSettings::default(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}
