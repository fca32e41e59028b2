use chrono::{DateTime, Utc};
use serde::Serialize;

use super::target::Target;

/// Lifecycle state of the tunnel for one (target, local port).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TunnelState {
    Absent,
    Connecting,
    Active,
    /// Something holds the port but it is not a healthy tunnel for this target.
    Stale,
    Terminating,
}

impl TunnelState {
    /// An operation on the port is in progress.
    pub fn is_transitional(self) -> bool {
        matches!(self, Self::Connecting | Self::Terminating)
    }
}

/// A tunnel as tracked by the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tunnel {
    pub target_id: String,
    pub local_port: u16,
    /// `None` for direct targets, and while connecting.
    pub pid: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub state: TunnelState,
}

impl Tunnel {
    pub(crate) fn new(target: &Target, pid: Option<u32>, state: TunnelState) -> Self {
        Self {
            target_id: target.id.clone(),
            local_port: target.local_port,
            pid,
            created_at: Utc::now(),
            state,
        }
    }

    /// Bypass value for direct targets: active, no process.
    pub(crate) fn direct(target: &Target) -> Self {
        Self::new(target, None, TunnelState::Active)
    }

    pub fn is_active(&self) -> bool {
        self.state == TunnelState::Active
    }
}
