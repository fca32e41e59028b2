// ── Domain model ──
//
// Targets are immutable inputs supplied per call; tunnels and reports are
// produced by the engine. Nothing here touches the OS or the network.

pub mod report;
pub mod target;
pub mod tunnel;

pub use report::{Progress, StatusCounts, SyncReport, SyncResult};
pub use target::{Credentials, Intermediary, ReachabilityMode, Target};
pub use tunnel::{Tunnel, TunnelState};

// Parser outputs are part of the domain vocabulary too.
pub use ncsync_api::{InventoryEntry, SyncStatus};
