//! Connectivity and sync-check engine between `ncsync-api` and front-ends.
//!
//! - **[`Engine`]**: facade exposing `ensure_connected`, `disconnect`,
//!   `tunnel_status`, `check_all`, `inventory`, `test_connection`, and
//!   `tunnels`. Cheap to clone.
//!
//! - **[`TunnelManager`]**: SSH local-forward lifecycle per target. Live
//!   state always comes from the [`ProcessProbe`]; one async mutex per local
//!   port keeps concurrent connects from spawning twice.
//!
//! - **Scheduler** ([`scheduler`]): bounded worker pool fanning one
//!   "check all" out into per-device check-sync requests.
//!
//! - **Domain model** ([`model`]): [`Target`], [`Tunnel`], [`SyncResult`],
//!   [`SyncReport`].

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod probe;
pub mod scheduler;
pub mod tunnel;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::CoreError;
pub use model::{
    Credentials, Intermediary, InventoryEntry, Progress, ReachabilityMode, StatusCounts,
    SyncReport, SyncResult, SyncStatus, Target, Tunnel, TunnelState,
};
pub use probe::{ProcessHandle, ProcessProbe, SystemProbe};
pub use scheduler::{CheckOptions, DEFAULT_CONCURRENCY};
pub use tunnel::{TunnelManager, TunnelSettings};
