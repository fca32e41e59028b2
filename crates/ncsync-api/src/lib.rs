// ncsync-api: RESTCONF client for NSO-style management APIs.
//
// HTTP goes through an external process (curl) behind the `CommandRunner`
// seam; this crate owns argv construction, exit-status classification, and
// the tolerant inventory / check-sync parsers.

pub mod client;
pub mod error;
pub mod model;
pub mod parse;
pub mod restconf;
pub mod runner;
pub mod transport;

pub use client::{ApiEndpoint, ApiResponse, Delivery, ManagementClient, Method, classify};
pub use error::Error;
pub use model::{InventoryEntry, SyncStatus};
pub use parse::{parse_device_list, parse_sync_status};
pub use runner::{CommandRunner, ProcessOutput, SystemRunner};
pub use transport::{TlsMode, TransportConfig};
