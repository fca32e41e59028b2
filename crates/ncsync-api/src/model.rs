// Values produced by parsing management-API responses.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One device listed by the inventory query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub name: String,
}

impl InventoryEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Configuration-synchronization status of a single device.
///
/// The parser only ever yields `InSync`, `OutOfSync`, or `Error`;
/// `Unreachable` is assigned by the scheduler when the request itself
/// never got an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "kebab-case")]
pub enum SyncStatus {
    InSync,
    OutOfSync,
    Unreachable,
    Error(String),
}

impl SyncStatus {
    /// Short machine-friendly label (`in-sync`, `out-of-sync`, ...).
    pub fn label(&self) -> &'static str {
        match self {
            Self::InSync => "in-sync",
            Self::OutOfSync => "out-of-sync",
            Self::Unreachable => "unreachable",
            Self::Error(_) => "error",
        }
    }

    /// `true` when the device answered with a definite sync verdict.
    pub fn is_verdict(&self) -> bool {
        matches!(self, Self::InSync | Self::OutOfSync)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(detail) => write!(f, "error: {detail}"),
            other => f.write_str(other.label()),
        }
    }
}
