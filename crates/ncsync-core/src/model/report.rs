// ── Sync-check results ──

use std::time::Duration;

use serde::{Serialize, Serializer};

use ncsync_api::SyncStatus;

/// Outcome of one device's sync check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub device: String,
    #[serde(flatten)]
    pub status: SyncStatus,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
    /// Why the device was unreachable, when it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SyncResult {
    pub fn new(device: impl Into<String>, status: SyncStatus, elapsed: Duration) -> Self {
        Self {
            device: device.into(),
            status,
            elapsed,
            reason: None,
        }
    }

    pub fn unreachable(device: impl Into<String>, reason: String, elapsed: Duration) -> Self {
        Self {
            reason: Some(reason),
            ..Self::new(device, SyncStatus::Unreachable, elapsed)
        }
    }

    /// Failure text for display: the error detail or the unreachable reason.
    pub fn detail(&self) -> Option<&str> {
        match &self.status {
            SyncStatus::Error(detail) => Some(detail),
            _ => self.reason.as_deref(),
        }
    }
}

/// Per-status tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub in_sync: usize,
    pub out_of_sync: usize,
    pub unreachable: usize,
    pub error: usize,
}

impl StatusCounts {
    pub fn tally<'a>(statuses: impl IntoIterator<Item = &'a SyncStatus>) -> Self {
        let mut counts = Self::default();
        for status in statuses {
            match status {
                SyncStatus::InSync => counts.in_sync += 1,
                SyncStatus::OutOfSync => counts.out_of_sync += 1,
                SyncStatus::Unreachable => counts.unreachable += 1,
                SyncStatus::Error(_) => counts.error += 1,
            }
        }
        counts
    }

    /// Devices whose check did not produce a verdict.
    pub fn failed(&self) -> usize {
        self.unreachable + self.error
    }

    pub fn total(&self) -> usize {
        self.in_sync + self.out_of_sync + self.failed()
    }
}

/// Aggregate result of checking every device on one target.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub target_id: String,
    /// Devices in the inventory (dispatched checks).
    pub total: usize,
    pub counts: StatusCounts,
    /// Sorted by device name.
    pub results: Vec<SyncResult>,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
    /// Every dispatched device has a recorded result.
    pub complete: bool,
    /// Why the run stopped early, when it did before dispatching anything.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncReport {
    /// Build a report from whatever results were collected.
    pub fn from_results(
        target_id: impl Into<String>,
        total: usize,
        mut results: Vec<SyncResult>,
        elapsed: Duration,
    ) -> Self {
        results.sort_by(|a, b| a.device.cmp(&b.device));
        let counts = StatusCounts::tally(results.iter().map(|r| &r.status));
        Self {
            target_id: target_id.into(),
            total,
            complete: results.len() == total,
            counts,
            results,
            elapsed,
            error: None,
        }
    }

    /// Report for a run that never got as far as dispatching checks.
    pub fn aborted(target_id: impl Into<String>, error: String, elapsed: Duration) -> Self {
        Self {
            target_id: target_id.into(),
            total: 0,
            counts: StatusCounts::default(),
            results: Vec::new(),
            elapsed,
            complete: false,
            error: Some(error),
        }
    }

    /// Complete, but some devices have no verdict.
    pub fn is_partial_failure(&self) -> bool {
        self.complete && self.counts.failed() > 0
    }

    pub fn all_in_sync(&self) -> bool {
        self.complete && self.counts.in_sync == self.total
    }
}

/// One finished device check, emitted while a run is in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub done: usize,
    pub total: usize,
    pub device: String,
    pub status: SyncStatus,
}

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u128(d.as_millis())
}
