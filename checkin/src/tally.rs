//! Session bookkeeping: scan rate, recent activity and totals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

use crate::types::{OutcomeKind, ScanRecord};

/// Which completed scans count toward the scan rate
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RatePolicy {
    /// Every completed scan
    #[default]
    AllOutcomes,
    /// Only accepted tickets
    AcceptedOnly,
}

impl RatePolicy {
    /// Whether a scan of `kind` enters the rate window
    #[must_use]
    pub const fn counts(self, kind: OutcomeKind) -> bool {
        match self {
            Self::AllOutcomes => true,
            Self::AcceptedOnly => matches!(kind, OutcomeKind::Valid),
        }
    }
}

/// Sliding window of scan completion times
///
/// An entry recorded at `t` is still counted at `now` iff `t > now - window`.
#[derive(Clone, Debug)]
pub struct ScanRateWindow {
    window: chrono::Duration,
    entries: VecDeque<DateTime<Utc>>,
}

impl ScanRateWindow {
    /// Creates an empty window of the given length
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window: chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX),
            entries: VecDeque::new(),
        }
    }

    /// Record a completion at `at`
    pub fn record(&mut self, at: DateTime<Utc>) {
        self.entries.push_back(at);
    }

    /// Drop expired entries, then count the rest
    pub fn current_rate(&mut self, now: DateTime<Utc>) -> usize {
        if let Some(cutoff) = now.checked_sub_signed(self.window) {
            self.entries.retain(|at| *at > cutoff);
        }
        self.entries.len()
    }

    /// Entries currently held, expired or not
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the window holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Bounded recent-activity list, newest first
#[derive(Clone, Debug)]
pub struct RecentScans {
    capacity: usize,
    records: VecDeque<ScanRecord>,
}

impl RecentScans {
    /// Creates an empty list holding at most `capacity` records
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: VecDeque::with_capacity(capacity),
        }
    }

    /// Prepend a record, evicting the oldest beyond capacity
    pub fn push(&mut self, record: ScanRecord) {
        self.records.push_front(record);
        self.records.truncate(self.capacity);
    }

    /// Records, newest first
    pub fn iter(&self) -> impl Iterator<Item = &ScanRecord> {
        self.records.iter()
    }

    /// Snapshot of the records, newest first
    #[must_use]
    pub fn to_vec(&self) -> Vec<ScanRecord> {
        self.records.iter().cloned().collect()
    }

    /// Number of records held
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the list is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Forget every record
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

/// Per-session totals
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanTally {
    /// Completed scans
    pub total: u64,
    /// Accepted tickets
    pub valid: u64,
    /// Already-used tickets
    pub duplicate: u64,
    /// Everything else
    pub invalid: u64,
}

impl ScanTally {
    /// Count one completed scan
    pub const fn record(&mut self, kind: OutcomeKind) {
        self.total += 1;
        match kind {
            OutcomeKind::Valid => self.valid += 1,
            OutcomeKind::Duplicate => self.duplicate += 1,
            OutcomeKind::Invalid => self.invalid += 1,
        }
    }
}
