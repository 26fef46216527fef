use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Per-query scan-side counters, shared between readers and the caller.
///
/// Cloning shares the counters. These exist so callers can observe
/// reader-level effects of the optimizer (rows actually read under a
/// pushed-down limit, files skipped by partition pruning, row groups
/// skipped by statistics).
#[derive(Debug, Clone, Default)]
pub struct ScanMetrics {
    rows_read: Arc<AtomicU64>,
    files_opened: Arc<AtomicU64>,
    files_pruned: Arc<AtomicU64>,
    row_groups_pruned: Arc<AtomicU64>,
}

impl ScanMetrics {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one row emitted by a reader.
    pub fn record_row(&self) {
        self.rows_read.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a file (or remote object) opened for decoding.
    pub fn record_file_opened(&self) {
        self.files_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts files skipped by partition pruning.
    pub fn record_files_pruned(&self, n: u64) {
        self.files_pruned.fetch_add(n, Ordering::Relaxed);
    }

    /// Counts row groups skipped by statistics pruning.
    pub fn record_row_groups_pruned(&self, n: u64) {
        self.row_groups_pruned.fetch_add(n, Ordering::Relaxed);
    }

    /// Rows emitted by readers so far.
    pub fn rows_read(&self) -> u64 {
        self.rows_read.load(Ordering::Relaxed)
    }

    /// Files opened so far.
    pub fn files_opened(&self) -> u64 {
        self.files_opened.load(Ordering::Relaxed)
    }

    /// Files skipped by partition pruning.
    pub fn files_pruned(&self) -> u64 {
        self.files_pruned.load(Ordering::Relaxed)
    }

    /// Row groups skipped by statistics pruning.
    pub fn row_groups_pruned(&self) -> u64 {
        self.row_groups_pruned.load(Ordering::Relaxed)
    }
}
