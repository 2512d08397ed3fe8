//! Probing observability counters.
//!
//! Process-local totals updated once per driver round, not per row.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Snapshot of the probing counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct HashProbeMetricsSnapshot {
    /// Chain-walking rounds executed by all drivers.
    pub colhash_probe_rounds_total: u64,
    /// Rows compared against a candidate, summed over rounds.
    pub colhash_rows_checked_total: u64,
    /// Build rows spliced into duplicate chains.
    pub colhash_chain_links_total: u64,
    /// Probe rows found absent from the build side.
    pub colhash_distinct_rows_total: u64,
    /// Rows emitted by selection compaction.
    pub colhash_compacted_rows_total: u64,
}

static PROBE_ROUNDS_TOTAL: AtomicU64 = AtomicU64::new(0);
static ROWS_CHECKED_TOTAL: AtomicU64 = AtomicU64::new(0);
static CHAIN_LINKS_TOTAL: AtomicU64 = AtomicU64::new(0);
static DISTINCT_ROWS_TOTAL: AtomicU64 = AtomicU64::new(0);
static COMPACTED_ROWS_TOTAL: AtomicU64 = AtomicU64::new(0);

fn add(counter: &AtomicU64, n: usize) {
    counter.fetch_add(u64::try_from(n).unwrap_or(u64::MAX), Ordering::Relaxed);
}

pub(crate) fn record_round(rows_checked: usize) {
    PROBE_ROUNDS_TOTAL.fetch_add(1, Ordering::Relaxed);
    add(&ROWS_CHECKED_TOTAL, rows_checked);
}

pub(crate) fn record_chain_links(links: usize) {
    add(&CHAIN_LINKS_TOTAL, links);
}

pub(crate) fn record_distinct_rows(rows: usize) {
    add(&DISTINCT_ROWS_TOTAL, rows);
}

pub(crate) fn record_compacted_rows(rows: usize) {
    add(&COMPACTED_ROWS_TOTAL, rows);
}

/// Return a snapshot of the probing counters.
#[must_use]
pub fn hash_probe_metrics_snapshot() -> HashProbeMetricsSnapshot {
    HashProbeMetricsSnapshot {
        colhash_probe_rounds_total: PROBE_ROUNDS_TOTAL.load(Ordering::Relaxed),
        colhash_rows_checked_total: ROWS_CHECKED_TOTAL.load(Ordering::Relaxed),
        colhash_chain_links_total: CHAIN_LINKS_TOTAL.load(Ordering::Relaxed),
        colhash_distinct_rows_total: DISTINCT_ROWS_TOTAL.load(Ordering::Relaxed),
        colhash_compacted_rows_total: COMPACTED_ROWS_TOTAL.load(Ordering::Relaxed),
    }
}

/// Reset all probing counters.
pub fn reset_hash_probe_metrics() {
    PROBE_ROUNDS_TOTAL.store(0, Ordering::Relaxed);
    ROWS_CHECKED_TOTAL.store(0, Ordering::Relaxed);
    CHAIN_LINKS_TOTAL.store(0, Ordering::Relaxed);
    DISTINCT_ROWS_TOTAL.store(0, Ordering::Relaxed);
    COMPACTED_ROWS_TOTAL.store(0, Ordering::Relaxed);
}
