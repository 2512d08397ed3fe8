//! Vectorized probing core of a columnar hash table.
//!
//! A [`HashTable`] buffers one build batch and links its rows into bucket
//! chains.  Probe batches are resolved a chain link at a time: every pending
//! row is compared against its current candidate one key column at a time
//! ([`column_check`]), a resolver turns the per-column results into row
//! decisions ([`resolve`], [`HashTable::check_build_for_distinct`]), and
//! the surviving rows advance to their next candidate.  The drivers in
//! [`probe`] run that loop for joins, first-match lookups, batch dedup and
//! build-absence checks; [`ProbeScratch::update_sel`] compacts a batch down
//! to one row per match group.

pub mod chain;
pub mod column_check;
pub mod compact;
pub mod config;
pub mod distinct;
pub mod error;
pub mod metrics;
pub mod probe;
pub mod resolve;
pub mod scratch;
pub mod table;

pub use chain::{BucketChains, hash_key_columns};
pub use column_check::{check_col, check_col_for_distinct, keys_equal_at};
pub use config::HashTableConfig;
pub use distinct::first_duplicate;
pub use error::{HashTableError, Result};
pub use metrics::{HashProbeMetricsSnapshot, hash_probe_metrics_snapshot, reset_hash_probe_metrics};
pub use resolve::{SameLinks, resolve_rows, select_next_links};
pub use scratch::{ProbeRows, ProbeScratch};
pub use table::HashTable;
