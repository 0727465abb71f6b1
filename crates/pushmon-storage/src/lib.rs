//! Authoritative metric state for the pushmon server.
//!
//! Two backends implement [`MetricStore`]: [`memory::MemoryStore`] keeps the
//! map in memory and persists JSON snapshots, and [`sqlite::SqliteStore`]
//! delegates both state and durability to SQLite. Both reproduce the same
//! merge contract: gauges overwrite, counter deltas accumulate.

pub mod error;
pub mod memory;
pub mod sqlite;


use std::collections::HashMap;

use pushmon_common::types::Metric;

use crate::error::StorageError;

/// Metric state with type-aware merge semantics.
///
/// Implementations must be shareable across threads (`Send + Sync`) because
/// every HTTP handler reaches the store concurrently; each backend serializes
/// its own mutations (a mutex for the memory map, transactions for SQLite).
pub trait MetricStore: Send + Sync {
    /// Returns the stored metric with the given id, if any.
    fn get(&self, id: &str) -> Option<Metric>;

    /// Returns a copy of the entire id → metric mapping.
    fn get_all(&self) -> HashMap<String, Metric>;

    /// Merges one metric: a gauge replaces the stored value, a counter delta
    /// is added to the stored total (or stored verbatim when absent).
    fn set(&self, metric: Metric) -> Result<(), StorageError>;

    /// Merges a whole batch atomically: readers and the durability backend
    /// never observe a half-applied batch.
    fn set_all(&self, batch: &[Metric]) -> Result<(), StorageError>;

    /// Removes the metric with the given id; an absent id is not an error.
    fn delete(&self, id: &str) -> Result<(), StorageError>;

    /// Reports whether the durability backend is reachable.
    fn ping(&self) -> Result<(), StorageError>;

    /// Flushes current state to the durability backend.
    fn save(&self) -> Result<(), StorageError>;
}
