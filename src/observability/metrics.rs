//! Process-lifetime counters
//!
//! Counters only, monotonic, reset on restart. Relaxed ordering is enough:
//! nothing synchronizes on these values.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    writes_committed: AtomicU64,
    write_conflicts: AtomicU64,
    writes_failed: AtomicU64,
    snapshots_created: AtomicU64,
    backup_copy_failures: AtomicU64,
    atomic_rename_fallbacks: AtomicU64,
    unusable_documents_preserved: AtomicU64,
    heartbeats: AtomicU64,
}

/// Point-in-time copy of every counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub writes_committed: u64,
    pub write_conflicts: u64,
    pub writes_failed: u64,
    pub snapshots_created: u64,
    pub backup_copy_failures: u64,
    pub atomic_rename_fallbacks: u64,
    pub unusable_documents_preserved: u64,
    pub heartbeats: u64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_writes_committed(&self) {
        self.writes_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_write_conflicts(&self) {
        self.write_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_writes_failed(&self) {
        self.writes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_snapshots(&self) {
        self.snapshots_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_backup_copy_failures(&self) {
        self.backup_copy_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_atomic_rename_fallbacks(&self) {
        self.atomic_rename_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_unusable_documents_preserved(&self) {
        self.unusable_documents_preserved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_heartbeats(&self) {
        self.heartbeats.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            writes_committed: self.writes_committed.load(Ordering::Relaxed),
            write_conflicts: self.write_conflicts.load(Ordering::Relaxed),
            writes_failed: self.writes_failed.load(Ordering::Relaxed),
            snapshots_created: self.snapshots_created.load(Ordering::Relaxed),
            backup_copy_failures: self.backup_copy_failures.load(Ordering::Relaxed),
            atomic_rename_fallbacks: self.atomic_rename_fallbacks.load(Ordering::Relaxed),
            unusable_documents_preserved: self
                .unusable_documents_preserved
                .load(Ordering::Relaxed),
            heartbeats: self.heartbeats.load(Ordering::Relaxed),
        }
    }
}
