//! Lifecycle events
//!
//! Every log line the server emits carries one of these names.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Boot & lifecycle
    BootStart,
    StorageSelected,
    StorageBootstrapped,
    StorageInitFailed,
    Serving,
    ShutdownStart,
    ShutdownComplete,

    // Writes
    WriteCommit,
    WriteConflict,
    WriteFailed,

    // Best-effort side writes
    BackupCopyFailed,
    AtomicRenameFallback,
    UnusableDocumentPreserved,

    // Utilities
    MigrationComplete,

    // Request boundary
    RequestFailed,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::BootStart => "BOOT_START",
            Event::StorageSelected => "STORAGE_SELECTED",
            Event::StorageBootstrapped => "STORAGE_BOOTSTRAPPED",
            Event::StorageInitFailed => "STORAGE_INIT_FAILED",
            Event::Serving => "SERVING",
            Event::ShutdownStart => "SHUTDOWN_START",
            Event::ShutdownComplete => "SHUTDOWN_COMPLETE",
            Event::WriteCommit => "WRITE_COMMIT",
            Event::WriteConflict => "WRITE_CONFLICT",
            Event::WriteFailed => "WRITE_FAILED",
            Event::BackupCopyFailed => "BACKUP_COPY_FAILED",
            Event::AtomicRenameFallback => "ATOMIC_RENAME_FALLBACK",
            Event::UnusableDocumentPreserved => "UNUSABLE_DOCUMENT_PRESERVED",
            Event::MigrationComplete => "MIGRATION_COMPLETE",
            Event::RequestFailed => "REQUEST_FAILED",
        }
    }

    /// Fatal events abort startup.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::StorageInitFailed)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_init_failure_is_fatal() {
        assert!(Event::StorageInitFailed.is_fatal());
        assert!(!Event::WriteFailed.is_fatal());
        assert!(!Event::BackupCopyFailed.is_fatal());
    }

    #[test]
    fn test_names() {
        assert_eq!(Event::WriteCommit.to_string(), "WRITE_COMMIT");
        assert_eq!(Event::AtomicRenameFallback.as_str(), "ATOMIC_RENAME_FALLBACK");
    }
}
