//! Observability for tabvault
//!
//! - Structured JSON logging (`Logger`)
//! - Typed lifecycle events (`Event`)
//! - Atomic counters (`MetricsRegistry`)
//!
//! Observability is side-effect free with respect to storage: a failing log
//! write is dropped, never propagated.
//!
//! ```ignore
//! use tabvault::observability::{log_event_with_fields, Event};
//!
//! log_event_with_fields(Event::WriteCommit, &[("version", "1718000000000-4")]);
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};

/// Log a lifecycle event at its default severity.
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Log a lifecycle event with fields at its default severity.
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(default_severity(event), event.as_str(), fields);
}

fn default_severity(event: Event) -> Severity {
    match event {
        e if e.is_fatal() => Severity::Fatal,
        Event::WriteFailed | Event::RequestFailed => Severity::Error,
        Event::WriteConflict
        | Event::BackupCopyFailed
        | Event::AtomicRenameFallback
        | Event::UnusableDocumentPreserved => Severity::Warn,
        _ => Severity::Info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_severity() {
        assert_eq!(default_severity(Event::StorageInitFailed), Severity::Fatal);
        assert_eq!(default_severity(Event::WriteFailed), Severity::Error);
        assert_eq!(default_severity(Event::BackupCopyFailed), Severity::Warn);
        assert_eq!(
            default_severity(Event::UnusableDocumentPreserved),
            Severity::Warn
        );
        assert_eq!(default_severity(Event::WriteCommit), Severity::Info);
    }

    #[test]
    fn test_log_event_does_not_panic() {
        log_event(Event::BootStart);
        log_event_with_fields(Event::StorageSelected, &[("storage", "json-file")]);
    }
}
