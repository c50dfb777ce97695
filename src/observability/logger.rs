//! Structured JSON logger
//!
//! One line per event. Keys after `event`, `severity` and `ts` are emitted in
//! alphabetical order so identical events always render identically.

use std::fmt;
use std::io::{self, Write};

use chrono::{SecondsFormat, Utc};

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Per-request detail
    Trace = 0,
    /// Normal operations
    Info = 1,
    /// Degraded but continuing (best-effort side writes, fallbacks)
    Warn = 2,
    /// Operation failed, process continues
    Error = 3,
    /// Startup cannot continue
    Fatal = 4,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }

    /// ERROR and FATAL go to stderr, everything else to stdout.
    fn uses_stderr(&self) -> bool {
        *self >= Severity::Error
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stateless JSON line logger
pub struct Logger;

impl Logger {
    /// Log an event with the given severity and string fields.
    pub fn log(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        let line = Self::render(severity, event, fields);
        if severity.uses_stderr() {
            Self::emit(&line, &mut io::stderr().lock());
        } else {
            Self::emit(&line, &mut io::stdout().lock());
        }
    }

    fn emit<W: Write>(line: &str, writer: &mut W) {
        // Logging must never take the server down.
        let _ = writer.write_all(line.as_bytes());
        let _ = writer.flush();
    }

    /// Render one log line, including the trailing newline.
    pub(crate) fn render(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
        let mut out = String::with_capacity(128 + fields.len() * 32);
        out.push_str("{\"event\":");
        push_json_str(&mut out, event);
        out.push_str(",\"severity\":\"");
        out.push_str(severity.as_str());
        out.push_str("\",\"ts\":\"");
        out.push_str(&Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));
        out.push('"');

        let mut sorted: Vec<&(&str, &str)> = fields.iter().collect();
        sorted.sort_by_key(|(k, _)| *k);
        for (key, value) in sorted {
            out.push(',');
            push_json_str(&mut out, key);
            out.push(':');
            push_json_str(&mut out, value);
        }

        out.push_str("}\n");
        out
    }

    pub fn trace(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Trace, event, fields);
    }

    pub fn warn(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Warn, event, fields);
    }
}

fn push_json_str(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_is_single_json_line() {
        let line = Logger::render(Severity::Info, "WRITE_COMMIT", &[("version", "12-3")]);
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);

        let parsed: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(parsed["event"], "WRITE_COMMIT");
        assert_eq!(parsed["severity"], "INFO");
        assert_eq!(parsed["version"], "12-3");
        assert!(parsed["ts"].is_string());
    }

    #[test]
    fn test_fields_sorted() {
        let line = Logger::render(Severity::Warn, "E", &[("zeta", "1"), ("alpha", "2")]);
        assert!(line.find("alpha").unwrap() < line.find("zeta").unwrap());
    }

    #[test]
    fn test_escaping() {
        let line = Logger::render(Severity::Error, "E", &[("detail", "bad \"path\"\n\u{1}")]);
        let parsed: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(parsed["detail"], "bad \"path\"\n\u{1}");
    }

    #[test]
    fn test_stream_selection() {
        assert!(!Severity::Warn.uses_stderr());
        assert!(Severity::Error.uses_stderr());
        assert!(Severity::Fatal.uses_stderr());
    }
}
