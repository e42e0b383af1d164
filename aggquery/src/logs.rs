//! Progress logging for query runs.
//!
//! Lines go to stderr so stdout stays free for result tables. Per-metric
//! steps are indented under the run that owns them.

use std::fmt;

/// Severity of a progress line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    fn marker(self) -> &'static str {
        match self {
            LogLevel::Info => " ",
            LogLevel::Success => "✓",
            LogLevel::Warning => "⚠",
            LogLevel::Error => "✗",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.marker())
    }
}

/// One rendered line, three spaces per indent level.
pub fn format_line(level: LogLevel, message: &str, indent: u8) -> String {
    format!("{}{} {}", "   ".repeat(indent as usize), level, message)
}

pub fn log(level: LogLevel, msg: impl Into<String>, indent: u8) {
    eprintln!("{}", format_line(level, &msg.into(), indent));
}

pub fn log_info(msg: impl Into<String>) {
    log(LogLevel::Info, msg, 0);
}

pub fn log_success(msg: impl Into<String>) {
    log(LogLevel::Success, msg, 0);
}

pub fn log_warning(msg: impl Into<String>) {
    log(LogLevel::Warning, msg, 0);
}

pub fn log_error(msg: impl Into<String>) {
    log(LogLevel::Error, msg, 0);
}

pub fn log_info_indent(msg: impl Into<String>, indent: u8) {
    log(LogLevel::Info, msg, indent);
}

pub fn log_error_indent(msg: impl Into<String>, indent: u8) {
    log(LogLevel::Error, msg, indent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_line_markers() {
        assert_eq!(format_line(LogLevel::Success, "All payloads valid", 0), "✓ All payloads valid");
        assert_eq!(format_line(LogLevel::Error, "boom", 0), "✗ boom");
        assert_eq!(format_line(LogLevel::Info, "Query 1/2", 0), "  Query 1/2");
    }

    #[test]
    fn test_format_line_indent() {
        assert_eq!(format_line(LogLevel::Warning, "careful", 2), "      ⚠ careful");
    }
}
