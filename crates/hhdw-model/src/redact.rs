//! Masking of row-level values in log output.
//!
//! Natural keys and free-text cells carry patient identifiers. Every event
//! that logs one wraps it in [`Redacted`], which prints [`REDACTED_VALUE`]
//! until the process opts in with [`set_log_data`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

static LOG_DATA_ENABLED: AtomicBool = AtomicBool::new(false);

/// Placeholder used when row-level logging is disabled.
pub const REDACTED_VALUE: &str = "[REDACTED]";

/// Enables or disables row-level values in log output for the whole process.
pub fn set_log_data(enabled: bool) {
    LOG_DATA_ENABLED.store(enabled, Ordering::Release);
}

/// Returns true if row-level logging is explicitly enabled.
pub fn log_data_enabled() -> bool {
    LOG_DATA_ENABLED.load(Ordering::Acquire)
}

/// Returns the input value when row-level logging is enabled, otherwise a
/// redacted token.
pub fn redact_value(value: &str) -> &str {
    if log_data_enabled() {
        value
    } else {
        REDACTED_VALUE
    }
}

/// Display wrapper for values that must not reach logs by default.
///
/// ```
/// use hhdw_model::Redacted;
///
/// assert_eq!(Redacted("1001").to_string(), "[REDACTED]");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Redacted<T>(pub T);

impl<T: fmt::Display> fmt::Display for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if log_data_enabled() {
            self.0.fmt(f)
        } else {
            f.write_str(REDACTED_VALUE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_show_only_when_enabled() {
        assert_eq!(redact_value("1001"), REDACTED_VALUE);
        assert_eq!(Redacted("ANA PEREZ").to_string(), REDACTED_VALUE);

        set_log_data(true);
        let shown = Redacted("ANA PEREZ").to_string();
        let raw = redact_value("1001").to_string();
        set_log_data(false);

        assert_eq!(shown, "ANA PEREZ");
        assert_eq!(raw, "1001");
        assert_eq!(redact_value("1001"), REDACTED_VALUE);
    }
}
