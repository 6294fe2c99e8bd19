// ⚠️ Renewal Errors - Typed failures of the date/cadence core
//
// The core never fails for expected data-quality problems in a way that
// escapes the record boundary: InvalidDate becomes "unknown", an
// unrecognized cadence becomes monthly. Only AdvancementCapExceeded is
// surfaced to callers as a distinct, reviewable condition.

use crate::calendar::CalendarDate;
use thiserror::Error;

/// Result type alias for the renewal core.
pub type Result<T> = std::result::Result<T, RenewalError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenewalError {
    /// Input string is not a parseable calendar date.
    ///
    /// Callers exclude the record from date-dependent views instead of
    /// failing the whole request.
    #[error("invalid calendar date: {0:?}")]
    InvalidDate(String),

    /// Cadence string does not match any known spelling.
    ///
    /// Only returned by the strict `FromStr` parser; the lenient boundary
    /// falls back to monthly and logs instead.
    #[error("unrecognized billing cadence: {0:?}")]
    UnrecognizedCadence(String),

    /// The advancement loop hit its step cap before reaching today.
    ///
    /// The record should be flagged for manual review; no date is returned.
    #[error("renewal from {anchor} did not reach {today} within {steps} steps")]
    AdvancementCapExceeded {
        anchor: CalendarDate,
        today: CalendarDate,
        steps: u32,
    },

    /// A custom cadence was built with an interval of zero.
    #[error("custom cadence interval must be at least 1, got {0}")]
    InvalidInterval(u64),

    /// Date arithmetic left the representable calendar range.
    #[error("date arithmetic out of range: {0}")]
    DateOutOfRange(String),
}

impl RenewalError {
    /// True for conditions that mean "this record needs a human look".
    pub fn needs_review(&self) -> bool {
        matches!(
            self,
            RenewalError::AdvancementCapExceeded { .. } | RenewalError::DateOutOfRange(_)
        )
    }
}
