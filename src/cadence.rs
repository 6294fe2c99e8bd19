// 🔁 Billing Cadence - Closed set of renewal periods + the one step rule
//
// Persisted rows carry the cycle as free text ("weekly", "every_3_months",
// "Annual", ...). It is parsed into a BillingCadence exactly once, here;
// everything downstream matches on the enum. Unknown text becomes Monthly.

use crate::calendar::CalendarDate;
use crate::error::{RenewalError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

// ============================================================================
// CADENCE UNIT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CadenceUnit {
    Days,
    Months,
    Years,
}

impl CadenceUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            CadenceUnit::Days => "days",
            CadenceUnit::Months => "months",
            CadenceUnit::Years => "years",
        }
    }
}

// ============================================================================
// BILLING CADENCE
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BillingCadence {
    /// Every 7 days
    Weekly,

    /// Every 14 days
    Biweekly,

    /// +1 calendar month (clamped at month end)
    #[default]
    Monthly,

    /// +3 calendar months
    Quarterly,

    /// +6 calendar months
    Semiannual,

    /// +1 calendar year (Feb 29 → Feb 28)
    Yearly,

    /// +n of the given unit
    Custom { n: NonZeroU32, unit: CadenceUnit },
}

/// Outcome of the lenient parse at the persistence boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedCadence {
    pub cadence: BillingCadence,

    /// False when the monthly fallback was applied
    pub recognized: bool,
}

impl BillingCadence {
    /// Custom interval; `n == 0` is rejected.
    pub fn custom(n: u32, unit: CadenceUnit) -> Result<Self> {
        NonZeroU32::new(n)
            .map(|n| BillingCadence::Custom { n, unit })
            .ok_or(RenewalError::InvalidInterval(u64::from(n)))
    }

    /// Lenient parse of a persisted cycle string.
    ///
    /// Missing or unknown text falls back to Monthly; the miss is logged as a
    /// data-quality signal rather than returned as an error.
    pub fn parse(raw: Option<&str>) -> ParsedCadence {
        let text = raw.map(str::trim).unwrap_or_default();
        if text.is_empty() {
            tracing::debug!("missing billing cycle, defaulting to monthly");
            return ParsedCadence { cadence: BillingCadence::Monthly, recognized: false };
        }

        match text.parse::<BillingCadence>() {
            Ok(cadence) => ParsedCadence { cadence, recognized: true },
            Err(err) => {
                tracing::warn!(billing_cycle = text, error = %err, "unrecognized billing cycle, defaulting to monthly");
                ParsedCadence { cadence: BillingCadence::Monthly, recognized: false }
            }
        }
    }

    /// Length in days when every period is the same number of days.
    ///
    /// Month- and year-based cadences return None: their length depends on
    /// where in the calendar they start.
    pub fn fixed_days(&self) -> Option<i64> {
        match self {
            BillingCadence::Weekly => Some(7),
            BillingCadence::Biweekly => Some(14),
            BillingCadence::Custom { n, unit: CadenceUnit::Days } => Some(i64::from(n.get())),
            _ => None,
        }
    }

    /// Human label for dashboards and reminder text.
    pub fn label(&self) -> String {
        match self {
            BillingCadence::Weekly => "Weekly".to_string(),
            BillingCadence::Biweekly => "Every 2 weeks".to_string(),
            BillingCadence::Monthly => "Monthly".to_string(),
            BillingCadence::Quarterly => "Every 3 months".to_string(),
            BillingCadence::Semiannual => "Every 6 months".to_string(),
            BillingCadence::Yearly => "Yearly".to_string(),
            BillingCadence::Custom { n, unit } => format!("Every {} {}", n, unit.as_str()),
        }
    }
}

/// Advance `date` by exactly one period of `cadence`.
///
/// Every consumer (projector, schedule preview, forecast, reminders) steps
/// through this function.
pub fn step_once(date: CalendarDate, cadence: BillingCadence) -> Result<CalendarDate> {
    match cadence {
        BillingCadence::Weekly => date.add_days(7),
        BillingCadence::Biweekly => date.add_days(14),
        BillingCadence::Monthly => date.add_months(1),
        BillingCadence::Quarterly => date.add_months(3),
        BillingCadence::Semiannual => date.add_months(6),
        BillingCadence::Yearly => date.add_years(1),
        BillingCadence::Custom { n, unit } => match unit {
            CadenceUnit::Days => date.add_days(i64::from(n.get())),
            CadenceUnit::Months => date.add_months(interval_i32(n)?),
            CadenceUnit::Years => date.add_years(interval_i32(n)?),
        },
    }
}

fn interval_i32(n: NonZeroU32) -> Result<i32> {
    i32::try_from(n.get()).map_err(|_| RenewalError::DateOutOfRange(format!("interval {n} too large")))
}

// ============================================================================
// TEXT FORM
// ============================================================================

impl fmt::Display for BillingCadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BillingCadence::Weekly => f.write_str("weekly"),
            BillingCadence::Biweekly => f.write_str("biweekly"),
            BillingCadence::Monthly => f.write_str("monthly"),
            BillingCadence::Quarterly => f.write_str("quarterly"),
            BillingCadence::Semiannual => f.write_str("semiannual"),
            BillingCadence::Yearly => f.write_str("yearly"),
            BillingCadence::Custom { n, unit } => write!(f, "custom:{}:{}", n, unit.as_str()),
        }
    }
}

/// Strict parse: unknown text is `UnrecognizedCadence`.
impl FromStr for BillingCadence {
    type Err = RenewalError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");

        let named = match key.as_str() {
            "weekly" | "week" | "every_week" => Some(BillingCadence::Weekly),
            "biweekly" | "bi_weekly" | "fortnightly" | "every_2_weeks" | "2_weeks" => Some(BillingCadence::Biweekly),
            "monthly" | "month" | "every_month" => Some(BillingCadence::Monthly),
            "quarterly" | "every_3_months" | "3_months" => Some(BillingCadence::Quarterly),
            "semiannual" | "semiannually" | "semi_annual" | "semi_annually" | "half_yearly" | "every_6_months"
            | "6_months" => Some(BillingCadence::Semiannual),
            "yearly" | "year" | "annual" | "annually" | "every_year" => Some(BillingCadence::Yearly),
            _ => None,
        };
        if let Some(cadence) = named {
            return Ok(cadence);
        }

        // custom:<n>:<unit> or [every_]<n>_<unit>
        let parts = match key.strip_prefix("custom:") {
            Some(rest) => rest.split_once(':'),
            None => key.strip_prefix("every_").unwrap_or(&key).split_once('_'),
        };
        let (count, unit) = parts.ok_or_else(|| RenewalError::UnrecognizedCadence(s.to_string()))?;

        let count: u32 = count
            .parse()
            .map_err(|_| RenewalError::UnrecognizedCadence(s.to_string()))?;

        match unit {
            "day" | "days" | "d" => BillingCadence::custom(count, CadenceUnit::Days),
            "week" | "weeks" | "w" => {
                let days = count
                    .checked_mul(7)
                    .ok_or_else(|| RenewalError::UnrecognizedCadence(s.to_string()))?;
                BillingCadence::custom(days, CadenceUnit::Days)
            }
            "month" | "months" | "mo" => BillingCadence::custom(count, CadenceUnit::Months),
            "year" | "years" | "y" | "yr" | "yrs" => BillingCadence::custom(count, CadenceUnit::Years),
            _ => Err(RenewalError::UnrecognizedCadence(s.to_string())),
        }
    }
}
