// 📥 CSV Importer - Tracked subscriptions from a spreadsheet export
//
// This is the input-validation boundary: amounts must be positive and
// finite, currencies are upper-cased, dates must parse. Rows that fail are
// reported and skipped; an unrecognized billing cycle is kept as-is (it
// projects as monthly) and only flagged.

use crate::cadence::BillingCadence;
use crate::calendar::parse_calendar_date;
use crate::db::{TrackedSubscription, STATUS_ACTIVE, STATUS_CANCELLED};
use anyhow::{Context, Result};
use chrono::Utc;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

const DEFAULT_CURRENCY: &str = "USD";

/// One CSV row as exported; most columns optional.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportRow {
    #[serde(alias = "vendor", alias = "merchant")]
    pub merchant_name: String,

    #[serde(default)]
    pub plan_name: Option<String>,

    pub amount: String,

    #[serde(default)]
    pub currency: Option<String>,

    #[serde(alias = "start_date")]
    pub renewal_date: String,

    #[serde(default)]
    pub billing_cycle: Option<String>,

    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectedRow {
    /// 1-based data line (header excluded)
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct ImportReport {
    pub subscriptions: Vec<TrackedSubscription>,
    pub rejected: Vec<RejectedRow>,

    /// Lines whose billing cycle fell back to monthly
    pub unrecognized_cycles: Vec<usize>,
}

pub fn load_csv(csv_path: &Path) -> Result<ImportReport> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("Failed to open CSV file: {:?}", csv_path))?;
    read_csv(file)
}

pub fn read_csv<R: Read>(reader: R) -> Result<ImportReport> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut report = ImportReport::default();

    for (index, result) in rdr.deserialize::<ImportRow>().enumerate() {
        let line = index + 1;
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                report.rejected.push(RejectedRow { line, reason: format!("unreadable row: {e}") });
                continue;
            }
        };

        match validate_row(&row) {
            Ok((subscription, recognized)) => {
                if !recognized {
                    report.unrecognized_cycles.push(line);
                }
                report.subscriptions.push(subscription);
            }
            Err(reason) => {
                tracing::warn!(line, %reason, "rejected import row");
                report.rejected.push(RejectedRow { line, reason });
            }
        }
    }

    tracing::info!(
        accepted = report.subscriptions.len(),
        rejected = report.rejected.len(),
        unrecognized_cycles = report.unrecognized_cycles.len(),
        "csv import parsed"
    );

    Ok(report)
}

/// Coerce a raw row into a subscription. The bool is false when the
/// billing cycle fell back to monthly.
pub fn validate_row(row: &ImportRow) -> std::result::Result<(TrackedSubscription, bool), String> {
    let merchant = row.merchant_name.trim();
    if merchant.is_empty() {
        return Err("missing merchant_name".to_string());
    }

    let amount = parse_amount(&row.amount)?;
    if amount <= Decimal::ZERO {
        return Err(format!("amount must be positive, got {}", row.amount.trim()));
    }

    let currency = row
        .currency
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(DEFAULT_CURRENCY)
        .to_uppercase();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(format!("invalid currency code {currency:?}"));
    }

    let renewal_date = parse_calendar_date(&row.renewal_date).map_err(|e| e.to_string())?;

    let parsed = BillingCadence::parse(row.billing_cycle.as_deref());
    let billing_cycle = if parsed.recognized {
        Some(parsed.cadence.to_string())
    } else {
        // Keep legacy text; projection treats it as monthly
        row.billing_cycle
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_lowercase)
    };

    let mut sub = TrackedSubscription::new(
        merchant,
        amount,
        &currency,
        &renewal_date.to_string(),
        billing_cycle.as_deref(),
    );
    sub.plan_name = non_empty(row.plan_name.as_deref());
    sub.notes = non_empty(row.notes.as_deref());

    let cancelled = row
        .status
        .as_deref()
        .is_some_and(|s| s.trim().eq_ignore_ascii_case(STATUS_CANCELLED));
    if cancelled {
        sub.status = STATUS_CANCELLED.to_string();
        sub.cancelled_at = Some(Utc::now());
    } else {
        sub.status = STATUS_ACTIVE.to_string();
    }

    sub.metadata.insert("imported_at".to_string(), serde_json::json!(Utc::now().to_rfc3339()));

    Ok((sub, parsed.recognized))
}

/// "$1,299.00" → 1299.00; NaN / inf / garbage rejected.
fn parse_amount(raw: &str) -> std::result::Result<Decimal, String> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | ',' | ' '))
        .collect();

    if cleaned.is_empty() {
        return Err("missing amount".to_string());
    }

    if let Ok(amount) = Decimal::from_str(&cleaned) {
        return Ok(amount);
    }

    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .and_then(Decimal::from_f64)
        .ok_or_else(|| format!("invalid amount {:?}", raw.trim()))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cadence::CadenceUnit;

    const CSV: &str = "\
merchant_name,plan_name,amount,currency,renewal_date,billing_cycle,status,notes
Netflix,Standard,15.49,usd,2025-01-05,monthly,active,
Spotify,,$10.99,USD,2025-01-12,every_2_weeks,,family
Gym,,30,EUR,2024-12-01,every_10_days,,
Old Thing,,5,USD,2024-01-01,hourly,,
Cancelled Co,,9.99,USD,2024-06-01,monthly,cancelled,
,,9.99,USD,2025-01-01,monthly,,
Negative,,-3,USD,2025-01-01,monthly,,
Broken Date,,3,USD,2025-02-30,monthly,,
Weird Amount,,NaN,USD,2025-01-01,monthly,,
";

    #[test]
    fn test_read_csv_accepts_and_rejects() {
        let report = read_csv(CSV.as_bytes()).unwrap();

        let names: Vec<&str> = report.subscriptions.iter().map(|s| s.merchant_name.as_str()).collect();
        assert_eq!(names, vec!["Netflix", "Spotify", "Gym", "Old Thing", "Cancelled Co"]);

        let rejected_lines: Vec<usize> = report.rejected.iter().map(|r| r.line).collect();
        assert_eq!(rejected_lines, vec![6, 7, 8, 9]);

        assert_eq!(report.unrecognized_cycles, vec![4]);
    }

    #[test]
    fn test_row_normalization() {
        let report = read_csv(CSV.as_bytes()).unwrap();

        let netflix = &report.subscriptions[0];
        assert_eq!(netflix.currency, "USD");
        assert_eq!(netflix.plan_name.as_deref(), Some("Standard"));
        assert_eq!(netflix.amount, Decimal::new(1549, 2));
        assert!(netflix.notes.is_none());

        let spotify = &report.subscriptions[1];
        assert_eq!(spotify.amount, Decimal::new(1099, 2));
        assert_eq!(spotify.billing_cycle.as_deref(), Some("biweekly"));
        assert_eq!(spotify.notes.as_deref(), Some("family"));

        let gym = &report.subscriptions[2];
        assert_eq!(gym.cadence(), BillingCadence::custom(10, CadenceUnit::Days).unwrap());

        let old = &report.subscriptions[3];
        assert_eq!(old.billing_cycle.as_deref(), Some("hourly"));
        assert_eq!(old.cadence(), BillingCadence::Monthly);

        assert!(report.subscriptions[4].is_cancelled());
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("$1,299.00").unwrap(), Decimal::new(129900, 2));
        assert_eq!(parse_amount(" 7 ").unwrap(), Decimal::from(7));
        assert!(parse_amount("").is_err());
        assert!(parse_amount("inf").is_err());
        assert!(parse_amount("abc").is_err());
    }

    #[test]
    fn test_vendor_alias_and_default_currency() {
        let csv = "vendor,amount,start_date\nFigma,12,03/15/2025\n";
        let report = read_csv(csv.as_bytes()).unwrap();

        assert_eq!(report.subscriptions.len(), 1);
        let figma = &report.subscriptions[0];
        assert_eq!(figma.merchant_name, "Figma");
        assert_eq!(figma.currency, "USD");
        assert_eq!(figma.renewal_date, "2025-03-15");
        assert!(figma.billing_cycle.is_none());
        assert_eq!(report.unrecognized_cycles, vec![1]);
    }
}
