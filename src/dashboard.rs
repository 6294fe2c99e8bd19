// 📊 Dashboard Aggregation - Status buckets, payment forecast, spend totals
//
// Everything here is derived from stored rows + an explicit "today"; the
// effective renewal comes from the projector, amounts from the normalizer.

use crate::calendar::{parse_calendar_date, CalendarDate};
use crate::cadence::BillingCadence;
use crate::db::TrackedSubscription;
use crate::error::Result;
use crate::normalizer::SpendTotals;
use crate::projector::renewals_within;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// RENEWAL STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenewalStatus {
    /// Next renewal beyond the renews-soon window
    Active,

    /// Next renewal within the window (today included)
    RenewsSoon,

    /// Cancelled and its last paid-through date has passed
    Expired,

    /// Cancelled but still paid through today or later
    Cancelled,

    /// Stored renewal date could not be parsed
    Invalid,

    /// Projection hit the step cap or left the calendar range
    NeedsReview,
}

impl RenewalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenewalStatus::Active => "active",
            RenewalStatus::RenewsSoon => "renews_soon",
            RenewalStatus::Expired => "expired",
            RenewalStatus::Cancelled => "cancelled",
            RenewalStatus::Invalid => "invalid",
            RenewalStatus::NeedsReview => "needs_review",
        }
    }
}

/// A stored subscription with its derived, as-of-today fields.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionView {
    #[serde(flatten)]
    pub subscription: TrackedSubscription,

    pub cadence: BillingCadence,
    pub effective_renewal: Option<CalendarDate>,
    pub days_until: Option<i64>,

    /// Derived bucket; the row's own `status` text is flattened in above
    #[serde(rename = "renewal_status")]
    pub status: RenewalStatus,
    pub monthly_equivalent: Decimal,
}

/// Derive status and effective renewal for one subscription.
pub fn classify(sub: &TrackedSubscription, today: CalendarDate, renews_soon_days: i64) -> SubscriptionView {
    let (effective_renewal, status) = if sub.is_cancelled() {
        // Historical date only; never projected
        match parse_calendar_date(&sub.renewal_date) {
            Ok(date) if date < today => (Some(date), RenewalStatus::Expired),
            Ok(date) => (Some(date), RenewalStatus::Cancelled),
            Err(_) => (None, RenewalStatus::Invalid),
        }
    } else {
        match sub.effective_renewal(today) {
            Ok(Some(date)) if today.days_until(date) <= renews_soon_days => (Some(date), RenewalStatus::RenewsSoon),
            Ok(Some(date)) => (Some(date), RenewalStatus::Active),
            Ok(None) => (None, RenewalStatus::Invalid),
            Err(err) if err.needs_review() => {
                tracing::error!(subscription = %sub.id, error = %err, "renewal projection needs review");
                (None, RenewalStatus::NeedsReview)
            }
            Err(err) => {
                tracing::warn!(subscription = %sub.id, error = %err, "renewal projection failed");
                (None, RenewalStatus::Invalid)
            }
        }
    };

    let monetary = sub.monetary();

    SubscriptionView {
        subscription: sub.clone(),
        cadence: monetary.cadence,
        effective_renewal,
        days_until: effective_renewal.map(|date| today.days_until(date)),
        status,
        monthly_equivalent: monetary.monthly().round_dp(2),
    }
}

/// Classify all, ordered by effective renewal (unknown dates last).
pub fn classify_all(subs: &[TrackedSubscription], today: CalendarDate, renews_soon_days: i64) -> Vec<SubscriptionView> {
    let mut views: Vec<SubscriptionView> = subs
        .iter()
        .map(|sub| classify(sub, today, renews_soon_days))
        .collect();

    views.sort_by(|a, b| match (a.effective_renewal, b.effective_renewal) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.subscription.merchant_name.cmp(&b.subscription.merchant_name),
    });

    views
}

// ============================================================================
// STATUS COUNTS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub active: usize,
    pub renews_soon: usize,
    pub expired: usize,
    pub cancelled: usize,
    pub invalid: usize,
    pub needs_review: usize,
}

impl StatusCounts {
    pub fn from_views(views: &[SubscriptionView]) -> Self {
        let mut counts = StatusCounts::default();
        for view in views {
            match view.status {
                RenewalStatus::Active => counts.active += 1,
                RenewalStatus::RenewsSoon => counts.renews_soon += 1,
                RenewalStatus::Expired => counts.expired += 1,
                RenewalStatus::Cancelled => counts.cancelled += 1,
                RenewalStatus::Invalid => counts.invalid += 1,
                RenewalStatus::NeedsReview => counts.needs_review += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.active + self.renews_soon + self.expired + self.cancelled + self.invalid + self.needs_review
    }
}

// ============================================================================
// PAYMENT FORECAST
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastEntry {
    pub subscription_id: String,
    pub merchant_name: String,
    pub date: CalendarDate,
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentForecast {
    pub from: CalendarDate,
    pub until: CalendarDate,
    pub entries: Vec<ForecastEntry>,

    /// Expected outflow per currency over the horizon
    pub totals: BTreeMap<String, Decimal>,

    /// Subscriptions whose projection hit the step cap or left the calendar range
    pub needs_review: Vec<String>,
}

/// Every renewal in `[today, today + horizon_days]` for non-cancelled
/// subscriptions, repeats included (a weekly plan shows up ~4 times in 30
/// days).
pub fn payment_forecast(subs: &[TrackedSubscription], today: CalendarDate, horizon_days: u32) -> Result<PaymentForecast> {
    let until = today.add_days(i64::from(horizon_days))?;
    let mut entries = Vec::new();
    let mut totals: BTreeMap<String, Decimal> = BTreeMap::new();
    let mut needs_review = Vec::new();

    for sub in subs.iter().filter(|s| !s.is_cancelled()) {
        let Ok(anchor) = sub.anchor() else {
            continue;
        };

        let dates = match renewals_within(&anchor, today, until) {
            Ok(dates) => dates,
            Err(err) if err.needs_review() => {
                tracing::error!(subscription = %sub.id, error = %err, "forecast projection needs review");
                needs_review.push(sub.id.clone());
                continue;
            }
            Err(err) => {
                tracing::warn!(subscription = %sub.id, error = %err, "forecast projection failed");
                continue;
            }
        };

        for date in dates {
            if sub.amount > Decimal::ZERO {
                let total = totals.entry(sub.currency.clone()).or_default();
                *total = total.checked_add(sub.amount).unwrap_or(*total);
            }

            entries.push(ForecastEntry {
                subscription_id: sub.id.clone(),
                merchant_name: sub.merchant_name.clone(),
                date,
                amount: sub.amount,
                currency: sub.currency.clone(),
            });
        }
    }

    entries.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.merchant_name.cmp(&b.merchant_name)));

    Ok(PaymentForecast { from: today, until, entries, totals, needs_review })
}

// ============================================================================
// SPEND TOTALS
// ============================================================================

/// Monthly / yearly spend per currency over non-cancelled subscriptions.
pub fn spend_totals(subs: &[TrackedSubscription]) -> SpendTotals {
    let mut totals = SpendTotals::new();
    for sub in subs.iter().filter(|s| !s.is_cancelled()) {
        totals.add(&sub.currency, &sub.monetary());
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn date(s: &str) -> CalendarDate {
        s.parse().unwrap()
    }

    fn sub(merchant: &str, cents: i64, renewal_date: &str, cycle: &str) -> TrackedSubscription {
        TrackedSubscription::new(merchant, Decimal::new(cents, 2), "USD", renewal_date, Some(cycle))
    }

    fn cancelled(mut s: TrackedSubscription) -> TrackedSubscription {
        s.status = "cancelled".to_string();
        s.cancelled_at = Some(Utc::now());
        s
    }

    #[test]
    fn test_classify_buckets() {
        let today = date("2025-01-11");

        let soon = classify(&sub("Weekly", 500, "2025-01-01", "weekly"), today, 7);
        assert_eq!(soon.status, RenewalStatus::RenewsSoon);
        assert_eq!(soon.effective_renewal, Some(date("2025-01-15")));
        assert_eq!(soon.days_until, Some(4));

        let due_today = classify(&sub("Today", 500, "2024-12-11", "monthly"), today, 7);
        assert_eq!(due_today.status, RenewalStatus::RenewsSoon);
        assert_eq!(due_today.days_until, Some(0));

        let active = classify(&sub("Yearly", 9900, "2024-06-01", "yearly"), today, 7);
        assert_eq!(active.status, RenewalStatus::Active);
        assert_eq!(active.effective_renewal, Some(date("2025-06-01")));

        let expired = classify(&cancelled(sub("Gone", 500, "2024-12-01", "monthly")), today, 7);
        assert_eq!(expired.status, RenewalStatus::Expired);
        assert_eq!(expired.effective_renewal, Some(date("2024-12-01")));

        let paid_through = classify(&cancelled(sub("Ending", 500, "2025-02-01", "monthly")), today, 7);
        assert_eq!(paid_through.status, RenewalStatus::Cancelled);

        let invalid = classify(&sub("Broken", 500, "soon-ish", "monthly"), today, 7);
        assert_eq!(invalid.status, RenewalStatus::Invalid);
        assert_eq!(invalid.effective_renewal, None);

        let review = classify(&sub("Ancient", 500, "1700-01-01", "monthly"), today, 7);
        assert_eq!(review.status, RenewalStatus::NeedsReview);
    }

    #[test]
    fn test_view_json_has_single_status_key() {
        let view = classify(&sub("Weekly", 500, "2025-01-01", "weekly"), date("2025-01-11"), 7);
        let json = serde_json::to_string(&view).unwrap();

        assert_eq!(json.matches("\"status\"").count(), 1);
        assert!(json.contains("\"status\":\"active\""));
        assert!(json.contains("\"renewal_status\":\"renews_soon\""));

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["renewal_status"], "renews_soon");
        assert_eq!(value["status"], "active");
    }

    #[test]
    fn test_cancelled_with_unparseable_date_is_invalid() {
        let today = date("2025-01-11");

        let view = classify(&cancelled(sub("Garbled", 500, "garbage", "monthly")), today, 7);
        assert_eq!(view.status, RenewalStatus::Invalid);
        assert_eq!(view.effective_renewal, None);
        assert_eq!(view.days_until, None);
    }

    #[test]
    fn test_calendar_overflow_needs_review() {
        let today = date("2025-01-11");
        let far = sub("Millennia", 500, "2024-01-01", "custom:8000:years");

        let view = classify(&far, today, 7);
        assert_eq!(view.status, RenewalStatus::NeedsReview);
        assert_eq!(view.effective_renewal, None);

        let forecast = payment_forecast(&[far.clone()], today, 30).unwrap();
        assert!(forecast.entries.is_empty());
        assert_eq!(forecast.needs_review, vec![far.id.clone()]);
    }

    #[test]
    fn test_status_counts_and_ordering() {
        let today = date("2025-01-11");
        let subs = vec![
            sub("Yearly", 9900, "2024-06-01", "yearly"),
            sub("Weekly", 500, "2025-01-01", "weekly"),
            sub("Broken", 500, "nope", "monthly"),
            cancelled(sub("Gone", 500, "2024-12-01", "monthly")),
        ];

        let views = classify_all(&subs, today, 7);
        let order: Vec<&str> = views.iter().map(|v| v.subscription.merchant_name.as_str()).collect();
        assert_eq!(order, vec!["Gone", "Weekly", "Yearly", "Broken"]);

        let counts = StatusCounts::from_views(&views);
        assert_eq!(counts.active, 1);
        assert_eq!(counts.renews_soon, 1);
        assert_eq!(counts.expired, 1);
        assert_eq!(counts.invalid, 1);
        assert_eq!(counts.total(), 4);
    }

    #[test]
    fn test_payment_forecast_includes_repeats() {
        let today = date("2025-01-11");
        let subs = vec![
            sub("Weekly", 500, "2025-01-01", "weekly"),
            sub("Monthly", 1000, "2024-12-20", "monthly"),
            sub("Yearly", 9900, "2024-06-01", "yearly"),
            cancelled(sub("Gone", 700, "2025-01-20", "monthly")),
            sub("Ancient", 100, "1700-01-01", "monthly"),
        ];

        let forecast = payment_forecast(&subs, today, 30).unwrap();
        assert_eq!(forecast.until, date("2025-02-10"));

        let dates: Vec<String> = forecast
            .entries
            .iter()
            .map(|e| format!("{} {}", e.date, e.merchant_name))
            .collect();
        assert_eq!(
            dates,
            vec![
                "2025-01-15 Weekly",
                "2025-01-20 Monthly",
                "2025-01-22 Weekly",
                "2025-01-29 Weekly",
                "2025-02-05 Weekly",
            ]
        );

        assert_eq!(forecast.totals["USD"], Decimal::new(3000, 2));
        assert_eq!(forecast.needs_review.len(), 1);
    }

    #[test]
    fn test_spend_totals_skip_cancelled() {
        let subs = vec![
            sub("Monthly", 1000, "2025-01-01", "monthly"),
            sub("Yearly", 12000, "2025-01-01", "yearly"),
            cancelled(sub("Gone", 5000, "2025-01-01", "monthly")),
        ];

        let totals = spend_totals(&subs);
        let usd = &totals.by_currency["USD"];
        assert_eq!(usd.monthly, Decimal::new(2000, 2));
        assert_eq!(usd.yearly, Decimal::new(24000, 2));
        assert_eq!(usd.subscriptions, 2);
    }
}
