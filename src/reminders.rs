// ⏰ Reminder Planner - Which subscriptions need a heads-up today
//
// A reminder is due when the effective renewal lands inside
// [today, today + days_before]. Each renewal date is reminded at most once:
// the date a reminder went out for is stored on the row and compared here.
// Delivery (email etc.) is the caller's business.

use crate::calendar::CalendarDate;
use crate::db::TrackedSubscription;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lead times offered to users.
pub const ALLOWED_DAYS_BEFORE: [u32; 3] = [1, 3, 7];
pub const DEFAULT_DAYS_BEFORE: u32 = 3;

/// Clamp a requested lead time to the allowed set (anything else → 3).
pub fn normalize_days_before(days: u32) -> u32 {
    if ALLOWED_DAYS_BEFORE.contains(&days) {
        days
    } else {
        DEFAULT_DAYS_BEFORE
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderDue {
    pub subscription_id: String,
    pub merchant_name: String,
    pub amount: Decimal,
    pub currency: String,
    pub renewal_date: CalendarDate,
    pub days_until: i64,
    pub subject: String,
}

impl ReminderDue {
    fn for_subscription(sub: &TrackedSubscription, renewal_date: CalendarDate, today: CalendarDate) -> Self {
        ReminderDue {
            subscription_id: sub.id.clone(),
            merchant_name: sub.merchant_name.clone(),
            amount: sub.amount,
            currency: sub.currency.clone(),
            renewal_date,
            days_until: today.days_until(renewal_date),
            subject: format!("Reminder: {} renews on {}", sub.merchant_name, renewal_date),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReminderPlan {
    pub due: Vec<ReminderDue>,

    /// Renewal already reminded (same date as last time)
    pub skipped_already_reminded: usize,

    /// Stored date could not be parsed
    pub skipped_invalid: usize,

    /// Subscription ids whose projection hit the step cap or left the calendar range
    pub needs_review: Vec<String>,

    pub window_days: u32,
}

/// Plan today's reminders over non-cancelled subscriptions.
pub fn plan_reminders(subs: &[TrackedSubscription], today: CalendarDate, days_before: u32) -> ReminderPlan {
    let mut plan = ReminderPlan { window_days: days_before, ..ReminderPlan::default() };

    for sub in subs.iter().filter(|s| !s.is_cancelled()) {
        let renewal = match sub.effective_renewal(today) {
            Ok(Some(date)) => date,
            Ok(None) => {
                plan.skipped_invalid += 1;
                continue;
            }
            Err(err) if err.needs_review() => {
                tracing::error!(subscription = %sub.id, error = %err, "reminder projection needs review");
                plan.needs_review.push(sub.id.clone());
                continue;
            }
            Err(err) => {
                tracing::warn!(subscription = %sub.id, error = %err, "reminder projection failed");
                plan.skipped_invalid += 1;
                continue;
            }
        };

        let days_until = today.days_until(renewal);
        if days_until < 0 || days_until > i64::from(days_before) {
            continue;
        }

        let already = sub
            .last_reminded_renewal_date
            .as_deref()
            .and_then(|raw| raw.parse::<CalendarDate>().ok())
            .is_some_and(|last| last == renewal);
        if already {
            tracing::debug!(subscription = %sub.id, %renewal, "reminder already sent for this renewal");
            plan.skipped_already_reminded += 1;
            continue;
        }

        plan.due.push(ReminderDue::for_subscription(sub, renewal, today));
    }

    plan.due.sort_by(|a, b| {
        a.renewal_date
            .cmp(&b.renewal_date)
            .then_with(|| a.merchant_name.cmp(&b.merchant_name))
    });

    tracing::info!(
        due = plan.due.len(),
        already_reminded = plan.skipped_already_reminded,
        invalid = plan.skipped_invalid,
        needs_review = plan.needs_review.len(),
        window_days = days_before,
        "reminder plan computed"
    );

    plan
}
