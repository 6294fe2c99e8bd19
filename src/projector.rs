// 🔮 Renewal Projector - Effective next renewal from a write-once anchor
//
// Subscriptions are recorded once and rarely edited. Instead of a job that
// rolls every stored renewal date forward, the current due date is derived
// on read: start at the anchor, step by the cadence until the date is no
// longer in the past. Same anchor + same today = same answer, always.

use crate::cadence::{step_once, BillingCadence};
use crate::calendar::{parse_calendar_date, CalendarDate};
use crate::error::{RenewalError, Result};
use serde::{Deserialize, Serialize};

/// Upper bound on cadence steps for a single projection.
///
/// Fixed-length cadences (weekly, biweekly, custom days) jump straight to
/// the period before today, so the cap only bites on month/year stepping:
/// 2000 monthly steps is ~166 years of history.
pub const MAX_ADVANCE_STEPS: u32 = 2000;

// ============================================================================
// SUBSCRIPTION ANCHOR
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionAnchor {
    /// Last known (or start) renewal date, as persisted
    pub anchor_date: CalendarDate,

    pub cadence: BillingCadence,

    /// Cancelled subscriptions keep their historical date
    pub cancelled: bool,
}

impl SubscriptionAnchor {
    pub fn new(anchor_date: CalendarDate, cadence: BillingCadence) -> Self {
        SubscriptionAnchor { anchor_date, cadence, cancelled: false }
    }

    pub fn cancelled(anchor_date: CalendarDate, cadence: BillingCadence) -> Self {
        SubscriptionAnchor { anchor_date, cadence, cancelled: true }
    }

    /// Build from persisted fields. The cadence falls back to monthly; an
    /// unparseable date is `InvalidDate`.
    pub fn from_record(renewal_date: &str, billing_cycle: Option<&str>, cancelled: bool) -> Result<Self> {
        Ok(SubscriptionAnchor {
            anchor_date: parse_calendar_date(renewal_date)?,
            cadence: BillingCadence::parse(billing_cycle).cadence,
            cancelled,
        })
    }

    /// Same cadence and flag, new anchor date.
    pub fn with_anchor_date(self, anchor_date: CalendarDate) -> Self {
        SubscriptionAnchor { anchor_date, ..self }
    }
}

// ============================================================================
// PROJECTION
// ============================================================================

/// First renewal on or after `today`.
///
/// - cancelled: the anchor date, untouched
/// - anchor already >= today: the anchor date (zero steps)
/// - otherwise: step by the cadence until >= today
///
/// Feeding the result back in as a new anchor returns it unchanged.
pub fn effective_renewal(anchor: &SubscriptionAnchor, today: CalendarDate) -> Result<CalendarDate> {
    if anchor.cancelled || anchor.anchor_date >= today {
        return Ok(anchor.anchor_date);
    }

    let mut current = anchor.anchor_date;

    // Fixed-length periods: skip whole periods that still end before today,
    // leaving exactly one step. Identical to stepping one period at a time.
    if let Some(period) = anchor.cadence.fixed_days() {
        let behind = current.days_until(today);
        current = current.add_days((behind - 1) / period * period)?;
    }

    let mut steps = 0;
    while current < today {
        if steps >= MAX_ADVANCE_STEPS {
            return Err(RenewalError::AdvancementCapExceeded {
                anchor: anchor.anchor_date,
                today,
                steps,
            });
        }
        current = step_once(current, anchor.cadence)?;
        steps += 1;
    }

    Ok(current)
}

/// Effective renewal straight from persisted text fields.
///
/// A missing or unparseable date is `Ok(None)`: unknown, leave the record
/// out of due-soon/overdue views. Cap exhaustion is still an error.
pub fn effective_renewal_for(
    renewal_date: Option<&str>,
    billing_cycle: Option<&str>,
    cancelled: bool,
    today: CalendarDate,
) -> Result<Option<CalendarDate>> {
    let Some(raw) = renewal_date.filter(|s| !s.trim().is_empty()) else {
        return Ok(None);
    };

    match SubscriptionAnchor::from_record(raw, billing_cycle, cancelled) {
        Ok(anchor) => effective_renewal(&anchor, today).map(Some),
        Err(RenewalError::InvalidDate(_)) => {
            tracing::warn!(renewal_date = raw, "unparseable renewal date, excluding from projections");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

// ============================================================================
// SCHEDULE PREVIEW
// ============================================================================

/// The next `count` renewals, starting at the effective renewal.
///
/// Cancelled anchors have no upcoming renewals. A `count` above
/// [`MAX_ADVANCE_STEPS`] is refused with `AdvancementCapExceeded`.
pub fn upcoming_renewals(anchor: &SubscriptionAnchor, today: CalendarDate, count: usize) -> Result<Vec<CalendarDate>> {
    if anchor.cancelled || count == 0 {
        return Ok(Vec::new());
    }

    if count > MAX_ADVANCE_STEPS as usize {
        return Err(RenewalError::AdvancementCapExceeded {
            anchor: anchor.anchor_date,
            today,
            steps: MAX_ADVANCE_STEPS,
        });
    }

    let mut dates = Vec::new();
    let mut current = effective_renewal(anchor, today)?;
    dates.push(current);

    while dates.len() < count {
        current = step_once(current, anchor.cadence)?;
        dates.push(current);
    }

    Ok(dates)
}

/// Every renewal falling in `[today, until]`, in order.
pub fn renewals_within(anchor: &SubscriptionAnchor, today: CalendarDate, until: CalendarDate) -> Result<Vec<CalendarDate>> {
    if anchor.cancelled || until < today {
        return Ok(Vec::new());
    }

    let mut dates = Vec::new();
    let mut current = effective_renewal(anchor, today)?;
    let mut steps = 0;

    while current <= until {
        if steps >= MAX_ADVANCE_STEPS {
            return Err(RenewalError::AdvancementCapExceeded { anchor: anchor.anchor_date, today, steps });
        }
        dates.push(current);
        current = step_once(current, anchor.cadence)?;
        steps += 1;
    }

    Ok(dates)
}
