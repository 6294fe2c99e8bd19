// 💱 Cadence Normalizer - Monthly / yearly equivalents for spend totals
//
// Each cadence maps to a monthly ratio (numerator / denominator) built on
// average calendar lengths. Yearly is always monthly × 12, computed from
// the monthly figure and never from a separate formula.

use crate::cadence::{BillingCadence, CadenceUnit};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const MONTHS_PER_YEAR: i64 = 12;

/// Average days per month (365.2425 / 12, rounded).
fn average_month_days() -> Decimal {
    Decimal::new(30437, 3)
}

/// (numerator, denominator) such that monthly = amount × num / den.
fn monthly_ratio(cadence: BillingCadence) -> (Decimal, Decimal) {
    let twelve = Decimal::from(MONTHS_PER_YEAR);
    match cadence {
        BillingCadence::Weekly => (Decimal::from(52), twelve),
        BillingCadence::Biweekly => (Decimal::from(26), twelve),
        BillingCadence::Monthly => (Decimal::ONE, Decimal::ONE),
        BillingCadence::Quarterly => (Decimal::ONE, Decimal::from(3)),
        BillingCadence::Semiannual => (Decimal::ONE, Decimal::from(6)),
        BillingCadence::Yearly => (Decimal::ONE, twelve),
        BillingCadence::Custom { n, unit } => {
            let n = Decimal::from(n.get());
            match unit {
                CadenceUnit::Days => (average_month_days(), n),
                CadenceUnit::Months => (Decimal::ONE, n),
                CadenceUnit::Years => (Decimal::ONE, twelve * n),
            }
        }
    }
}

/// Monthly equivalent of `amount` billed every `cadence`.
///
/// Overflow of the decimal range yields zero (and a warning), the decimal
/// counterpart of a non-finite amount.
pub fn to_monthly(amount: Decimal, cadence: BillingCadence) -> Decimal {
    let (num, den) = monthly_ratio(cadence);
    amount
        .checked_mul(num)
        .and_then(|scaled| scaled.checked_div(den))
        .unwrap_or_else(|| {
            tracing::warn!(%amount, %cadence, "monthly normalization overflowed, counting as zero");
            Decimal::ZERO
        })
}

/// Yearly equivalent: exactly `to_monthly(amount, cadence) × 12`.
pub fn to_yearly(amount: Decimal, cadence: BillingCadence) -> Decimal {
    let monthly = to_monthly(amount, cadence);
    monthly.checked_mul(Decimal::from(MONTHS_PER_YEAR)).unwrap_or_else(|| {
        tracing::warn!(%amount, %cadence, "yearly normalization overflowed, counting as zero");
        Decimal::ZERO
    })
}

// ============================================================================
// MONETARY CADENCE AMOUNT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonetaryCadenceAmount {
    pub amount: Decimal,
    pub cadence: BillingCadence,
}

impl MonetaryCadenceAmount {
    pub fn new(amount: Decimal, cadence: BillingCadence) -> Self {
        MonetaryCadenceAmount { amount, cadence }
    }

    /// From a float amount; NaN / ±inf / out-of-range become zero.
    pub fn from_f64(amount: f64, cadence: BillingCadence) -> Self {
        let amount = if amount.is_finite() { Decimal::from_f64(amount) } else { None };
        MonetaryCadenceAmount {
            amount: amount.unwrap_or(Decimal::ZERO),
            cadence,
        }
    }

    /// Only positive amounts count toward totals.
    pub fn contributes(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    /// Monthly contribution to an aggregate (zero when it does not contribute).
    pub fn monthly(&self) -> Decimal {
        if self.contributes() {
            to_monthly(self.amount, self.cadence)
        } else {
            Decimal::ZERO
        }
    }

    pub fn yearly(&self) -> Decimal {
        if self.contributes() {
            to_yearly(self.amount, self.cadence)
        } else {
            Decimal::ZERO
        }
    }
}

/// Monthly total of a single-currency set; non-positive amounts add nothing.
pub fn total_monthly(items: &[MonetaryCadenceAmount]) -> Decimal {
    items
        .iter()
        .map(MonetaryCadenceAmount::monthly)
        .fold(Decimal::ZERO, |acc, m| acc.checked_add(m).unwrap_or(acc))
}

/// Yearly total, always `total_monthly × 12`.
pub fn total_yearly(items: &[MonetaryCadenceAmount]) -> Decimal {
    total_monthly(items)
        .checked_mul(Decimal::from(MONTHS_PER_YEAR))
        .unwrap_or(Decimal::ZERO)
}

// ============================================================================
// SPEND TOTALS (per currency)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrencySpend {
    pub monthly: Decimal,
    pub yearly: Decimal,
    pub subscriptions: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpendTotals {
    /// Currencies are never mixed; keyed by ISO code
    pub by_currency: BTreeMap<String, CurrencySpend>,

    /// Items left out for a zero, negative or unrepresentable amount
    pub skipped: usize,
}

impl SpendTotals {
    pub fn new() -> Self {
        SpendTotals::default()
    }

    pub fn add(&mut self, currency: &str, item: &MonetaryCadenceAmount) {
        if !item.contributes() {
            self.skipped += 1;
            return;
        }

        let entry = self.by_currency.entry(currency.to_uppercase()).or_default();
        entry.monthly = entry.monthly.checked_add(item.monthly()).unwrap_or(entry.monthly);
        entry.yearly = entry
            .monthly
            .checked_mul(Decimal::from(MONTHS_PER_YEAR))
            .unwrap_or(entry.yearly);
        entry.subscriptions += 1;
    }

    /// Copy rounded to cents, for display.
    pub fn rounded(&self) -> SpendTotals {
        SpendTotals {
            by_currency: self
                .by_currency
                .iter()
                .map(|(currency, spend)| {
                    (
                        currency.clone(),
                        CurrencySpend {
                            monthly: spend.monthly.round_dp(2),
                            yearly: spend.yearly.round_dp(2),
                            subscriptions: spend.subscriptions,
                        },
                    )
                })
                .collect(),
            skipped: self.skipped,
        }
    }
}
