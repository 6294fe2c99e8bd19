// Subscription Tracker - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod calendar;    // Calendar-day primitives (no time-of-day, no timezone)
pub mod cadence;     // Billing cadences + single-period step
pub mod error;       // Typed renewal errors
pub mod projector;   // Effective next renewal from a stored anchor
pub mod normalizer;  // Monthly / yearly spend equivalents
pub mod db;          // SQLite persistence + audit events
pub mod importer;    // CSV import boundary
pub mod dashboard;   // Status buckets, forecast, totals
pub mod reminders;   // Reminder planning
pub mod config;      // Environment configuration + tracing setup

#[cfg(feature = "server")]
pub mod api;         // Axum JSON API

// Re-export commonly used types
pub use calendar::{format_calendar_date, parse_calendar_date, parse_calendar_date_in, CalendarDate};
pub use cadence::{step_once, BillingCadence, CadenceUnit, ParsedCadence};
pub use error::{RenewalError, Result};
pub use projector::{
    effective_renewal, effective_renewal_for,
    renewals_within, upcoming_renewals,
    SubscriptionAnchor, MAX_ADVANCE_STEPS,
};
pub use normalizer::{
    to_monthly, to_yearly, total_monthly, total_yearly,
    CurrencySpend, MonetaryCadenceAmount, SpendTotals,
};
pub use db::{
    TrackedSubscription, Event,
    setup_database, insert_subscriptions, get_all_subscriptions, get_subscription,
    set_cancelled, mark_reminded, verify_count, insert_event, get_events_for_entity,
};
pub use importer::{load_csv, read_csv, ImportReport, RejectedRow};
pub use dashboard::{
    classify, classify_all, payment_forecast, spend_totals,
    ForecastEntry, PaymentForecast, RenewalStatus, StatusCounts, SubscriptionView,
};
pub use reminders::{plan_reminders, ReminderDue, ReminderPlan};
pub use config::Config;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
