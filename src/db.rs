use crate::calendar::CalendarDate;
use crate::cadence::BillingCadence;
use crate::error::RenewalError;
use crate::normalizer::MonetaryCadenceAmount;
use crate::projector::{effective_renewal_for, SubscriptionAnchor};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::str::FromStr;

pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_CANCELLED: &str = "cancelled";

/// Tracked subscription as persisted.
///
/// `renewal_date` and `billing_cycle` are kept as the raw text the user (or
/// an older import) stored; they are parsed into typed values only at the
/// projection boundary, so legacy rows never fail to load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedSubscription {
    // ========================================================================
    // IDENTITY
    // ========================================================================
    /// Stable identity (UUID) - never changes
    pub id: String,

    // ========================================================================
    // CORE FIELDS
    // ========================================================================
    pub merchant_name: String,

    pub plan_name: Option<String>,

    pub amount: Decimal,

    /// ISO 4217, upper-case
    pub currency: String,

    /// Anchor date: start or last known renewal (`YYYY-MM-DD` normally)
    pub renewal_date: String,

    /// Free-text cycle ("monthly", "every_3_months", ...)
    pub billing_cycle: Option<String>,

    pub status: String,

    pub cancelled_at: Option<DateTime<Utc>>,

    pub notes: Option<String>,

    // ========================================================================
    // REMINDER BOOKKEEPING
    // ========================================================================
    /// Renewal date the last reminder was sent for (send once per date)
    pub last_reminded_renewal_date: Option<String>,

    // ========================================================================
    // EXTENSIBLE METADATA
    // ========================================================================
    #[serde(default)]
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl TrackedSubscription {
    /// Fresh active subscription with a new UUID.
    pub fn new(
        merchant_name: &str,
        amount: Decimal,
        currency: &str,
        renewal_date: &str,
        billing_cycle: Option<&str>,
    ) -> Self {
        TrackedSubscription {
            id: uuid::Uuid::new_v4().to_string(),
            merchant_name: merchant_name.trim().to_string(),
            plan_name: None,
            amount,
            currency: currency.trim().to_uppercase(),
            renewal_date: renewal_date.trim().to_string(),
            billing_cycle: billing_cycle.map(|c| c.trim().to_lowercase()),
            status: STATUS_ACTIVE.to_string(),
            cancelled_at: None,
            notes: None,
            last_reminded_renewal_date: None,
            metadata: HashMap::new(),
        }
    }

    /// Cancelled by status text or by a cancellation timestamp.
    pub fn is_cancelled(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case(STATUS_CANCELLED) || self.cancelled_at.is_some()
    }

    /// Cadence with the monthly fallback applied.
    pub fn cadence(&self) -> BillingCadence {
        BillingCadence::parse(self.billing_cycle.as_deref()).cadence
    }

    pub fn anchor(&self) -> std::result::Result<SubscriptionAnchor, RenewalError> {
        SubscriptionAnchor::from_record(&self.renewal_date, self.billing_cycle.as_deref(), self.is_cancelled())
    }

    /// Effective renewal as of `today`; `Ok(None)` when the stored date is unusable.
    pub fn effective_renewal(&self, today: CalendarDate) -> std::result::Result<Option<CalendarDate>, RenewalError> {
        effective_renewal_for(
            Some(&self.renewal_date),
            self.billing_cycle.as_deref(),
            self.is_cancelled(),
            today,
        )
    }

    pub fn monetary(&self) -> MonetaryCadenceAmount {
        MonetaryCadenceAmount::new(self.amount, self.cadence())
    }

    /// Duplicate detection: same merchant, currency and renewal date.
    /// NOTE: this is for DEDUPLICATION, not identity (identity = id)
    pub fn compute_idempotency_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}|{}|{}",
            self.merchant_name.trim().to_lowercase(),
            self.currency.trim().to_uppercase(),
            self.renewal_date.trim()
        ));
        format!("{:x}", hasher.finalize())
    }

    pub fn get_metadata(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(key)
    }
}

/// Event for the audit trail (cancel, reactivate, reminder sent, ...)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Tracked Subscriptions Table
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS tracked_subscriptions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            sub_uuid TEXT UNIQUE NOT NULL,
            idempotency_hash TEXT UNIQUE NOT NULL,
            merchant_name TEXT NOT NULL,
            plan_name TEXT,
            amount TEXT NOT NULL,
            currency TEXT NOT NULL,
            renewal_date TEXT NOT NULL,
            billing_cycle TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            cancelled_at TEXT,
            notes TEXT,
            last_reminded_renewal_date TEXT,
            metadata TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subs_status ON tracked_subscriptions(status)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
        [],
    )?;

    Ok(())
}

/// Insert subscriptions, skipping duplicates by idempotency hash.
pub fn insert_subscriptions(conn: &Connection, subscriptions: &[TrackedSubscription]) -> Result<usize> {
    let mut inserted = 0;
    let mut duplicates = 0;

    for sub in subscriptions {
        let hash = sub.compute_idempotency_hash();
        let metadata_json = serde_json::to_string(&sub.metadata)?;

        let result = conn.execute(
            "INSERT INTO tracked_subscriptions (
                sub_uuid, idempotency_hash, merchant_name, plan_name, amount, currency,
                renewal_date, billing_cycle, status, cancelled_at, notes,
                last_reminded_renewal_date, metadata
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                sub.id,
                hash,
                sub.merchant_name,
                sub.plan_name,
                sub.amount.to_string(),
                sub.currency,
                sub.renewal_date,
                sub.billing_cycle,
                sub.status,
                sub.cancelled_at.map(|dt| dt.to_rfc3339()),
                sub.notes,
                sub.last_reminded_renewal_date,
                metadata_json,
            ],
        );

        match result {
            Ok(_) => {
                inserted += 1;

                let event = Event::new(
                    "subscription_added",
                    "subscription",
                    &sub.id,
                    serde_json::json!({
                        "merchant_name": sub.merchant_name,
                        "amount": sub.amount.to_string(),
                        "currency": sub.currency,
                        "renewal_date": sub.renewal_date,
                        "billing_cycle": sub.billing_cycle,
                    }),
                    "importer",
                );
                if let Err(e) = insert_event(conn, &event) {
                    tracing::warn!(subscription = %sub.id, error = %e, "failed to record audit event");
                }
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                tracing::debug!(merchant = %sub.merchant_name, renewal_date = %sub.renewal_date, "duplicate subscription skipped");
                duplicates += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    tracing::info!(inserted, duplicates, "subscriptions stored");

    Ok(inserted)
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

const SUBSCRIPTION_COLUMNS: &str = "sub_uuid, merchant_name, plan_name, amount, currency,
                renewal_date, billing_cycle, status, cancelled_at, notes,
                last_reminded_renewal_date, metadata";

fn subscription_from_row(row: &Row<'_>) -> rusqlite::Result<TrackedSubscription> {
    let amount_text: String = row.get(3)?;
    let amount = Decimal::from_str(amount_text.trim())
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

    let cancelled_at_str: Option<String> = row.get(8)?;
    let cancelled_at = cancelled_at_str
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let metadata_json: Option<String> = row.get(11)?;
    let metadata = metadata_json
        .and_then(|json_str| serde_json::from_str(&json_str).ok())
        .unwrap_or_default();

    Ok(TrackedSubscription {
        id: row.get(0)?,
        merchant_name: row.get(1)?,
        plan_name: row.get(2)?,
        amount,
        currency: row.get(4)?,
        renewal_date: row.get(5)?,
        billing_cycle: row.get(6)?,
        status: row.get(7)?,
        cancelled_at,
        notes: row.get(9)?,
        last_reminded_renewal_date: row.get(10)?,
        metadata,
    })
}

pub fn get_all_subscriptions(conn: &Connection) -> Result<Vec<TrackedSubscription>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SUBSCRIPTION_COLUMNS}
         FROM tracked_subscriptions
         ORDER BY renewal_date ASC, merchant_name ASC"
    ))?;

    let subscriptions = stmt
        .query_map([], subscription_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(subscriptions)
}

pub fn get_subscription(conn: &Connection, id: &str) -> Result<Option<TrackedSubscription>> {
    let sub = conn
        .query_row(
            &format!("SELECT {SUBSCRIPTION_COLUMNS} FROM tracked_subscriptions WHERE sub_uuid = ?1"),
            [id],
            subscription_from_row,
        )
        .optional()?;

    Ok(sub)
}

/// Cancel (`cancelled = true`) or reactivate a subscription.
///
/// Returns the updated row, or None when the id is unknown.
pub fn set_cancelled(
    conn: &Connection,
    id: &str,
    cancelled: bool,
    at: DateTime<Utc>,
    actor: &str,
) -> Result<Option<TrackedSubscription>> {
    let (status, cancelled_at) = if cancelled {
        (STATUS_CANCELLED, Some(at.to_rfc3339()))
    } else {
        (STATUS_ACTIVE, None)
    };

    let changed = conn.execute(
        "UPDATE tracked_subscriptions SET status = ?1, cancelled_at = ?2 WHERE sub_uuid = ?3",
        params![status, cancelled_at, id],
    )?;

    if changed == 0 {
        return Ok(None);
    }

    let event_type = if cancelled { "subscription_cancelled" } else { "subscription_reactivated" };
    insert_event(
        conn,
        &Event::new(event_type, "subscription", id, serde_json::json!({ "status": status }), actor),
    )?;

    get_subscription(conn, id)
}

/// Record that a reminder went out for `renewal_date`.
///
/// Returns false when the id is unknown.
pub fn mark_reminded(conn: &Connection, id: &str, renewal_date: CalendarDate, actor: &str) -> Result<bool> {
    let renewal = renewal_date.to_string();

    let changed = conn.execute(
        "UPDATE tracked_subscriptions SET last_reminded_renewal_date = ?1 WHERE sub_uuid = ?2",
        params![renewal, id],
    )?;

    if changed == 0 {
        return Ok(false);
    }

    insert_event(
        conn,
        &Event::new(
            "reminder_sent",
            "subscription",
            id,
            serde_json::json!({ "renewal_date": renewal }),
            actor,
        ),
    )?;

    Ok(true)
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM tracked_subscriptions", [], |row| row.get(0))?;

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper to build test subscriptions with all required fields
    fn create_test_subscription(merchant: &str, cents: i64, renewal_date: &str, cycle: &str) -> TrackedSubscription {
        TrackedSubscription::new(merchant, Decimal::new(cents, 2), "usd", renewal_date, Some(cycle))
    }

    fn date(s: &str) -> CalendarDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_idempotency_import_twice() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let subscriptions = vec![
            create_test_subscription("Netflix", 1549, "2025-01-05", "monthly"),
            create_test_subscription("Spotify", 1099, "2025-01-12", "monthly"),
            create_test_subscription("iCloud", 9900, "2025-03-01", "yearly"),
        ];

        let inserted1 = insert_subscriptions(&conn, &subscriptions).unwrap();
        let count1 = verify_count(&conn).unwrap();

        // Same rows again, fresh UUIDs but same merchant/currency/date
        let again: Vec<TrackedSubscription> = subscriptions
            .iter()
            .map(|s| {
                let mut copy = s.clone();
                copy.id = uuid::Uuid::new_v4().to_string();
                copy
            })
            .collect();
        let inserted2 = insert_subscriptions(&conn, &again).unwrap();
        let count2 = verify_count(&conn).unwrap();

        assert_eq!(inserted1, 3, "First import should insert 3 subscriptions");
        assert_eq!(count1, 3);
        assert_eq!(inserted2, 0, "Second import should insert 0 (all duplicates)");
        assert_eq!(count2, 3);
    }

    #[test]
    fn test_compute_idempotency_hash() {
        let a = create_test_subscription("Netflix", 1549, "2025-01-05", "monthly");
        let mut b = create_test_subscription(" NETFLIX ", 999, "2025-01-05", "yearly");
        b.currency = "usd".to_string();

        assert_eq!(a.compute_idempotency_hash(), b.compute_idempotency_hash());
        assert_eq!(a.compute_idempotency_hash().len(), 64, "SHA-256 hash should be 64 hex characters");

        let c = create_test_subscription("Netflix", 1549, "2025-02-05", "monthly");
        assert_ne!(a.compute_idempotency_hash(), c.compute_idempotency_hash());
    }

    #[test]
    fn test_round_trip_through_sqlite() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let mut sub = create_test_subscription("Notion", 800, "2025-01-31", "every_3_months");
        sub.plan_name = Some("Plus".to_string());
        sub.metadata.insert("source".to_string(), serde_json::json!("test"));
        insert_subscriptions(&conn, &[sub.clone()]).unwrap();

        let loaded = get_subscription(&conn, &sub.id).unwrap().unwrap();
        assert_eq!(loaded.merchant_name, "Notion");
        assert_eq!(loaded.plan_name.as_deref(), Some("Plus"));
        assert_eq!(loaded.amount, Decimal::new(800, 2));
        assert_eq!(loaded.currency, "USD");
        assert_eq!(loaded.cadence(), BillingCadence::Quarterly);
        assert_eq!(loaded.get_metadata("source"), Some(&serde_json::json!("test")));
        assert!(!loaded.is_cancelled());

        assert!(get_subscription(&conn, "missing").unwrap().is_none());
    }

    #[test]
    fn test_cancel_and_reactivate() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let sub = create_test_subscription("Hulu", 799, "2024-06-10", "monthly");
        insert_subscriptions(&conn, &[sub.clone()]).unwrap();

        let cancelled = set_cancelled(&conn, &sub.id, true, Utc::now(), "test").unwrap().unwrap();
        assert!(cancelled.is_cancelled());
        assert_eq!(cancelled.status, STATUS_CANCELLED);
        assert!(cancelled.cancelled_at.is_some());

        // Cancelled rows keep their historical date
        let today = date("2025-01-11");
        assert_eq!(cancelled.effective_renewal(today).unwrap(), Some(date("2024-06-10")));

        let active = set_cancelled(&conn, &sub.id, false, Utc::now(), "test").unwrap().unwrap();
        assert!(!active.is_cancelled());
        assert_eq!(active.effective_renewal(today).unwrap(), Some(date("2025-02-10")));

        assert!(set_cancelled(&conn, "missing", true, Utc::now(), "test").unwrap().is_none());

        let events = get_events_for_entity(&conn, "subscription", &sub.id).unwrap();
        let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert!(types.contains(&"subscription_added"));
        assert!(types.contains(&"subscription_cancelled"));
        assert!(types.contains(&"subscription_reactivated"));
    }

    #[test]
    fn test_mark_reminded() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let sub = create_test_subscription("Disney+", 1399, "2025-01-14", "monthly");
        insert_subscriptions(&conn, &[sub.clone()]).unwrap();

        assert!(mark_reminded(&conn, &sub.id, date("2025-01-14"), "scheduler").unwrap());
        assert!(!mark_reminded(&conn, "missing", date("2025-01-14"), "scheduler").unwrap());

        let loaded = get_subscription(&conn, &sub.id).unwrap().unwrap();
        assert_eq!(loaded.last_reminded_renewal_date.as_deref(), Some("2025-01-14"));
    }

    #[test]
    fn test_legacy_rows_still_load() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let sub = create_test_subscription("Legacy", 500, "sometime soon", "hourly");
        insert_subscriptions(&conn, &[sub.clone()]).unwrap();

        let loaded = get_all_subscriptions(&conn).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].cadence(), BillingCadence::Monthly);
        assert_eq!(loaded[0].effective_renewal(date("2025-01-11")).unwrap(), None);
        assert!(loaded[0].anchor().is_err());
    }

    #[test]
    fn test_event_log() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let event = Event::new(
            "test_event",
            "subscription",
            "test_id_123",
            serde_json::json!({"test": "data"}),
            "test_actor",
        );

        insert_event(&conn, &event).unwrap();

        let events = get_events_for_entity(&conn, "subscription", "test_id_123").unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "test_event");
        assert_eq!(events[0].actor, "test_actor");
    }
}
