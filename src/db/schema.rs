//! Database schema and migrations

use rusqlite::Connection;

use crate::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 3;

/// Initialize the database schema
///
/// # Errors
///
/// Returns error if migration fails
pub fn init(conn: &Connection) -> Result<()> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }
    if version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        -- Tenant businesses, keyed by their Twilio phone number
        CREATE TABLE IF NOT EXISTS businesses (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            phone_number TEXT NOT NULL UNIQUE,
            owner_phone TEXT NOT NULL,
            greeting_template TEXT NOT NULL DEFAULT '',
            reply_template TEXT NOT NULL DEFAULT '',
            ordering_url TEXT,
            llm_enabled INTEGER NOT NULL DEFAULT 1,
            alerts_enabled INTEGER NOT NULL DEFAULT 1,
            subscription_status TEXT NOT NULL DEFAULT 'none'
                CHECK(subscription_status IN ('none', 'trialing', 'active', 'past_due', 'canceled')),
            stripe_customer_id TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_businesses_phone ON businesses(phone_number);
        CREATE INDEX IF NOT EXISTS idx_businesses_stripe ON businesses(stripe_customer_id);

        -- Stored question/answer pairs for FAQ matching
        CREATE TABLE IF NOT EXISTS faqs (
            id TEXT PRIMARY KEY,
            business_id TEXT NOT NULL REFERENCES businesses(id),
            question TEXT NOT NULL,
            answer TEXT NOT NULL,
            position INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_faqs_business ON faqs(business_id);

        PRAGMA user_version = 1;
        ",
    )?;

    tracing::info!("migrated to schema v1");
    Ok(())
}

fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        -- Call/SMS/usage events for the analytics feed
        CREATE TABLE IF NOT EXISTS events (
            id TEXT PRIMARY KEY,
            business_id TEXT NOT NULL REFERENCES businesses(id),
            kind TEXT NOT NULL CHECK(kind IN (
                'missed_call', 'call_completed', 'sms_in', 'sms_out',
                'owner_alert', 'delivery_failed', 'llm_usage', 'reply_suppressed'
            )),
            caller TEXT NOT NULL DEFAULT '',
            detail TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_events_business ON events(business_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_events_kind ON events(kind);

        PRAGMA user_version = 2;
        ",
    )?;

    tracing::info!("migrated to schema v2");
    Ok(())
}

fn migrate_v3(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        -- Per-number outbound SMS rate-limit windows
        CREATE TABLE IF NOT EXISTS sms_rate_limits (
            phone_number TEXT PRIMARY KEY,
            window_start TEXT NOT NULL,
            sent_count INTEGER NOT NULL DEFAULT 0
        );

        PRAGMA user_version = 3;
        ",
    )?;

    tracing::info!("migrated to schema v3");
    Ok(())
}
