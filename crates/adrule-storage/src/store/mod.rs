use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::{Result, StorageError};

pub mod audit;
pub mod credential;
pub mod entity;
pub mod metric;
pub mod notification;
pub mod rule;

const RULES_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS rules (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    status TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    platform TEXT NOT NULL,
    account_id TEXT,
    condition_logic TEXT NOT NULL DEFAULT 'AND',
    check_frequency_minutes INTEGER NOT NULL,
    max_actions_per_run INTEGER,
    require_approval INTEGER NOT NULL DEFAULT 0,
    dry_run INTEGER NOT NULL DEFAULT 0,
    conditions_json TEXT NOT NULL,
    actions_json TEXT NOT NULL,
    last_executed_at INTEGER,
    next_execution_at INTEGER,
    claimed_until INTEGER,
    total_executions INTEGER NOT NULL DEFAULT 0,
    total_actions_taken INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_rules_due ON rules(status, next_execution_at);
CREATE INDEX IF NOT EXISTS idx_rules_user ON rules(user_id);
";

const ENTITIES_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS ad_entities (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    platform TEXT NOT NULL,
    platform_entity_id TEXT NOT NULL,
    account_id TEXT,
    name TEXT NOT NULL,
    status TEXT NOT NULL,
    daily_budget REAL,
    deleted_at INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_entities_scope
    ON ad_entities(user_id, platform, entity_type, deleted_at);
";

const METRICS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS daily_metrics (
    entity_id TEXT NOT NULL,
    date TEXT NOT NULL,
    spend REAL NOT NULL DEFAULT 0,
    revenue REAL NOT NULL DEFAULT 0,
    conversions REAL NOT NULL DEFAULT 0,
    clicks INTEGER NOT NULL DEFAULT 0,
    impressions INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (entity_id, date)
);
";

const AUDIT_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS rule_executions (
    id TEXT PRIMARY KEY,
    rule_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at INTEGER NOT NULL,
    completed_at INTEGER,
    entities_checked INTEGER NOT NULL DEFAULT 0,
    entities_matched INTEGER NOT NULL DEFAULT 0,
    actions_taken INTEGER NOT NULL DEFAULT 0,
    actions_failed INTEGER NOT NULL DEFAULT 0,
    duration_ms INTEGER,
    error_message TEXT
);
CREATE INDEX IF NOT EXISTS idx_executions_rule ON rule_executions(rule_id, started_at);
CREATE TABLE IF NOT EXISTS rule_action_records (
    id TEXT PRIMARY KEY,
    execution_id TEXT NOT NULL,
    rule_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    platform_entity_id TEXT NOT NULL,
    entity_name TEXT NOT NULL,
    action_type TEXT NOT NULL,
    action_params TEXT NOT NULL,
    status TEXT NOT NULL,
    field_changed TEXT,
    old_value TEXT,
    new_value TEXT,
    can_rollback INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_action_records_execution ON rule_action_records(execution_id);
";

const NOTIFICATIONS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS notifications (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    title TEXT NOT NULL,
    message TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, created_at);
CREATE TABLE IF NOT EXISTS platform_credentials (
    user_id TEXT NOT NULL,
    platform TEXT NOT NULL,
    access_token TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, platform)
);
";

/// SQLite-backed implementation of every store trait in this crate.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Opens (or creates) the database at `db_path` and applies the schema.
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(RULES_SCHEMA)?;
        conn.execute_batch(ENTITIES_SCHEMA)?;
        conn.execute_batch(METRICS_SCHEMA)?;
        conn.execute_batch(AUDIT_SCHEMA)?;
        conn.execute_batch(NOTIFICATIONS_SCHEMA)?;

        tracing::info!(path = %db_path.display(), "Initialized rule store");
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: db_path.to_path_buf(),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Lock the connection, recovering from a poisoned Mutex if necessary.
    pub(crate) fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

pub(crate) fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub(crate) fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| StorageError::InvalidValue {
        column: "date",
        value: value.to_string(),
    })
}

/// Parses a string column into one of the common enums.
pub(crate) fn parse_enum<T: std::str::FromStr>(column: &'static str, value: &str) -> Result<T> {
    value.parse().map_err(|_| StorageError::InvalidValue {
        column,
        value: value.to_string(),
    })
}
