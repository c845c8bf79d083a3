use adrule_common::types::{ActionRecord, Execution};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::{from_millis, parse_enum, to_millis, SqliteStore};
use crate::error::{Result, StorageError};
use crate::AuditStore;

const EXECUTION_COLUMNS: &str = "id, rule_id, user_id, status, started_at, completed_at,
    entities_checked, entities_matched, actions_taken, actions_failed, duration_ms, error_message";

const RECORD_COLUMNS: &str = "id, execution_id, rule_id, user_id, entity_type, entity_id,
    platform_entity_id, entity_name, action_type, action_params, status, field_changed,
    old_value, new_value, can_rollback, error_message, created_at, updated_at";

struct ExecutionRow {
    id: String,
    rule_id: String,
    user_id: String,
    status: String,
    started_at: i64,
    completed_at: Option<i64>,
    entities_checked: u32,
    entities_matched: u32,
    actions_taken: u32,
    actions_failed: u32,
    duration_ms: Option<i64>,
    error_message: Option<String>,
}

impl ExecutionRow {
    fn read(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            rule_id: row.get(1)?,
            user_id: row.get(2)?,
            status: row.get(3)?,
            started_at: row.get(4)?,
            completed_at: row.get(5)?,
            entities_checked: row.get(6)?,
            entities_matched: row.get(7)?,
            actions_taken: row.get(8)?,
            actions_failed: row.get(9)?,
            duration_ms: row.get(10)?,
            error_message: row.get(11)?,
        })
    }

    fn into_execution(self) -> Result<Execution> {
        Ok(Execution {
            status: parse_enum("status", &self.status)?,
            id: self.id,
            rule_id: self.rule_id,
            user_id: self.user_id,
            started_at: from_millis(self.started_at),
            completed_at: self.completed_at.map(from_millis),
            entities_checked: self.entities_checked,
            entities_matched: self.entities_matched,
            actions_taken: self.actions_taken,
            actions_failed: self.actions_failed,
            duration_ms: self.duration_ms,
            error_message: self.error_message,
        })
    }
}

struct RecordRow {
    id: String,
    execution_id: String,
    rule_id: String,
    user_id: String,
    entity_type: String,
    entity_id: String,
    platform_entity_id: String,
    entity_name: String,
    action_type: String,
    action_params: String,
    status: String,
    field_changed: Option<String>,
    old_value: Option<String>,
    new_value: Option<String>,
    can_rollback: bool,
    error_message: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl RecordRow {
    fn read(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            execution_id: row.get(1)?,
            rule_id: row.get(2)?,
            user_id: row.get(3)?,
            entity_type: row.get(4)?,
            entity_id: row.get(5)?,
            platform_entity_id: row.get(6)?,
            entity_name: row.get(7)?,
            action_type: row.get(8)?,
            action_params: row.get(9)?,
            status: row.get(10)?,
            field_changed: row.get(11)?,
            old_value: row.get(12)?,
            new_value: row.get(13)?,
            can_rollback: row.get(14)?,
            error_message: row.get(15)?,
            created_at: row.get(16)?,
            updated_at: row.get(17)?,
        })
    }

    fn into_record(self) -> Result<ActionRecord> {
        Ok(ActionRecord {
            entity_type: parse_enum("entity_type", &self.entity_type)?,
            action_type: parse_enum("action_type", &self.action_type)?,
            status: parse_enum("status", &self.status)?,
            action_params: serde_json::from_str(&self.action_params)?,
            id: self.id,
            execution_id: self.execution_id,
            rule_id: self.rule_id,
            user_id: self.user_id,
            entity_id: self.entity_id,
            platform_entity_id: self.platform_entity_id,
            entity_name: self.entity_name,
            field_changed: self.field_changed,
            old_value: self.old_value,
            new_value: self.new_value,
            can_rollback: self.can_rollback,
            error_message: self.error_message,
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
        })
    }
}

impl AuditStore for SqliteStore {
    fn create_execution(&self, execution: &Execution) -> Result<()> {
        let conn = self.lock_conn();
        conn.execute(
            &format!(
                "INSERT INTO rule_executions ({EXECUTION_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ),
            params![
                execution.id,
                execution.rule_id,
                execution.user_id,
                execution.status.as_str(),
                to_millis(execution.started_at),
                execution.completed_at.map(to_millis),
                execution.entities_checked,
                execution.entities_matched,
                execution.actions_taken,
                execution.actions_failed,
                execution.duration_ms,
                execution.error_message,
            ],
        )?;
        Ok(())
    }

    fn finish_execution(&self, execution: &Execution) -> Result<()> {
        let conn = self.lock_conn();
        // Guarded on status so an execution is finalized exactly once.
        let changed = conn.execute(
            "UPDATE rule_executions SET
                status = ?1, completed_at = ?2, entities_checked = ?3, entities_matched = ?4,
                actions_taken = ?5, actions_failed = ?6, duration_ms = ?7, error_message = ?8
             WHERE id = ?9 AND status = 'running'",
            params![
                execution.status.as_str(),
                execution.completed_at.map(to_millis),
                execution.entities_checked,
                execution.entities_matched,
                execution.actions_taken,
                execution.actions_failed,
                execution.duration_ms,
                execution.error_message,
                execution.id,
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::Other(format!(
                "execution {} is missing or already finalized",
                execution.id
            )));
        }
        Ok(())
    }

    fn get_execution(&self, id: &str) -> Result<Option<Execution>> {
        let conn = self.lock_conn();
        let row = conn
            .query_row(
                &format!("SELECT {EXECUTION_COLUMNS} FROM rule_executions WHERE id = ?1"),
                params![id],
                ExecutionRow::read,
            )
            .optional()?;
        row.map(ExecutionRow::into_execution).transpose()
    }

    fn list_executions(&self, rule_id: &str, limit: usize) -> Result<Vec<Execution>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM rule_executions
             WHERE rule_id = ?1 ORDER BY started_at DESC, id DESC LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![rule_id, limit as i64], ExecutionRow::read)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(ExecutionRow::into_execution).collect()
    }

    fn insert_action_record(&self, record: &ActionRecord) -> Result<()> {
        let params_json = serde_json::to_string(&record.action_params)?;
        let conn = self.lock_conn();
        conn.execute(
            &format!(
                "INSERT INTO rule_action_records ({RECORD_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"
            ),
            params![
                record.id,
                record.execution_id,
                record.rule_id,
                record.user_id,
                record.entity_type.as_str(),
                record.entity_id,
                record.platform_entity_id,
                record.entity_name,
                record.action_type.as_str(),
                params_json,
                record.status.as_str(),
                record.field_changed,
                record.old_value,
                record.new_value,
                record.can_rollback,
                record.error_message,
                to_millis(record.created_at),
                to_millis(record.updated_at),
            ],
        )?;
        Ok(())
    }

    fn update_action_record(&self, record: &ActionRecord) -> Result<()> {
        let conn = self.lock_conn();
        let changed = conn.execute(
            "UPDATE rule_action_records SET
                status = ?1, field_changed = ?2, old_value = ?3, new_value = ?4,
                can_rollback = ?5, error_message = ?6, updated_at = ?7
             WHERE id = ?8",
            params![
                record.status.as_str(),
                record.field_changed,
                record.old_value,
                record.new_value,
                record.can_rollback,
                record.error_message,
                to_millis(record.updated_at),
                record.id,
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound {
                entity: "action_record",
                id: record.id.clone(),
            });
        }
        Ok(())
    }

    fn get_action_record(&self, id: &str) -> Result<Option<ActionRecord>> {
        let conn = self.lock_conn();
        let row = conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM rule_action_records WHERE id = ?1"),
                params![id],
                RecordRow::read,
            )
            .optional()?;
        row.map(RecordRow::into_record).transpose()
    }

    fn list_action_records(&self, execution_id: &str) -> Result<Vec<ActionRecord>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM rule_action_records
             WHERE execution_id = ?1 ORDER BY created_at ASC, id ASC"
        ))?;
        let rows = stmt
            .query_map(params![execution_id], RecordRow::read)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(RecordRow::into_record).collect()
    }

    fn prune_history(&self, before: DateTime<Utc>) -> Result<u64> {
        let cutoff = to_millis(before);
        let conn = self.lock_conn();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM rule_action_records WHERE execution_id IN
                (SELECT id FROM rule_executions WHERE started_at < ?1 AND status != 'running')",
            params![cutoff],
        )?;
        let removed = tx.execute(
            "DELETE FROM rule_executions WHERE started_at < ?1 AND status != 'running'",
            params![cutoff],
        )?;
        tx.commit()?;

        if removed > 0 {
            tracing::info!(removed, "Pruned rule execution history");
        }
        Ok(removed as u64)
    }
}
