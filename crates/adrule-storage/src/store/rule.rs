use adrule_common::types::Rule;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, TransactionBehavior};

use super::{from_millis, parse_enum, to_millis, SqliteStore};
use crate::error::Result;
use crate::{ClaimedRules, RuleRunUpdate, RuleStore, UnreadableRule};

const RULE_COLUMNS: &str = "id, user_id, name, status, entity_type, platform, account_id,
    condition_logic, check_frequency_minutes, max_actions_per_run, require_approval, dry_run,
    conditions_json, actions_json, last_executed_at, next_execution_at,
    total_executions, total_actions_taken, created_at, updated_at";

/// Column values of one `rules` row before enum and JSON decoding.
struct RuleRow {
    id: String,
    user_id: String,
    name: String,
    status: String,
    entity_type: String,
    platform: String,
    account_id: Option<String>,
    condition_logic: String,
    check_frequency_minutes: u32,
    max_actions_per_run: Option<u32>,
    require_approval: bool,
    dry_run: bool,
    conditions_json: String,
    actions_json: String,
    last_executed_at: Option<i64>,
    next_execution_at: Option<i64>,
    total_executions: i64,
    total_actions_taken: i64,
    created_at: i64,
    updated_at: i64,
}

impl RuleRow {
    fn read(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            status: row.get(3)?,
            entity_type: row.get(4)?,
            platform: row.get(5)?,
            account_id: row.get(6)?,
            condition_logic: row.get(7)?,
            check_frequency_minutes: row.get(8)?,
            max_actions_per_run: row.get(9)?,
            require_approval: row.get(10)?,
            dry_run: row.get(11)?,
            conditions_json: row.get(12)?,
            actions_json: row.get(13)?,
            last_executed_at: row.get(14)?,
            next_execution_at: row.get(15)?,
            total_executions: row.get(16)?,
            total_actions_taken: row.get(17)?,
            created_at: row.get(18)?,
            updated_at: row.get(19)?,
        })
    }

    fn into_rule(self) -> Result<Rule> {
        Ok(Rule {
            status: parse_enum("status", &self.status)?,
            entity_type: parse_enum("entity_type", &self.entity_type)?,
            condition_logic: parse_enum("condition_logic", &self.condition_logic)?,
            conditions: serde_json::from_str(&self.conditions_json)?,
            actions: serde_json::from_str(&self.actions_json)?,
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            platform: self.platform,
            account_id: self.account_id,
            check_frequency_minutes: self.check_frequency_minutes,
            max_actions_per_run: self.max_actions_per_run,
            require_approval: self.require_approval,
            dry_run: self.dry_run,
            last_executed_at: self.last_executed_at.map(from_millis),
            next_execution_at: self.next_execution_at.map(from_millis),
            total_executions: self.total_executions.max(0) as u64,
            total_actions_taken: self.total_actions_taken.max(0) as u64,
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
        })
    }
}

impl RuleStore for SqliteStore {
    fn insert_rule(&self, rule: &Rule) -> Result<()> {
        let conditions_json = serde_json::to_string(&rule.conditions)?;
        let actions_json = serde_json::to_string(&rule.actions)?;
        let conn = self.lock_conn();
        conn.execute(
            "INSERT INTO rules (id, user_id, name, status, entity_type, platform, account_id,
                condition_logic, check_frequency_minutes, max_actions_per_run, require_approval,
                dry_run, conditions_json, actions_json, last_executed_at, next_execution_at,
                total_executions, total_actions_taken, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
            params![
                rule.id,
                rule.user_id,
                rule.name,
                rule.status.as_str(),
                rule.entity_type.as_str(),
                rule.platform,
                rule.account_id,
                rule.condition_logic.as_str(),
                rule.check_frequency_minutes,
                rule.max_actions_per_run,
                rule.require_approval,
                rule.dry_run,
                conditions_json,
                actions_json,
                rule.last_executed_at.map(to_millis),
                rule.next_execution_at.map(to_millis),
                rule.total_executions as i64,
                rule.total_actions_taken as i64,
                to_millis(rule.created_at),
                to_millis(rule.updated_at),
            ],
        )?;
        Ok(())
    }

    fn get_rule(&self, id: &str) -> Result<Option<Rule>> {
        let conn = self.lock_conn();
        let row = conn
            .query_row(
                &format!("SELECT {RULE_COLUMNS} FROM rules WHERE id = ?1"),
                params![id],
                RuleRow::read,
            )
            .optional()?;
        row.map(RuleRow::into_rule).transpose()
    }

    fn list_rules(&self, user_id: &str) -> Result<Vec<Rule>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RULE_COLUMNS} FROM rules WHERE user_id = ?1 ORDER BY created_at ASC"
        ))?;
        let rows = stmt
            .query_map(params![user_id], RuleRow::read)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(RuleRow::into_rule).collect()
    }

    fn claim_due_rules(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: usize,
    ) -> Result<ClaimedRules> {
        let now_ms = to_millis(now);
        let mut conn = self.lock_conn();
        // IMMEDIATE takes the write lock up front so a second process cannot
        // select the same rows between our SELECT and UPDATE.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let rows = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {RULE_COLUMNS} FROM rules
                 WHERE status = 'active'
                   AND (next_execution_at IS NULL OR next_execution_at <= ?1)
                   AND (claimed_until IS NULL OR claimed_until <= ?1)
                 ORDER BY COALESCE(next_execution_at, 0) ASC, id ASC
                 LIMIT ?2"
            ))?;
            let rows = stmt
                .query_map(params![now_ms, limit as i64], RuleRow::read)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        {
            let mut claim = tx.prepare("UPDATE rules SET claimed_until = ?1 WHERE id = ?2")?;
            for row in &rows {
                claim.execute(params![to_millis(lease_until), row.id])?;
            }
        }
        tx.commit()?;

        let mut claimed = ClaimedRules::default();
        for row in rows {
            let id = row.id.clone();
            let user_id = row.user_id.clone();
            let name = row.name.clone();
            let check_frequency_minutes = row.check_frequency_minutes;
            match row.into_rule() {
                Ok(rule) => claimed.rules.push(rule),
                Err(e) => {
                    tracing::warn!(rule_id = %id, error = %e, "Claimed rule could not be decoded");
                    claimed.unreadable.push(UnreadableRule {
                        id,
                        user_id,
                        name,
                        check_frequency_minutes,
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(claimed)
    }

    fn complete_rule_run(&self, rule_id: &str, update: &RuleRunUpdate) -> Result<()> {
        let conn = self.lock_conn();
        let changed = conn.execute(
            "UPDATE rules SET
                last_executed_at = ?1,
                next_execution_at = ?2,
                total_executions = total_executions + 1,
                total_actions_taken = total_actions_taken + ?3,
                claimed_until = NULL,
                updated_at = ?1
             WHERE id = ?4",
            params![
                to_millis(update.executed_at),
                to_millis(update.next_execution_at),
                update.actions_taken as i64,
                rule_id,
            ],
        )?;
        if changed == 0 {
            return Err(crate::StorageError::NotFound {
                entity: "rule",
                id: rule_id.to_string(),
            });
        }
        Ok(())
    }
}
