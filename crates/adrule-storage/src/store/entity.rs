use adrule_common::types::{Entity, EntityStatus};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::{from_millis, parse_enum, to_millis, SqliteStore};
use crate::error::{Result, StorageError};
use crate::{EntityFilter, EntityStore};

const ENTITY_COLUMNS: &str = "id, user_id, entity_type, platform, platform_entity_id, account_id,
    name, status, daily_budget, deleted_at, created_at, updated_at";

struct EntityRow {
    id: String,
    user_id: String,
    entity_type: String,
    platform: String,
    platform_entity_id: String,
    account_id: Option<String>,
    name: String,
    status: String,
    daily_budget: Option<f64>,
    deleted_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl EntityRow {
    fn read(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            entity_type: row.get(2)?,
            platform: row.get(3)?,
            platform_entity_id: row.get(4)?,
            account_id: row.get(5)?,
            name: row.get(6)?,
            status: row.get(7)?,
            daily_budget: row.get(8)?,
            deleted_at: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    fn into_entity(self) -> Result<Entity> {
        Ok(Entity {
            entity_type: parse_enum("entity_type", &self.entity_type)?,
            status: parse_enum("status", &self.status)?,
            id: self.id,
            user_id: self.user_id,
            platform: self.platform,
            platform_entity_id: self.platform_entity_id,
            account_id: self.account_id,
            name: self.name,
            daily_budget: self.daily_budget,
            deleted_at: self.deleted_at.map(from_millis),
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
        })
    }
}

impl EntityStore for SqliteStore {
    fn list_active_entities(
        &self,
        filter: &EntityFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Entity>> {
        let mut sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM ad_entities
             WHERE user_id = ?1 AND platform = ?2 AND entity_type = ?3 AND deleted_at IS NULL"
        );
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![
            Box::new(filter.user_id.clone()),
            Box::new(filter.platform.clone()),
            Box::new(filter.entity_type.as_str()),
        ];
        if let Some(account_id) = &filter.account_id {
            values.push(Box::new(account_id.clone()));
            sql.push_str(&format!(" AND account_id = ?{}", values.len()));
        }
        values.push(Box::new(limit as i64));
        let limit_idx = values.len();
        values.push(Box::new(offset as i64));
        let offset_idx = values.len();
        sql.push_str(&format!(
            " ORDER BY id ASC LIMIT ?{limit_idx} OFFSET ?{offset_idx}"
        ));

        let conn = self.lock_conn();
        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            values.iter().map(|v| v.as_ref()).collect();
        let rows = stmt
            .query_map(param_refs.as_slice(), EntityRow::read)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(EntityRow::into_entity).collect()
    }

    fn get_entity(&self, id: &str) -> Result<Option<Entity>> {
        let conn = self.lock_conn();
        let row = conn
            .query_row(
                &format!("SELECT {ENTITY_COLUMNS} FROM ad_entities WHERE id = ?1"),
                params![id],
                EntityRow::read,
            )
            .optional()?;
        row.map(EntityRow::into_entity).transpose()
    }

    fn upsert_entity(&self, entity: &Entity) -> Result<()> {
        let conn = self.lock_conn();
        conn.execute(
            "INSERT OR REPLACE INTO ad_entities (id, user_id, entity_type, platform,
                platform_entity_id, account_id, name, status, daily_budget, deleted_at,
                created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                entity.id,
                entity.user_id,
                entity.entity_type.as_str(),
                entity.platform,
                entity.platform_entity_id,
                entity.account_id,
                entity.name,
                entity.status.as_str(),
                entity.daily_budget,
                entity.deleted_at.map(to_millis),
                to_millis(entity.created_at),
                to_millis(entity.updated_at),
            ],
        )?;
        Ok(())
    }

    fn update_entity_status(&self, id: &str, status: EntityStatus) -> Result<()> {
        let conn = self.lock_conn();
        let changed = conn.execute(
            "UPDATE ad_entities SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), to_millis(Utc::now()), id],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound {
                entity: "ad_entity",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    fn update_entity_budget(&self, id: &str, amount: f64) -> Result<()> {
        let conn = self.lock_conn();
        let changed = conn.execute(
            "UPDATE ad_entities SET daily_budget = ?1, updated_at = ?2 WHERE id = ?3",
            params![amount, to_millis(Utc::now()), id],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound {
                entity: "ad_entity",
                id: id.to_string(),
            });
        }
        Ok(())
    }
}
