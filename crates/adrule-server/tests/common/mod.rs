#![allow(dead_code)]

use std::sync::Arc;

use adrule_common::types::{DailyMetric, Entity, EntityStatus, EntityType};
use adrule_server::config::ServerConfig;
use adrule_server::open_store;
use adrule_storage::{EntityStore, MetricsStore, SqliteStore};
use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

pub struct TestContext {
    pub temp_dir: TempDir,
    pub config: ServerConfig,
    pub store: Arc<SqliteStore>,
}

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
}

/// A config with one Graph-style platform that has no stored credentials,
/// so every action fails before any request leaves the process.
pub fn build_test_context() -> Result<TestContext> {
    adrule_common::id::init(1, 1);
    let temp_dir = tempfile::tempdir()?;
    let config: ServerConfig = toml::from_str(&format!(
        r#"
        data_dir = "{}"

        [actions]
        timeout_secs = 5

        [[platforms]]
        name = "facebook"
        base_url = "http://127.0.0.1:9/v19.0"
        "#,
        temp_dir.path().display()
    ))?;
    let store = open_store(&config)?;
    Ok(TestContext {
        temp_dir,
        config,
        store,
    })
}

pub fn seed_campaign(store: &SqliteStore, id: &str, budget: f64, spend: f64, revenue: f64) {
    let now = fixed_now();
    store
        .upsert_entity(&Entity {
            id: id.to_string(),
            user_id: "user-1".to_string(),
            entity_type: EntityType::Campaign,
            platform: "facebook".to_string(),
            platform_entity_id: format!("fb-{id}"),
            account_id: None,
            name: format!("Campaign {id}"),
            status: EntityStatus::Active,
            daily_budget: Some(budget),
            deleted_at: None,
            created_at: now,
            updated_at: now,
        })
        .unwrap();
    store
        .upsert_daily_metric(&DailyMetric {
            entity_id: id.to_string(),
            date: now.date_naive(),
            spend,
            revenue,
            conversions: 1.0,
            clicks: 10,
            impressions: 1000,
        })
        .unwrap();
}
