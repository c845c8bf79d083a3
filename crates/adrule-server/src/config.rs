use std::path::PathBuf;

use adrule_engine::SchedulerConfig;
use adrule_platform::PlatformConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_db_file")]
    pub db_file: String,
    /// Executions and action records older than this are pruned.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub actions: ActionSettings,
    #[serde(default)]
    pub platforms: Vec<PlatformConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    #[serde(default = "default_scheduler_enabled")]
    pub enabled: bool,
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    #[serde(default = "default_max_concurrent_rules")]
    pub max_concurrent_rules: usize,
    #[serde(default = "default_max_rules_per_tick")]
    pub max_rules_per_tick: usize,
    #[serde(default = "default_claim_lease_secs")]
    pub claim_lease_secs: u64,
    #[serde(default = "default_entity_page_size")]
    pub entity_page_size: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            enabled: default_scheduler_enabled(),
            tick_secs: default_tick_secs(),
            max_concurrent_rules: default_max_concurrent_rules(),
            max_rules_per_tick: default_max_rules_per_tick(),
            claim_lease_secs: default_claim_lease_secs(),
            entity_page_size: default_entity_page_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSettings {
    /// Deadline for every outbound platform call.
    #[serde(default = "default_action_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ActionSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_action_timeout_secs(),
        }
    }
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_db_file() -> String {
    "adrule.db".to_string()
}

fn default_retention_days() -> u32 {
    90
}

fn default_scheduler_enabled() -> bool {
    true
}

fn default_tick_secs() -> u64 {
    60
}

fn default_max_concurrent_rules() -> usize {
    1
}

fn default_max_rules_per_tick() -> usize {
    100
}

fn default_claim_lease_secs() -> u64 {
    900
}

fn default_entity_page_size() -> usize {
    500
}

fn default_action_timeout_secs() -> u64 {
    30
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config '{}': {}", path, e))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config '{}': {}", path, e))?;
        Ok(config)
    }

    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.db_file)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_concurrent_rules: self.scheduler.max_concurrent_rules.max(1),
            max_rules_per_tick: self.scheduler.max_rules_per_tick,
            claim_lease: chrono::Duration::seconds(self.scheduler.claim_lease_secs as i64),
            entity_page_size: self.scheduler.entity_page_size,
            action_timeout: std::time::Duration::from_secs(self.actions.timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config.data_dir, "data");
        assert_eq!(config.db_path(), PathBuf::from("data").join("adrule.db"));
        assert_eq!(config.retention_days, 90);
        assert!(config.scheduler.enabled);
        assert_eq!(config.scheduler.tick_secs, 60);
        assert_eq!(config.scheduler.max_concurrent_rules, 1);
        assert_eq!(config.actions.timeout_secs, 30);
        assert!(config.platforms.is_empty());
    }

    #[test]
    fn full_config_parses() {
        let config: ServerConfig = toml::from_str(
            r#"
            data_dir = "/var/lib/adrule"
            retention_days = 30

            [scheduler]
            tick_secs = 15
            max_concurrent_rules = 4
            claim_lease_secs = 120

            [actions]
            timeout_secs = 10

            [[platforms]]
            name = "facebook"
            base_url = "https://graph.facebook.com/v19.0"
            request_timeout_secs = 20
            "#,
        )
        .unwrap();

        assert_eq!(config.retention_days, 30);
        assert_eq!(config.scheduler.entity_page_size, 500);
        assert_eq!(config.platforms.len(), 1);
        assert_eq!(config.platforms[0].kind, "graph");

        let scheduler = config.scheduler_config();
        assert_eq!(scheduler.max_concurrent_rules, 4);
        assert_eq!(scheduler.claim_lease, chrono::Duration::seconds(120));
        assert_eq!(scheduler.action_timeout, std::time::Duration::from_secs(10));
    }

    #[test]
    fn zero_concurrency_is_raised_to_one() {
        let config: ServerConfig = toml::from_str(
            r#"
            [scheduler]
            max_concurrent_rules = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.scheduler_config().max_concurrent_rules, 1);
    }
}
