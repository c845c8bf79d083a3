pub mod config;
pub mod credentials;
pub mod rule_seed;

use std::sync::Arc;

use adrule_engine::{EngineStores, RuleScheduler};
use adrule_platform::PlatformRegistry;
use adrule_storage::SqliteStore;

use crate::config::ServerConfig;
use crate::credentials::StoredTokens;

/// Opens (and creates if needed) the database under `data_dir`.
pub fn open_store(config: &ServerConfig) -> anyhow::Result<Arc<SqliteStore>> {
    let path = config.db_path();
    let store = SqliteStore::new(&path)
        .map_err(|e| anyhow::anyhow!("Failed to open database '{}': {}", path.display(), e))?;
    Ok(Arc::new(store))
}

/// Wires the configured platforms and the store into a scheduler.
pub fn build_scheduler(
    config: &ServerConfig,
    store: Arc<SqliteStore>,
) -> anyhow::Result<RuleScheduler> {
    let tokens = Arc::new(StoredTokens::new(store.clone()));
    let platforms = PlatformRegistry::from_configs(&config.platforms, tokens)?;
    if platforms.names().is_empty() {
        tracing::warn!("No platforms configured, every action will fail");
    } else {
        tracing::info!(platforms = ?platforms.names(), "Platform clients ready");
    }
    Ok(RuleScheduler::new(
        EngineStores::from_sqlite(store),
        platforms,
        config.scheduler_config(),
    ))
}
