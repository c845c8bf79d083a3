use adrule_storage::AuditStore;
use anyhow::Result;
use chrono::Utc;
use tokio::signal;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing_subscriber::EnvFilter;

use adrule_server::config::ServerConfig;
use adrule_server::rule_seed::{self, RulesSeedFile};
use adrule_server::{build_scheduler, open_store};

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  adrule-server [config.toml]                              Run the rule scheduler");
    eprintln!("  adrule-server run-once <config.toml>                     Run due rules once and print a JSON summary");
    eprintln!("  adrule-server init-rules <config.toml> <seed.json>       Import rules from a seed file");
    eprintln!("  adrule-server rollback <config.toml> <action_record_id>  Revert a budget change");
}

#[tokio::main]
async fn main() -> Result<()> {
    adrule_common::id::init(1, 1);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("adrule=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("run-once") => {
            let config_path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("run-once requires <config.toml> argument")
            })?;
            run_once(config_path).await
        }
        Some("init-rules") => {
            let config_path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("init-rules requires <config.toml> and <seed.json> arguments")
            })?;
            let seed_path = args.get(3).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("init-rules requires <seed.json> argument")
            })?;
            run_init_rules(config_path, seed_path)
        }
        Some("rollback") => {
            let config_path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("rollback requires <config.toml> and <action_record_id> arguments")
            })?;
            let record_id = args.get(3).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("rollback requires <action_record_id> argument")
            })?;
            run_rollback(config_path, record_id).await
        }
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        _ => {
            let config_path = args
                .get(1)
                .map(|s| s.as_str())
                .unwrap_or("config/server.toml");
            run_server(config_path).await
        }
    }
}

#[allow(clippy::print_stdout)]
async fn run_once(config_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    let store = open_store(&config)?;
    let scheduler = build_scheduler(&config, store)?;

    let summary = scheduler.run_due_rules().await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn run_init_rules(config_path: &str, seed_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    let content = std::fs::read_to_string(seed_path)
        .map_err(|e| anyhow::anyhow!("Failed to read seed file '{}': {}", seed_path, e))?;
    let seed: RulesSeedFile = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse seed file '{}': {}", seed_path, e))?;

    let store = open_store(&config)?;
    let summary = rule_seed::import_rules(store.as_ref(), seed, Utc::now())?;
    tracing::info!(
        created = summary.created,
        skipped = summary.skipped,
        "Rule import finished"
    );
    Ok(())
}

#[allow(clippy::print_stdout)]
async fn run_rollback(config_path: &str, record_id: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    let store = open_store(&config)?;
    let scheduler = build_scheduler(&config, store)?;

    let record = scheduler.executor().rollback(record_id).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

async fn run_server(config_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    let store = open_store(&config)?;
    tracing::info!(db = %store.db_path().display(), "Database opened");

    // Periodic history pruning
    let retention_days = config.retention_days;
    let cleanup_store = store.clone();
    let cleanup_handle = tokio::spawn(async move {
        let mut tick = interval(Duration::from_secs(3600));
        loop {
            tick.tick().await;
            let before = Utc::now() - chrono::Duration::days(i64::from(retention_days));
            match cleanup_store.prune_history(before) {
                Ok(removed) if removed > 0 => {
                    tracing::info!(removed, "Pruned expired execution history")
                }
                Err(e) => tracing::error!(error = %e, "History pruning failed"),
                _ => {}
            }
        }
    });

    let scheduler_handle = if config.scheduler.enabled {
        let scheduler = build_scheduler(&config, store.clone())?;
        let tick_secs = config.scheduler.tick_secs.max(1);
        Some(tokio::spawn(async move {
            let mut tick = interval(Duration::from_secs(tick_secs));
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                if let Err(e) = scheduler.run_due_rules().await {
                    tracing::error!(error = %e, "Rule pass failed");
                }
            }
        }))
    } else {
        tracing::info!("Rule scheduler disabled");
        None
    };

    tracing::info!(tick_secs = config.scheduler.tick_secs, "Server started");

    signal::ctrl_c().await?;
    tracing::info!("Shutting down gracefully");

    cleanup_handle.abort();
    if let Some(h) = scheduler_handle {
        h.abort();
    }
    tracing::info!("Server stopped");

    Ok(())
}
