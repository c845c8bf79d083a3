//! Automated rule execution for advertising entities.
//!
//! A pass of the [`scheduler::RuleScheduler`] claims every due rule, pulls
//! the entities it targets through the [`fetcher::EntityFetcher`], evaluates
//! the rule's conditions against windowed metrics
//! ([`metrics::MetricAggregator`], [`condition::ConditionEvaluator`]) and
//! applies the rule's actions to matching entities via the
//! [`executor::ActionExecutor`]. Every run leaves an execution record and
//! one action record per attempted action.

pub mod condition;
pub mod error;
pub mod executor;
pub mod fetcher;
pub mod metrics;
pub mod scheduler;


use std::sync::Arc;

use adrule_storage::{
    AuditStore, EntityStore, MetricsStore, NotificationSink, RuleStore, SqliteStore,
};

pub use error::{EngineError, Result};
pub use scheduler::{RuleScheduler, RunSummary, SchedulerConfig};

/// The collaborators the engine reads from and writes to.
#[derive(Clone)]
pub struct EngineStores {
    pub rules: Arc<dyn RuleStore>,
    pub entities: Arc<dyn EntityStore>,
    pub metrics: Arc<dyn MetricsStore>,
    pub audit: Arc<dyn AuditStore>,
    pub notifier: Arc<dyn NotificationSink>,
}

impl EngineStores {
    /// Backs every collaborator with the same SQLite store.
    pub fn from_sqlite(store: Arc<SqliteStore>) -> Self {
        Self {
            rules: store.clone(),
            entities: store.clone(),
            metrics: store.clone(),
            audit: store.clone(),
            notifier: store,
        }
    }
}
