//! Persistence for rules, mirrored advertising entities, daily metrics and
//! the execution audit trail.
//!
//! The engine only talks to the traits defined here. The default
//! implementation ([`store::SqliteStore`]) keeps everything in a single
//! SQLite database in WAL mode.

pub mod error;
pub mod store;


use adrule_common::types::{
    ActionRecord, DailyMetric, Entity, EntityStatus, EntityType, Execution, Rule,
};
use chrono::{DateTime, NaiveDate, Utc};

pub use error::{Result, StorageError};
pub use store::SqliteStore;

/// Selects the entities a rule applies to.
///
/// # Examples
///
/// ```
/// use adrule_common::types::EntityType;
/// use adrule_storage::EntityFilter;
///
/// let filter = EntityFilter {
///     user_id: "user-1".into(),
///     platform: "facebook".into(),
///     entity_type: EntityType::Campaign,
///     account_id: None,
/// };
/// assert_eq!(filter.entity_type, EntityType::Campaign);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityFilter {
    pub user_id: String,
    pub platform: String,
    pub entity_type: EntityType,
    pub account_id: Option<String>,
}

impl EntityFilter {
    pub fn for_rule(rule: &Rule) -> Self {
        Self {
            user_id: rule.user_id.clone(),
            platform: rule.platform.clone(),
            entity_type: rule.entity_type,
            account_id: rule.account_id.clone(),
        }
    }
}

/// Scheduling write applied to a rule once per run.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleRunUpdate {
    pub executed_at: DateTime<Utc>,
    pub next_execution_at: DateTime<Utc>,
    /// Added to `total_actions_taken`; zero for failed runs.
    pub actions_taken: u64,
}

/// A due rule whose stored definition no longer decodes, e.g. an operator
/// this build does not know. It is leased like any other claimed rule so the
/// engine can record the failure and reschedule it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreadableRule {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub check_frequency_minutes: u32,
    pub error: String,
}

/// Rules leased by one [`RuleStore::claim_due_rules`] call.
#[derive(Debug, Clone, Default)]
pub struct ClaimedRules {
    /// Decoded rules in claim order.
    pub rules: Vec<Rule>,
    pub unreadable: Vec<UnreadableRule>,
}

impl ClaimedRules {
    pub fn len(&self) -> usize {
        self.rules.len() + self.unreadable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Daily performance rows per entity.
pub trait MetricsStore: Send + Sync {
    /// Returns rows for `entity_id` whose date is within `[from, to]`,
    /// oldest first.
    fn query_daily_metrics(
        &self,
        entity_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyMetric>>;

    /// Inserts or replaces the row for `(entity_id, date)`.
    fn upsert_daily_metric(&self, metric: &DailyMetric) -> Result<()>;
}

/// Locally mirrored advertising entities.
pub trait EntityStore: Send + Sync {
    /// Non-deleted entities matching `filter`, ordered by id so that
    /// `limit`/`offset` paging is stable.
    fn list_active_entities(
        &self,
        filter: &EntityFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Entity>>;

    fn get_entity(&self, id: &str) -> Result<Option<Entity>>;

    fn upsert_entity(&self, entity: &Entity) -> Result<()>;

    fn update_entity_status(&self, id: &str, status: EntityStatus) -> Result<()>;

    fn update_entity_budget(&self, id: &str, amount: f64) -> Result<()>;
}

/// Rule definitions and their scheduling state.
pub trait RuleStore: Send + Sync {
    fn insert_rule(&self, rule: &Rule) -> Result<()>;

    fn get_rule(&self, id: &str) -> Result<Option<Rule>>;

    fn list_rules(&self, user_id: &str) -> Result<Vec<Rule>>;

    /// Atomically selects up to `limit` due, unclaimed rules and leases them
    /// until `lease_until` so that overlapping invocations skip them.
    ///
    /// Each row is decoded on its own: a rule that cannot be decoded is still
    /// leased and comes back in [`ClaimedRules::unreadable`] instead of
    /// failing the whole claim.
    fn claim_due_rules(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: usize,
    ) -> Result<ClaimedRules>;

    /// Single commit point of a run: advances the schedule, bumps the
    /// lifetime counters and releases the lease.
    fn complete_rule_run(&self, rule_id: &str, update: &RuleRunUpdate) -> Result<()>;
}

/// Append-only history of executions and attempted actions.
pub trait AuditStore: Send + Sync {
    fn create_execution(&self, execution: &Execution) -> Result<()>;

    fn finish_execution(&self, execution: &Execution) -> Result<()>;

    fn get_execution(&self, id: &str) -> Result<Option<Execution>>;

    fn list_executions(&self, rule_id: &str, limit: usize) -> Result<Vec<Execution>>;

    fn insert_action_record(&self, record: &ActionRecord) -> Result<()>;

    fn update_action_record(&self, record: &ActionRecord) -> Result<()>;

    fn get_action_record(&self, id: &str) -> Result<Option<ActionRecord>>;

    fn list_action_records(&self, execution_id: &str) -> Result<Vec<ActionRecord>>;

    /// Deletes executions started before `before` together with their
    /// action records. Returns the number of executions removed.
    fn prune_history(&self, before: DateTime<Utc>) -> Result<u64>;
}

/// Destination for user-facing notifications.
pub trait NotificationSink: Send + Sync {
    fn notify(
        &self,
        user_id: &str,
        title: &str,
        message: &str,
        metadata: &serde_json::Value,
    ) -> Result<()>;
}

/// Bearer tokens for platform connections. Token refresh happens elsewhere;
/// the engine only reads what is stored.
pub trait CredentialStore: Send + Sync {
    fn access_token(&self, user_id: &str, platform: &str) -> Result<Option<String>>;
}
