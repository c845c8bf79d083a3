use std::collections::HashSet;

use adrule_common::types::{Action, Condition, ConditionLogic, EntityType, Rule, RuleStatus};
use adrule_storage::RuleStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// JSON seed file accepted by `init-rules`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesSeedFile {
    pub rules: Vec<SeedRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedRule {
    pub user_id: String,
    pub name: String,
    #[serde(default = "default_seed_status")]
    pub status: RuleStatus,
    pub entity_type: EntityType,
    pub platform: String,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub condition_logic: ConditionLogic,
    #[serde(default = "default_check_frequency_minutes")]
    pub check_frequency_minutes: u32,
    #[serde(default, alias = "max_daily_actions")]
    pub max_actions_per_run: Option<u32>,
    #[serde(default)]
    pub require_approval: bool,
    #[serde(default)]
    pub dry_run: bool,
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
}

fn default_seed_status() -> RuleStatus {
    RuleStatus::Active
}

fn default_check_frequency_minutes() -> u32 {
    60
}

impl SeedRule {
    /// New rules are due immediately.
    fn into_rule(self, now: DateTime<Utc>) -> Rule {
        Rule {
            id: adrule_common::id::next_id(),
            user_id: self.user_id,
            name: self.name,
            status: self.status,
            entity_type: self.entity_type,
            platform: self.platform,
            account_id: self.account_id,
            condition_logic: self.condition_logic,
            check_frequency_minutes: self.check_frequency_minutes.max(1),
            max_actions_per_run: self.max_actions_per_run,
            require_approval: self.require_approval,
            dry_run: self.dry_run,
            conditions: self.conditions,
            actions: self.actions,
            last_executed_at: None,
            next_execution_at: Some(now),
            total_executions: 0,
            total_actions_taken: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Result of [`import_rules`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub created: usize,
    pub skipped: usize,
}

/// Inserts every seed rule whose name is not yet taken for its user.
pub fn import_rules(
    store: &dyn RuleStore,
    seed: RulesSeedFile,
    now: DateTime<Utc>,
) -> anyhow::Result<ImportSummary> {
    let mut summary = ImportSummary::default();
    let mut existing: HashSet<(String, String)> = HashSet::new();
    let mut loaded_users: HashSet<String> = HashSet::new();

    for seed_rule in seed.rules {
        if loaded_users.insert(seed_rule.user_id.clone()) {
            for rule in store.list_rules(&seed_rule.user_id)? {
                existing.insert((rule.user_id, rule.name));
            }
        }

        let key = (seed_rule.user_id.clone(), seed_rule.name.clone());
        if existing.contains(&key) {
            tracing::warn!(
                user_id = %seed_rule.user_id,
                name = %seed_rule.name,
                "Rule already exists, skipping"
            );
            summary.skipped += 1;
            continue;
        }
        if seed_rule.conditions.is_empty() || seed_rule.actions.is_empty() {
            tracing::warn!(
                user_id = %seed_rule.user_id,
                name = %seed_rule.name,
                "Rule has no conditions or no actions, skipping"
            );
            summary.skipped += 1;
            continue;
        }

        let rule = seed_rule.into_rule(now);
        store.insert_rule(&rule)?;
        tracing::info!(rule_id = %rule.id, name = %rule.name, "Imported rule");
        existing.insert(key);
        summary.created += 1;
    }

    Ok(summary)
}
