use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use adrule_common::types::{
    Action, ActionKind, ActionRecord, ActionStatus, BudgetAdjustment, BudgetChangeType, Entity,
    EntityStatus, EntityType, NotificationTemplate, Rule,
};
use adrule_platform::error::PlatformError;
use adrule_platform::{to_minor_units, PlatformRegistry, PlatformStatus};
use adrule_storage::{AuditStore, EntityStore, NotificationSink};
use chrono::Utc;

use crate::error::{EngineError, Result};

/// Computes the budget an `adjust_budget` action moves to: percent or
/// absolute change, clamped to the optional bounds, rounded to cents and
/// never negative.
///
/// # Examples
///
/// ```
/// use adrule_common::types::{BudgetAdjustment, BudgetChangeType};
/// use adrule_engine::executor::compute_new_budget;
///
/// let raise = BudgetAdjustment {
///     budget_change_type: BudgetChangeType::Percent,
///     budget_change_value: 20.0,
///     min_budget: None,
///     max_budget: None,
/// };
/// assert_eq!(compute_new_budget(100.0, &raise), 120.0);
/// ```
pub fn compute_new_budget(current: f64, adjustment: &BudgetAdjustment) -> f64 {
    let mut budget = match adjustment.budget_change_type {
        BudgetChangeType::Percent => current * (1.0 + adjustment.budget_change_value / 100.0),
        BudgetChangeType::Absolute => current + adjustment.budget_change_value,
    };
    if let Some(min) = adjustment.min_budget {
        budget = budget.max(min);
    }
    if let Some(max) = adjustment.max_budget {
        budget = budget.min(max);
    }
    ((budget * 100.0).round() / 100.0).max(0.0)
}

fn format_amount(amount: f64) -> String {
    format!("{amount:.2}")
}

/// Result of one attempted action; the record itself is already persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub record_id: String,
    pub status: ActionStatus,
    pub error: Option<String>,
}

impl ActionOutcome {
    pub fn is_applied(&self) -> bool {
        self.status == ActionStatus::Applied
    }
}

/// What an applied action changed, copied onto its audit record.
struct Change {
    field: Option<&'static str>,
    old_value: Option<String>,
    new_value: Option<String>,
    can_rollback: bool,
}

/// Applies rule actions to entities through the platform clients and
/// writes one audit record per attempt.
#[derive(Clone)]
pub struct ActionExecutor {
    entities: Arc<dyn EntityStore>,
    audit: Arc<dyn AuditStore>,
    notifier: Arc<dyn NotificationSink>,
    platforms: PlatformRegistry,
    call_timeout: Duration,
}

impl ActionExecutor {
    pub fn new(
        entities: Arc<dyn EntityStore>,
        audit: Arc<dyn AuditStore>,
        notifier: Arc<dyn NotificationSink>,
        platforms: PlatformRegistry,
        call_timeout: Duration,
    ) -> Self {
        Self {
            entities,
            audit,
            notifier,
            platforms,
            call_timeout,
        }
    }

    /// Attempts `action` on `entity`.
    ///
    /// A pending record is written before anything else and finalized as
    /// applied or failed afterwards. Platform failures, timeouts and invalid
    /// targets produce a failed outcome; only audit-store failures are
    /// returned as errors. On success `entity` reflects the new state.
    pub async fn execute(
        &self,
        rule: &Rule,
        entity: &mut Entity,
        action: &Action,
        execution_id: &str,
    ) -> Result<ActionOutcome> {
        let now = Utc::now();
        let mut record = ActionRecord {
            id: adrule_common::id::next_id(),
            execution_id: execution_id.to_string(),
            rule_id: rule.id.clone(),
            user_id: rule.user_id.clone(),
            entity_type: entity.entity_type,
            entity_id: entity.id.clone(),
            platform_entity_id: entity.platform_entity_id.clone(),
            entity_name: entity.name.clone(),
            action_type: action.kind(),
            action_params: serde_json::to_value(action)?,
            status: ActionStatus::Pending,
            field_changed: None,
            old_value: None,
            new_value: None,
            can_rollback: false,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        self.audit.insert_action_record(&record)?;

        let result = match action {
            Action::PauseEntity => self.set_status(rule, entity, EntityStatus::Paused).await,
            Action::ResumeEntity => self.set_status(rule, entity, EntityStatus::Active).await,
            Action::AdjustBudget(adjustment) => self.adjust_budget(rule, entity, adjustment).await,
            Action::SendNotification(template) => {
                self.notify(rule, entity, template, execution_id)
            }
        };

        match result {
            Ok(change) => {
                record.status = ActionStatus::Applied;
                record.field_changed = change.field.map(str::to_string);
                record.old_value = change.old_value;
                record.new_value = change.new_value;
                record.can_rollback = change.can_rollback;
                tracing::info!(
                    rule_id = %rule.id,
                    entity_id = %entity.id,
                    action = %record.action_type,
                    "Action applied"
                );
            }
            Err(message) => {
                record.status = ActionStatus::Failed;
                record.error_message = Some(message);
                tracing::warn!(
                    rule_id = %rule.id,
                    entity_id = %entity.id,
                    action = %record.action_type,
                    error = record.error_message.as_deref().unwrap_or_default(),
                    "Action failed"
                );
            }
        }
        record.updated_at = Utc::now();
        self.audit.update_action_record(&record)?;

        Ok(ActionOutcome {
            record_id: record.id,
            status: record.status,
            error: record.error_message,
        })
    }

    /// Runs a platform call under the configured deadline.
    async fn call<F>(&self, platform: &str, fut: F) -> std::result::Result<(), PlatformError>
    where
        F: Future<Output = adrule_platform::error::Result<()>>,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(PlatformError::Timeout {
                platform: platform.to_string(),
                secs: self.call_timeout.as_secs(),
            }),
        }
    }

    async fn set_status(
        &self,
        rule: &Rule,
        entity: &mut Entity,
        target: EntityStatus,
    ) -> std::result::Result<Change, String> {
        let client = self.platforms.get(&entity.platform).map_err(|e| e.to_string())?;
        let wire = match target {
            EntityStatus::Paused => PlatformStatus::Paused,
            _ => PlatformStatus::Active,
        };
        self.call(
            &entity.platform,
            client.set_status(&rule.user_id, &entity.platform_entity_id, wire),
        )
        .await
        .map_err(|e| e.to_string())?;

        let old = entity.status;
        if let Err(e) = self.entities.update_entity_status(&entity.id, target) {
            tracing::error!(entity_id = %entity.id, error = %e, "Failed to mirror entity status");
        }
        entity.status = target;

        Ok(Change {
            field: Some("status"),
            old_value: Some(old.as_str().to_string()),
            new_value: Some(target.as_str().to_string()),
            can_rollback: false,
        })
    }

    async fn adjust_budget(
        &self,
        rule: &Rule,
        entity: &mut Entity,
        adjustment: &BudgetAdjustment,
    ) -> std::result::Result<Change, String> {
        if entity.entity_type == EntityType::Ad {
            return Err("adjust_budget is not supported for ad entities".to_string());
        }
        let current = entity
            .daily_budget
            .ok_or_else(|| format!("entity {} has no daily budget", entity.id))?;
        let new_budget = compute_new_budget(current, adjustment);

        let client = self.platforms.get(&entity.platform).map_err(|e| e.to_string())?;
        self.call(
            &entity.platform,
            client.set_daily_budget(
                &rule.user_id,
                &entity.platform_entity_id,
                to_minor_units(new_budget),
            ),
        )
        .await
        .map_err(|e| e.to_string())?;

        if let Err(e) = self.entities.update_entity_budget(&entity.id, new_budget) {
            tracing::error!(entity_id = %entity.id, error = %e, "Failed to mirror entity budget");
        }
        entity.daily_budget = Some(new_budget);

        Ok(Change {
            field: Some("daily_budget"),
            old_value: Some(format_amount(current)),
            new_value: Some(format_amount(new_budget)),
            can_rollback: true,
        })
    }

    fn notify(
        &self,
        rule: &Rule,
        entity: &Entity,
        template: &NotificationTemplate,
        execution_id: &str,
    ) -> std::result::Result<Change, String> {
        let title = template
            .title
            .clone()
            .unwrap_or_else(|| format!("Rule \"{}\" triggered", rule.name));
        let message = template.message.clone().unwrap_or_else(|| {
            format!(
                "{} \"{}\" matched the conditions of rule \"{}\"",
                entity.entity_type, entity.name, rule.name
            )
        });
        let metadata = serde_json::json!({
            "rule_id": rule.id,
            "execution_id": execution_id,
            "entity_id": entity.id,
            "platform_entity_id": entity.platform_entity_id,
        });
        self.notifier
            .notify(&rule.user_id, &title, &message, &metadata)
            .map_err(|e| e.to_string())?;

        Ok(Change {
            field: None,
            old_value: None,
            new_value: None,
            can_rollback: false,
        })
    }

    /// Restores the previous budget of an applied, rollback-eligible action
    /// and marks its record `rolled_back`.
    pub async fn rollback(&self, record_id: &str) -> Result<ActionRecord> {
        let mut record =
            self.audit
                .get_action_record(record_id)?
                .ok_or_else(|| EngineError::NotFound {
                    entity: "action_record",
                    id: record_id.to_string(),
                })?;

        let reject = |reason: &str| EngineError::NotRollbackable {
            record_id: record_id.to_string(),
            reason: reason.to_string(),
        };
        if record.status != ActionStatus::Applied {
            return Err(reject(&format!("status is {}", record.status)));
        }
        if !record.can_rollback || record.action_type != ActionKind::AdjustBudget {
            return Err(reject("action is not reversible"));
        }
        let previous: f64 = record
            .old_value
            .as_deref()
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| reject("previous budget is missing"))?;

        let entity =
            self.entities
                .get_entity(&record.entity_id)?
                .ok_or_else(|| EngineError::NotFound {
                    entity: "ad_entity",
                    id: record.entity_id.clone(),
                })?;
        let client = self.platforms.get(&entity.platform)?;
        self.call(
            &entity.platform,
            client.set_daily_budget(
                &record.user_id,
                &record.platform_entity_id,
                to_minor_units(previous),
            ),
        )
        .await?;
        self.entities.update_entity_budget(&entity.id, previous)?;

        record.status = ActionStatus::RolledBack;
        record.can_rollback = false;
        record.updated_at = Utc::now();
        self.audit.update_action_record(&record)?;

        tracing::info!(
            record_id,
            entity_id = %entity.id,
            budget = previous,
            "Action rolled back"
        );
        Ok(record)
    }
}
