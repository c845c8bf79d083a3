use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Implements `as_str`, `Display` and `FromStr` for a field-less enum using
/// the same spelling as its serde representation. Stores persist these
/// strings verbatim.
macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(format!(concat!("unknown ", stringify!($name), ": {}"), s)),
                }
            }
        }
    };
}

// ---- Rule aggregate ----

/// Lifecycle state of a rule. Only `Active` rules are ever picked up by the
/// scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Active,
    Paused,
    Disabled,
}

string_enum!(RuleStatus {
    Active => "active",
    Paused => "paused",
    Disabled => "disabled",
});

/// Advertising object kind a rule targets.
///
/// # Examples
///
/// ```
/// use adrule_common::types::EntityType;
///
/// let kind: EntityType = "ad_group".parse().unwrap();
/// assert_eq!(kind, EntityType::AdGroup);
/// assert_eq!(kind.to_string(), "ad_group");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Campaign,
    AdGroup,
    Ad,
}

string_enum!(EntityType {
    Campaign => "campaign",
    AdGroup => "ad_group",
    Ad => "ad",
});

/// How a rule combines the results of its conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConditionLogic {
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
}

string_enum!(ConditionLogic {
    And => "AND",
    Or => "OR",
});

/// Metric a condition reads from an aggregated window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Spend,
    Revenue,
    Conversions,
    Clicks,
    Impressions,
    Roas,
    Cpa,
    Cpc,
    Ctr,
    Profit,
    ProfitMargin,
}

string_enum!(MetricKind {
    Spend => "spend",
    Revenue => "revenue",
    Conversions => "conversions",
    Clicks => "clicks",
    Impressions => "impressions",
    Roas => "roas",
    Cpa => "cpa",
    Cpc => "cpc",
    Ctr => "ctr",
    Profit => "profit",
    ProfitMargin => "profit_margin",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    GreaterThan,
    LessThan,
    Equals,
    NotEquals,
    GreaterOrEqual,
    LessOrEqual,
    Between,
}

string_enum!(ConditionOperator {
    GreaterThan => "greater_than",
    LessThan => "less_than",
    Equals => "equals",
    NotEquals => "not_equals",
    GreaterOrEqual => "greater_or_equal",
    LessOrEqual => "less_or_equal",
    Between => "between",
});

/// A single metric threshold predicate over a lookback window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub metric_type: MetricKind,
    pub operator: ConditionOperator,
    pub threshold_value: f64,
    /// Upper bound, only read by [`ConditionOperator::Between`].
    #[serde(default)]
    pub threshold_max: Option<f64>,
    #[serde(default = "default_time_window_days")]
    pub time_window_days: u32,
}

fn default_time_window_days() -> u32 {
    7
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetChangeType {
    Percent,
    Absolute,
}

string_enum!(BudgetChangeType {
    Percent => "percent",
    Absolute => "absolute",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetAdjustment {
    pub budget_change_type: BudgetChangeType,
    pub budget_change_value: f64,
    #[serde(default)]
    pub min_budget: Option<f64>,
    #[serde(default)]
    pub max_budget: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NotificationTemplate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Effect applied to an entity whose conditions matched.
///
/// Serialized with an `action_type` tag so rule JSON reads
/// `{"action_type": "adjust_budget", "budget_change_type": "percent", ...}`.
///
/// # Examples
///
/// ```
/// use adrule_common::types::{Action, ActionKind};
///
/// let action: Action = serde_json::from_str(r#"{"action_type": "pause_entity"}"#).unwrap();
/// assert_eq!(action.kind(), ActionKind::PauseEntity);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action_type", rename_all = "snake_case")]
pub enum Action {
    PauseEntity,
    ResumeEntity,
    AdjustBudget(BudgetAdjustment),
    SendNotification(NotificationTemplate),
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::PauseEntity => ActionKind::PauseEntity,
            Action::ResumeEntity => ActionKind::ResumeEntity,
            Action::AdjustBudget(_) => ActionKind::AdjustBudget,
            Action::SendNotification(_) => ActionKind::SendNotification,
        }
    }
}

/// Discriminant of [`Action`], stored on audit rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    PauseEntity,
    ResumeEntity,
    AdjustBudget,
    SendNotification,
}

string_enum!(ActionKind {
    PauseEntity => "pause_entity",
    ResumeEntity => "resume_entity",
    AdjustBudget => "adjust_budget",
    SendNotification => "send_notification",
});

/// A user-owned automation policy: conditions, actions and schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub status: RuleStatus,
    pub entity_type: EntityType,
    pub platform: String,
    /// Restricts the rule to a single ad account when set.
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub condition_logic: ConditionLogic,
    pub check_frequency_minutes: u32,
    /// Cap on successful actions within one execution. Despite the legacy
    /// `max_daily_actions` name it is not carried across runs.
    #[serde(default, alias = "max_daily_actions")]
    pub max_actions_per_run: Option<u32>,
    #[serde(default)]
    pub require_approval: bool,
    #[serde(default)]
    pub dry_run: bool,
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
    #[serde(default)]
    pub last_executed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_execution_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_executions: u64,
    #[serde(default)]
    pub total_actions_taken: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---- Entities and metrics ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    Active,
    Paused,
    Archived,
}

string_enum!(EntityStatus {
    Active => "active",
    Paused => "paused",
    Archived => "archived",
});

/// An advertising object (campaign, ad group or ad) mirrored locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub user_id: String,
    pub entity_type: EntityType,
    pub platform: String,
    /// Identifier used by the advertising platform's API.
    pub platform_entity_id: String,
    #[serde(default)]
    pub account_id: Option<String>,
    pub name: String,
    pub status: EntityStatus,
    /// Daily budget in major currency units.
    #[serde(default)]
    pub daily_budget: Option<f64>,
    /// Soft-delete marker; deleted entities are never targeted.
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One day of raw performance numbers for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyMetric {
    pub entity_id: String,
    pub date: NaiveDate,
    pub spend: f64,
    /// Revenue or attributed conversion value.
    pub revenue: f64,
    pub conversions: f64,
    pub clicks: u64,
    pub impressions: u64,
}

// ---- Audit trail ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

string_enum!(ExecutionStatus {
    Running => "running",
    Completed => "completed",
    Failed => "failed",
});

/// Audit record of one run of one rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub rule_id: String,
    pub user_id: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub entities_checked: u32,
    pub entities_matched: u32,
    pub actions_taken: u32,
    pub actions_failed: u32,
    pub duration_ms: Option<i64>,
    pub error_message: Option<String>,
}

impl Execution {
    pub fn start(rule: &Rule, now: DateTime<Utc>) -> Self {
        Self::for_rule_id(&rule.id, &rule.user_id, now)
    }

    /// Starts an execution for a rule known only by id, e.g. one whose
    /// stored definition can no longer be decoded.
    pub fn for_rule_id(rule_id: &str, user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: crate::id::next_id(),
            rule_id: rule_id.to_string(),
            user_id: user_id.to_string(),
            status: ExecutionStatus::Running,
            started_at: now,
            completed_at: None,
            entities_checked: 0,
            entities_matched: 0,
            actions_taken: 0,
            actions_failed: 0,
            duration_ms: None,
            error_message: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Applied,
    Failed,
    RolledBack,
}

string_enum!(ActionStatus {
    Pending => "pending",
    Applied => "applied",
    Failed => "failed",
    RolledBack => "rolled_back",
});

/// Audit record of one attempted action on one entity within an execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: String,
    pub execution_id: String,
    pub rule_id: String,
    pub user_id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub platform_entity_id: String,
    pub entity_name: String,
    pub action_type: ActionKind,
    pub action_params: serde_json::Value,
    pub status: ActionStatus,
    pub field_changed: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    /// True only for reversible effects (budget changes).
    pub can_rollback: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user-facing message produced by a `send_notification` action or by
/// approval gating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
