use std::collections::HashMap;

use adrule_common::types::{Condition, ConditionLogic, ConditionOperator, Rule};
use chrono::{DateTime, Utc};

use crate::error::{EngineError, Result};
use crate::metrics::{MetricAggregator, MetricSet};

const RELATIVE_TOLERANCE: f64 = 1e-9;

/// Float equality with a small relative tolerance so that summed currency
/// values compare the way users expect. Infinities are only equal to
/// themselves.
fn approx_eq(a: f64, b: f64) -> bool {
    if a == b {
        return true;
    }
    if !a.is_finite() || !b.is_finite() {
        return false;
    }
    (a - b).abs() <= RELATIVE_TOLERANCE * a.abs().max(b.abs()).max(1.0)
}

/// Applies `operator` to `value`. `Between` is inclusive on both ends and
/// false when no upper bound is given.
pub fn compare(
    operator: ConditionOperator,
    value: f64,
    threshold: f64,
    threshold_max: Option<f64>,
) -> bool {
    match operator {
        ConditionOperator::GreaterThan => value > threshold,
        ConditionOperator::LessThan => value < threshold,
        ConditionOperator::Equals => approx_eq(value, threshold),
        ConditionOperator::NotEquals => !approx_eq(value, threshold),
        ConditionOperator::GreaterOrEqual => value >= threshold,
        ConditionOperator::LessOrEqual => value <= threshold,
        ConditionOperator::Between => {
            threshold_max.is_some_and(|max| threshold <= value && value <= max)
        }
    }
}

/// Evaluates a condition against an already aggregated window. An empty
/// window never matches.
pub fn evaluate(condition: &Condition, metrics: &MetricSet) -> bool {
    if metrics.is_empty() {
        return false;
    }
    compare(
        condition.operator,
        metrics.value(condition.metric_type),
        condition.threshold_value,
        condition.threshold_max,
    )
}

/// `And` over no results is true, `Or` over no results is false.
///
/// # Examples
///
/// ```
/// use adrule_common::types::ConditionLogic;
/// use adrule_engine::condition::combine;
///
/// assert!(!combine([true, true, false], ConditionLogic::And));
/// assert!(combine([true, true, false], ConditionLogic::Or));
/// assert!(combine(Vec::<bool>::new(), ConditionLogic::And));
/// assert!(!combine(Vec::<bool>::new(), ConditionLogic::Or));
/// ```
pub fn combine<I: IntoIterator<Item = bool>>(results: I, logic: ConditionLogic) -> bool {
    let mut results = results.into_iter();
    match logic {
        ConditionLogic::And => results.all(|r| r),
        ConditionLogic::Or => results.any(|r| r),
    }
}

/// Rejects rule definitions the evaluator cannot run. Called once per run
/// before any entity is touched.
pub fn validate_rule(rule: &Rule) -> Result<()> {
    if rule.conditions.is_empty() {
        return Err(EngineError::InvalidRule {
            rule_id: rule.id.clone(),
            reason: "rule has no conditions".to_string(),
        });
    }
    for (idx, condition) in rule.conditions.iter().enumerate() {
        if condition.operator == ConditionOperator::Between && condition.threshold_max.is_none() {
            return Err(EngineError::InvalidRule {
                rule_id: rule.id.clone(),
                reason: format!("condition {idx} uses between without threshold_max"),
            });
        }
    }
    Ok(())
}

/// Evaluates a rule's conditions per entity, fetching each distinct
/// lookback window at most once.
#[derive(Clone)]
pub struct ConditionEvaluator {
    aggregator: MetricAggregator,
}

impl ConditionEvaluator {
    pub fn new(aggregator: MetricAggregator) -> Self {
        Self { aggregator }
    }

    pub fn evaluate(
        &self,
        condition: &Condition,
        entity_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let metrics = self
            .aggregator
            .aggregate(entity_id, condition.time_window_days, now)?;
        Ok(evaluate(condition, &metrics))
    }

    /// Whether `rule` matches the entity. Conditions short-circuit in order,
    /// so later windows are not fetched once the outcome is decided.
    pub fn matches(&self, rule: &Rule, entity_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut windows: HashMap<u32, MetricSet> = HashMap::new();
        for condition in &rule.conditions {
            let metrics = match windows.get(&condition.time_window_days) {
                Some(metrics) => *metrics,
                None => {
                    let metrics =
                        self.aggregator
                            .aggregate(entity_id, condition.time_window_days, now)?;
                    windows.insert(condition.time_window_days, metrics);
                    metrics
                }
            };
            let result = evaluate(condition, &metrics);
            tracing::debug!(
                rule_id = %rule.id,
                entity_id,
                metric = %condition.metric_type,
                operator = %condition.operator,
                value = metrics.value(condition.metric_type),
                result,
                "Condition evaluated"
            );
            match (rule.condition_logic, result) {
                (ConditionLogic::And, false) => return Ok(false),
                (ConditionLogic::Or, true) => return Ok(true),
                _ => {}
            }
        }
        // Every condition true under And, none true under Or.
        Ok(rule.condition_logic == ConditionLogic::And)
    }
}
