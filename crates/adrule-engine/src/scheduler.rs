use std::sync::Arc;
use std::time::Instant;

use adrule_common::types::{Execution, ExecutionStatus, Rule};
use adrule_platform::PlatformRegistry;
use adrule_storage::{AuditStore, NotificationSink, RuleRunUpdate, RuleStore, UnreadableRule};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;

use crate::condition::{validate_rule, ConditionEvaluator};
use crate::error::{EngineError, Result};
use crate::executor::ActionExecutor;
use crate::fetcher::EntityFetcher;
use crate::metrics::MetricAggregator;
use crate::EngineStores;

/// Tuning knobs for [`RuleScheduler`].
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Rules processed in parallel; 1 keeps runs strictly sequential.
    pub max_concurrent_rules: usize,
    pub max_rules_per_tick: usize,
    /// How long a claimed rule stays invisible to other invocations.
    pub claim_lease: Duration,
    pub entity_page_size: usize,
    pub action_timeout: std::time::Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_rules: 1,
            max_rules_per_tick: 100,
            claim_lease: Duration::minutes(15),
            entity_page_size: 500,
            action_timeout: std::time::Duration::from_secs(30),
        }
    }
}

/// Outcome of one rule within a scheduler pass.
#[derive(Debug, Clone, Serialize)]
pub struct RuleRunResult {
    pub rule_id: String,
    pub rule_name: String,
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub entities_checked: u32,
    pub entities_matched: u32,
    pub actions_taken: u32,
    pub actions_failed: u32,
    pub error: Option<String>,
}

impl RuleRunResult {
    fn from_execution(target: &RunTarget, execution: &Execution) -> Self {
        Self {
            rule_id: target.id.clone(),
            rule_name: target.name.clone(),
            execution_id: execution.id.clone(),
            status: execution.status,
            entities_checked: execution.entities_checked,
            entities_matched: execution.entities_matched,
            actions_taken: execution.actions_taken,
            actions_failed: execution.actions_failed,
            error: execution.error_message.clone(),
        }
    }
}

/// Summary returned by [`RuleScheduler::run_due_rules`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub rules_executed: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub results: Vec<RuleRunResult>,
}

impl RunSummary {
    fn push(&mut self, result: RuleRunResult) {
        self.rules_executed += 1;
        if result.status == ExecutionStatus::Completed {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.results.push(result);
    }
}

/// The scheduling facts of a claimed rule, available even when its
/// definition could not be decoded.
#[derive(Debug, Clone)]
struct RunTarget {
    id: String,
    name: String,
    check_frequency_minutes: u32,
}

impl RunTarget {
    fn of_rule(rule: &Rule) -> Self {
        Self {
            id: rule.id.clone(),
            name: rule.name.clone(),
            check_frequency_minutes: rule.check_frequency_minutes,
        }
    }

    fn of_unreadable(rule: &UnreadableRule) -> Self {
        Self {
            id: rule.id.clone(),
            name: rule.name.clone(),
            check_frequency_minutes: rule.check_frequency_minutes,
        }
    }
}

/// Selects due rules and drives the evaluate-then-act loop for each.
#[derive(Clone)]
pub struct RuleScheduler {
    runner: Arc<RuleRunner>,
    rules: Arc<dyn RuleStore>,
    config: SchedulerConfig,
}

impl RuleScheduler {
    pub fn new(stores: EngineStores, platforms: PlatformRegistry, config: SchedulerConfig) -> Self {
        let executor = ActionExecutor::new(
            stores.entities.clone(),
            stores.audit.clone(),
            stores.notifier.clone(),
            platforms,
            config.action_timeout,
        );
        let runner = RuleRunner {
            rules: stores.rules.clone(),
            audit: stores.audit.clone(),
            notifier: stores.notifier.clone(),
            evaluator: ConditionEvaluator::new(MetricAggregator::new(stores.metrics.clone())),
            fetcher: EntityFetcher::new(stores.entities.clone(), config.entity_page_size),
            executor,
        };
        Self {
            runner: Arc::new(runner),
            rules: stores.rules,
            config,
        }
    }

    pub fn executor(&self) -> &ActionExecutor {
        &self.runner.executor
    }

    pub async fn run_due_rules(&self) -> Result<RunSummary> {
        self.run_due_rules_at(Utc::now()).await
    }

    /// Claims every rule due at `now` and runs it. Rules that are not yet
    /// due, or are leased by another invocation, are left untouched.
    ///
    /// Results list decoded rules in claim order, followed by claimed rules
    /// whose stored definition could not be decoded. Every claimed rule gets
    /// an execution record and is rescheduled.
    pub async fn run_due_rules_at(&self, now: DateTime<Utc>) -> Result<RunSummary> {
        let claimed = self.rules.claim_due_rules(
            now,
            now + self.config.claim_lease,
            self.config.max_rules_per_tick,
        )?;
        if claimed.is_empty() {
            tracing::debug!("No rules due");
            return Ok(RunSummary::default());
        }

        tracing::info!(
            count = claimed.len(),
            unreadable = claimed.unreadable.len(),
            max_concurrent = self.config.max_concurrent_rules,
            "Running due rules"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_rules.max(1)));
        let mut handles = Vec::with_capacity(claimed.rules.len());
        for rule in claimed.rules {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| EngineError::Other(e.to_string()))?;
            let runner = self.runner.clone();
            let target = RunTarget::of_rule(&rule);
            let execution = Execution::start(&rule, now);
            let started = execution.clone();
            let handle = tokio::spawn(async move {
                let result = runner.run_rule(rule, execution, now).await;
                drop(permit);
                result
            });
            handles.push((target, started, handle));
        }

        let mut summary = RunSummary::default();
        for (target, started, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(rule_id = %target.id, error = %e, "Rule task aborted");
                    self.runner
                        .fail_run(&target, started, format!("rule task aborted: {e}"), now, true)
                }
            };
            summary.push(result);
        }

        for unreadable in &claimed.unreadable {
            tracing::error!(
                rule_id = %unreadable.id,
                error = %unreadable.error,
                "Rule definition could not be read"
            );
            let execution = Execution::for_rule_id(&unreadable.id, &unreadable.user_id, now);
            let result = self.runner.fail_run(
                &RunTarget::of_unreadable(unreadable),
                execution,
                format!("rule definition could not be read: {}", unreadable.error),
                now,
                false,
            );
            summary.push(result);
        }

        tracing::info!(
            rules_executed = summary.rules_executed,
            success = summary.success_count,
            failed = summary.failure_count,
            "Rule pass finished"
        );
        Ok(summary)
    }
}

/// Everything one rule run needs; shared by the spawned tasks.
struct RuleRunner {
    rules: Arc<dyn RuleStore>,
    audit: Arc<dyn AuditStore>,
    notifier: Arc<dyn NotificationSink>,
    evaluator: ConditionEvaluator,
    fetcher: EntityFetcher,
    executor: ActionExecutor,
}

impl RuleRunner {
    async fn run_rule(
        &self,
        rule: Rule,
        mut execution: Execution,
        now: DateTime<Utc>,
    ) -> RuleRunResult {
        let started = Instant::now();

        let recorded = self
            .audit
            .create_execution(&execution)
            .map_err(|e| e.to_string());
        let outcome = match &recorded {
            Ok(()) => self.process(&rule, &mut execution, now).await,
            Err(e) => Err(EngineError::Other(format!(
                "execution could not be recorded: {e}"
            ))),
        };

        match outcome {
            Ok(()) => execution.status = ExecutionStatus::Completed,
            Err(e) => {
                tracing::error!(rule_id = %rule.id, error = %e, "Rule execution failed");
                execution.status = ExecutionStatus::Failed;
                execution.error_message = Some(e.to_string());
            }
        }
        let elapsed_ms = started.elapsed().as_millis() as i64;
        execution.duration_ms = Some(elapsed_ms);
        execution.completed_at = Some(now + Duration::milliseconds(elapsed_ms));

        if recorded.is_ok() {
            if let Err(e) = self.audit.finish_execution(&execution) {
                tracing::error!(
                    rule_id = %rule.id,
                    execution_id = %execution.id,
                    error = %e,
                    "Failed to finalize execution"
                );
            }
        }

        let actions_taken = if execution.status == ExecutionStatus::Completed {
            u64::from(execution.actions_taken)
        } else {
            0
        };
        let target = RunTarget::of_rule(&rule);
        self.reschedule(&target, now, actions_taken);

        tracing::info!(
            rule_id = %rule.id,
            status = %execution.status,
            checked = execution.entities_checked,
            matched = execution.entities_matched,
            actions_taken = execution.actions_taken,
            actions_failed = execution.actions_failed,
            duration_ms = elapsed_ms,
            "Rule executed"
        );
        RuleRunResult::from_execution(&target, &execution)
    }

    /// Records a run that could not finish on its own (undecodable rule,
    /// aborted task) as failed and reschedules the rule. `created` tells whether the execution row was
    /// already written.
    fn fail_run(
        &self,
        target: &RunTarget,
        mut execution: Execution,
        error: String,
        now: DateTime<Utc>,
        created: bool,
    ) -> RuleRunResult {
        let recorded = if created {
            Ok(())
        } else {
            self.audit.create_execution(&execution)
        };
        execution.status = ExecutionStatus::Failed;
        execution.error_message = Some(error);
        execution.completed_at = Some(now);
        if let Err(e) = recorded.and_then(|()| self.audit.finish_execution(&execution)) {
            tracing::error!(
                rule_id = %target.id,
                execution_id = %execution.id,
                error = %e,
                "Failed to record failed execution"
            );
        }

        self.reschedule(target, now, 0);
        RuleRunResult::from_execution(target, &execution)
    }

    /// Rescheduled even after a failure so a broken rule neither spins nor
    /// silently stops being retried.
    fn reschedule(&self, target: &RunTarget, now: DateTime<Utc>, actions_taken: u64) {
        let update = RuleRunUpdate {
            executed_at: now,
            next_execution_at: now
                + Duration::minutes(i64::from(target.check_frequency_minutes.max(1))),
            actions_taken,
        };
        if let Err(e) = self.rules.complete_rule_run(&target.id, &update) {
            tracing::error!(rule_id = %target.id, error = %e, "Failed to reschedule rule");
        }
    }

    async fn process(
        &self,
        rule: &Rule,
        execution: &mut Execution,
        now: DateTime<Utc>,
    ) -> Result<()> {
        validate_rule(rule)?;

        let cap = rule.max_actions_per_run;
        let cap_reached = |taken: u32| cap.is_some_and(|limit| taken >= limit);
        let mut awaiting_approval: Vec<String> = Vec::new();

        'entities: for page in self.fetcher.pages(rule) {
            for mut entity in page? {
                if cap_reached(execution.actions_taken) {
                    tracing::info!(
                        rule_id = %rule.id,
                        cap = cap.unwrap_or_default(),
                        "Action cap reached, stopping run"
                    );
                    break 'entities;
                }
                execution.entities_checked += 1;

                if !self.evaluator.matches(rule, &entity.id, now)? {
                    continue;
                }
                execution.entities_matched += 1;

                if rule.dry_run {
                    for action in &rule.actions {
                        tracing::info!(
                            rule_id = %rule.id,
                            entity_id = %entity.id,
                            action = %action.kind(),
                            "Dry run: action skipped"
                        );
                    }
                    continue;
                }
                if rule.require_approval {
                    awaiting_approval.push(entity.name.clone());
                    continue;
                }

                for action in &rule.actions {
                    let outcome = self
                        .executor
                        .execute(rule, &mut entity, action, &execution.id)
                        .await?;
                    if outcome.is_applied() {
                        execution.actions_taken += 1;
                        if cap_reached(execution.actions_taken) {
                            tracing::info!(
                                rule_id = %rule.id,
                                cap = cap.unwrap_or_default(),
                                "Action cap reached, stopping run"
                            );
                            break 'entities;
                        }
                    } else {
                        execution.actions_failed += 1;
                    }
                }
            }
        }

        if !awaiting_approval.is_empty() {
            self.request_approval(rule, execution, &awaiting_approval)?;
        }
        Ok(())
    }

    /// One notification per run listing the matched entities whose actions
    /// were held back.
    fn request_approval(&self, rule: &Rule, execution: &Execution, names: &[String]) -> Result<()> {
        let title = format!("Rule \"{}\" awaits approval", rule.name);
        let message = format!(
            "{} {}(s) matched and are waiting for approval: {}",
            names.len(),
            rule.entity_type,
            names.join(", ")
        );
        let metadata = serde_json::json!({
            "rule_id": rule.id,
            "execution_id": execution.id,
            "entities": names,
            "actions": rule.actions.iter().map(|a| a.kind().as_str()).collect::<Vec<_>>(),
        });
        self.notifier
            .notify(&rule.user_id, &title, &message, &metadata)?;
        tracing::info!(rule_id = %rule.id, pending = names.len(), "Approval requested");
        Ok(())
    }
}
