mod common;

use adrule_common::types::{ActionStatus, ExecutionStatus};
use adrule_server::build_scheduler;
use adrule_server::rule_seed::{import_rules, RulesSeedFile};
use adrule_storage::{AuditStore, EntityStore, RuleStore};

use common::{build_test_context, fixed_now, seed_campaign};

fn seed(dry_run: bool) -> RulesSeedFile {
    serde_json::from_value(serde_json::json!({
        "rules": [{
            "user_id": "user-1",
            "name": "Cut budget on low ROAS",
            "entity_type": "campaign",
            "platform": "facebook",
            "check_frequency_minutes": 15,
            "dry_run": dry_run,
            "conditions": [
                {"metric_type": "roas", "operator": "less_than", "threshold_value": 1.5, "time_window_days": 3}
            ],
            "actions": [
                {"action_type": "adjust_budget", "budget_change_type": "percent", "budget_change_value": -25.0}
            ]
        }]
    }))
    .unwrap()
}

#[tokio::test]
async fn missing_credentials_fail_actions_but_keep_the_audit_trail() {
    let ctx = build_test_context().unwrap();
    seed_campaign(&ctx.store, "c1", 100.0, 50.0, 20.0);
    seed_campaign(&ctx.store, "c2", 100.0, 50.0, 200.0);
    import_rules(ctx.store.as_ref(), seed(false), fixed_now()).unwrap();

    let scheduler = build_scheduler(&ctx.config, ctx.store.clone()).unwrap();
    let summary = scheduler.run_due_rules_at(fixed_now()).await.unwrap();

    assert_eq!(summary.rules_executed, 1);
    let result = &summary.results[0];
    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(result.entities_checked, 2);
    assert_eq!(result.entities_matched, 1);
    assert_eq!(result.actions_taken, 0);
    assert_eq!(result.actions_failed, 1);

    let records = ctx.store.list_action_records(&result.execution_id).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].entity_id, "c1");
    assert_eq!(records[0].status, ActionStatus::Failed);
    assert!(!records[0].can_rollback);
    assert!(records[0].error_message.is_some());

    let entity = ctx.store.get_entity("c1").unwrap().unwrap();
    assert_eq!(entity.daily_budget, Some(100.0));

    let rule = &ctx.store.list_rules("user-1").unwrap()[0];
    assert_eq!(rule.total_executions, 1);
    assert_eq!(rule.total_actions_taken, 0);
    assert_eq!(
        rule.next_execution_at,
        Some(fixed_now() + chrono::Duration::minutes(15))
    );
}

#[tokio::test]
async fn dry_run_rule_touches_nothing() {
    let ctx = build_test_context().unwrap();
    seed_campaign(&ctx.store, "c1", 100.0, 50.0, 20.0);
    import_rules(ctx.store.as_ref(), seed(true), fixed_now()).unwrap();

    let scheduler = build_scheduler(&ctx.config, ctx.store.clone()).unwrap();
    let summary = scheduler.run_due_rules_at(fixed_now()).await.unwrap();

    let result = &summary.results[0];
    assert_eq!(result.entities_matched, 1);
    assert_eq!(result.actions_taken, 0);
    assert_eq!(result.actions_failed, 0);
    assert!(ctx
        .store
        .list_action_records(&result.execution_id)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn rollback_of_unknown_record_is_an_error() {
    let ctx = build_test_context().unwrap();
    let scheduler = build_scheduler(&ctx.config, ctx.store.clone()).unwrap();

    assert!(scheduler.executor().rollback("missing").await.is_err());
}
