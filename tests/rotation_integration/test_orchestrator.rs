use keyward::rotation::{load_plans, PlanDocument, PlanHealth, RotateOptions, Selection};
use keyward::secrets::RotationRecord;
use keyward::Error;

use crate::common::{
    backends, generated_plan, orchestrator, recording_backends, EventLog, WARNING_WINDOW,
};

fn plan_with_failing_consumer(name: &str) -> PlanDocument {
    serde_json::from_value(serde_json::json!({
        "name": name,
        "stores": [
            { "name": "gen", "type": "generator", "origin": true },
            { "name": "pipeline", "type": "ci_variable", "parameters": { "failWrite": true } },
            { "name": "kv", "type": "vault", "parameters": { "secretName": name } }
        ]
    }))
    .unwrap()
}

#[tokio::test]
async fn test_failed_plan_does_not_stop_the_batch() {
    let log = EventLog::default();
    let backends = recording_backends(&log);
    let orchestrator = orchestrator(
        &backends,
        vec![generated_plan("a"), plan_with_failing_consumer("b"), generated_plan("c")],
    );

    let err = orchestrator.rotate(&RotateOptions::new(Selection::All)).await.unwrap_err();
    let batch = match err {
        Error::Batch(batch) => batch,
        other => panic!("expected a batch error, got {other}"),
    };
    assert_eq!(batch.failed_names(), vec!["b"]);
    assert_eq!(batch.succeeded, vec!["a", "c"]);

    assert!(backends.vault.peek("a").await.is_some());
    assert!(backends.vault.peek("c").await.is_some());
    assert!(backends.vault.peek("b").await.is_none());

    // b's record only holds the value it originated but never distributed
    let state = backends.vault.peek("b-rotation-state").await.unwrap();
    let record: RotationRecord = serde_json::from_str(state.value.expose_secret()).unwrap();
    assert!(record.current.is_none());
    assert_eq!(record.abandoned.len(), 1);
}

#[tokio::test]
async fn test_failed_batch_keeps_outcomes_of_succeeded_plans() {
    let backends = recording_backends(&EventLog::default());
    let orchestrator = orchestrator(
        &backends,
        vec![generated_plan("a"), plan_with_failing_consumer("b"), generated_plan("c")],
    );

    let run = orchestrator.run(&RotateOptions::new(Selection::All)).await.unwrap();
    assert!(!run.is_success());

    let rotated: Vec<_> = run.report.rotated().map(|o| o.plan.as_str()).collect();
    assert_eq!(rotated, vec!["a", "c"]);
    assert!(run.report.outcomes.iter().all(|o| !o.operation_id.is_empty()));
    assert_eq!(run.failures.len(), 1);
    assert_eq!(run.failures[0].name, "b");

    let batch = match run.into_result().unwrap_err() {
        Error::Batch(batch) => batch,
        other => panic!("expected a batch error, got {other}"),
    };
    assert_eq!(batch.succeeded, vec!["a", "c"]);
    assert_eq!(batch.failed_names(), vec!["b"]);
}

#[tokio::test]
async fn test_unknown_secret_is_a_usage_error_before_any_call() {
    let backends = backends();
    let orchestrator = orchestrator(&backends, vec![generated_plan("a")]);

    let options = RotateOptions::new(Selection::Named(vec!["a".into(), "missing".into()]));
    let err = orchestrator.rotate(&options).await.unwrap_err();
    assert!(matches!(err, Error::Usage(ref message) if message.contains("missing")));
    assert!(err.is_configuration());
    assert_eq!(backends.vault.call_count("get_secret").await, 0);
    assert_eq!(backends.vault.mutation_count().await, 0);
}

#[tokio::test]
async fn test_named_selection_rotates_only_named_plans() {
    let backends = backends();
    let orchestrator =
        orchestrator(&backends, vec![generated_plan("a"), generated_plan("b"), generated_plan("c")]);

    let options = RotateOptions::new(Selection::Named(vec!["b".into()]));
    let report = orchestrator.rotate(&options).await.unwrap();

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].plan, "b");
    assert!(backends.vault.peek("a").await.is_none());
    assert!(backends.vault.peek("b").await.is_some());
}

#[tokio::test]
async fn test_invalid_plan_is_listed_and_fails_rotation() {
    let backends = backends();
    let broken: PlanDocument = serde_json::from_value(serde_json::json!({
        "name": "broken",
        "stores": [{ "name": "kv", "type": "vault", "parameters": { "secretName": "x" } }]
    }))
    .unwrap();
    let orchestrator = orchestrator(&backends, vec![generated_plan("ok"), broken]);

    let summaries = orchestrator.list();
    assert!(summaries[0].valid);
    assert!(!summaries[1].valid);
    assert!(summaries[1].error.as_deref().unwrap().contains("origin"));

    let status = orchestrator.status(chrono::Utc::now()).await;
    assert!(matches!(status[1].health, PlanHealth::Unknown { .. }));

    let err = orchestrator.rotate(&RotateOptions::new(Selection::All)).await.unwrap_err();
    let Error::Batch(batch) = &err else {
        panic!("expected a batch error, got {err}");
    };
    assert_eq!(batch.failed_names(), vec!["broken"]);
    assert!(batch.failures[0].error.is_configuration());
}

#[tokio::test]
async fn test_unattended_run_rejects_manual_plans() {
    let backends = backends();
    let manual: PlanDocument = serde_json::from_value(serde_json::json!({
        "name": "partner-key",
        "stores": [
            { "name": "gen", "type": "generator", "origin": true },
            { "name": "kv", "type": "vault", "parameters": { "secretName": "partner-key" } },
            { "name": "portal", "type": "manual_action",
              "parameters": { "prompt": "Paste the key into the partner portal" } }
        ]
    }))
    .unwrap();
    let orchestrator = orchestrator(&backends, vec![manual, generated_plan("db")]);

    let mut options = RotateOptions::new(Selection::All);
    options.unattended = true;
    let err = orchestrator.rotate(&options).await.unwrap_err();
    let Error::Batch(batch) = &err else {
        panic!("expected a batch error, got {err}");
    };
    assert_eq!(batch.failed_names(), vec!["partner-key"]);
    assert_eq!(batch.succeeded, vec!["db"]);
    assert!(backends.vault.peek("partner-key").await.is_none());
}

#[tokio::test]
async fn test_cancelled_run_attempts_nothing() {
    let backends = backends();
    let orchestrator = orchestrator(&backends, vec![generated_plan("a"), generated_plan("b")]);

    let options = RotateOptions::new(Selection::All);
    options.cancel.cancel();
    let err = orchestrator.rotate(&options).await.unwrap_err();
    let Error::Batch(batch) = &err else {
        panic!("expected a batch error, got {err}");
    };
    assert_eq!(batch.failed_names(), vec!["a", "b"]);
    assert!(batch.failures.iter().all(|f| matches!(f.error, Error::Cancelled)));
    assert_eq!(backends.vault.mutation_count().await, 0);
}

#[tokio::test]
async fn test_expiring_run_skips_fresh_plans() {
    let backends = backends();
    let orchestrator = orchestrator(&backends, vec![generated_plan("a")]);
    orchestrator.rotate(&RotateOptions::new(Selection::All)).await.unwrap();

    let mut options = RotateOptions::new(Selection::All);
    options.expiring = true;
    let report = orchestrator.rotate(&options).await.unwrap();
    assert_eq!(report.rotated().count(), 0);
    assert_eq!(report.skipped().count(), 1);

    // Default rotation period is 90 days, default warning window 7 days
    options.now = chrono::Utc::now() + chrono::Duration::days(84);
    let report = orchestrator.rotate(&options).await.unwrap();
    assert_eq!(report.rotated().count(), 1);
}

#[tokio::test]
async fn test_plans_load_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("b.json"),
        serde_json::to_string(&vec![generated_plan("b1"), generated_plan("b2")]).unwrap(),
    )
    .unwrap();
    std::fs::write(
        dir.path().join("a.json"),
        serde_json::to_string(&generated_plan("a")).unwrap(),
    )
    .unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let loaded = load_plans(dir.path()).unwrap();
    let names: Vec<_> = loaded.documents.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b1", "b2"]);

    let backends = backends();
    let orchestrator =
        keyward::rotation::RotationOrchestrator::new(loaded, &backends.registry, WARNING_WINDOW);
    assert_eq!(orchestrator.plan_names(), vec!["a", "b1", "b2"]);
}
