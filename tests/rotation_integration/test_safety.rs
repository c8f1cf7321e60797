//! A previous credential is only revoked once every consumer holds the new one.

use keyward::rotation::{PlanDocument, PlanHealth, RevocationPolicy, RotateOptions, Selection};
use keyward::Error;

use crate::common::{backends, orchestrator, recording_backends, service_principal_plan, EventLog};

fn recorded_plan(consumers: serde_json::Value) -> PlanDocument {
    let mut stores = vec![serde_json::json!({
        "name": "gen",
        "type": "generator",
        "origin": true
    })];
    stores.extend(consumers.as_array().unwrap().iter().cloned());
    serde_json::from_value(serde_json::json!({
        "name": "api-key",
        "revocation": { "policy": "immediate" },
        "stores": stores
    }))
    .unwrap()
}

#[tokio::test]
async fn test_consumers_written_in_order_before_revocation() {
    let log = EventLog::default();
    let backends = recording_backends(&log);
    let plan = recorded_plan(serde_json::json!([
        { "name": "kv", "type": "vault", "parameters": { "secretName": "api-key" } },
        { "name": "pipeline-a", "type": "ci_variable" },
        { "name": "pipeline-b", "type": "ci_variable" }
    ]));
    let orchestrator = orchestrator(&backends, vec![plan]);
    let options = RotateOptions::new(Selection::All);

    orchestrator.rotate(&options).await.unwrap();
    let second = orchestrator.rotate(&options).await.unwrap();
    assert_eq!(second.outcomes[0].revoked, 1);

    let events = log.events();
    let last_write = events.iter().rposition(|e| e.starts_with("write:")).unwrap();
    let revoke = log.position("revoke:gen:1").unwrap();
    assert!(revoke > last_write, "revoked before distribution finished: {:?}", events);

    let a = events.iter().rposition(|e| e == "write:pipeline-a").unwrap();
    let b = events.iter().rposition(|e| e == "write:pipeline-b").unwrap();
    assert!(a < b);

    // The new value is never revoked
    assert!(log.position("revoke:gen:2").is_none());
}

#[tokio::test]
async fn test_consumer_failure_keeps_previous_value() {
    let backends = backends();
    let plan = service_principal_plan("deployer", RevocationPolicy::Immediate);
    let orchestrator = orchestrator(&backends, vec![plan]);
    let options = RotateOptions::new(Selection::Named(vec!["deployer".into()]));

    let first = orchestrator.rotate(&options).await.unwrap();
    let first_operation = first.outcomes[0].operation_id.clone();
    assert_eq!(backends.directory.passwords("deployer-app").await.len(), 1);

    backends.ci.fail_operation("set_variable").await;
    let err = orchestrator.rotate(&options).await.unwrap_err();
    let batch = match err {
        Error::Batch(batch) => batch,
        other => panic!("expected a batch error, got {other}"),
    };
    assert_eq!(batch.failed_names(), vec!["deployer"]);
    assert!(matches!(
        batch.failures[0].error,
        Error::StepFailed { step: "distribution", .. }
    ));

    // Old credential untouched; the new one is issued and pending revocation
    assert_eq!(backends.directory.call_count("remove_password").await, 0);
    assert_eq!(backends.directory.passwords("deployer-app").await.len(), 2);

    let status = orchestrator.status(chrono::Utc::now()).await;
    match &status[0].health {
        PlanHealth::Current { operation_id, pending_revocations, .. } => {
            assert_eq!(operation_id.as_deref(), Some(first_operation.as_str()));
            assert_eq!(*pending_revocations, 1);
        }
        other => panic!("unexpected health {other:?}"),
    }
}

#[tokio::test]
async fn test_undistributed_credential_is_revoked_by_next_rotation() {
    let backends = backends();
    let plan = service_principal_plan("deployer", RevocationPolicy::Immediate);
    let orchestrator = orchestrator(&backends, vec![plan]);
    let options = RotateOptions::new(Selection::All);

    orchestrator.rotate(&options).await.unwrap();
    backends.ci.fail_operation("set_variable").await;
    orchestrator.rotate(&options).await.unwrap_err();
    assert_eq!(backends.directory.passwords("deployer-app").await.len(), 2);

    backends.ci.restore_operation("set_variable").await;
    let report = orchestrator.rotate(&options).await.unwrap();
    assert_eq!(report.outcomes[0].revoked, 2);
    assert_eq!(backends.directory.passwords("deployer-app").await.len(), 1);

    let status = orchestrator.status(chrono::Utc::now()).await;
    match &status[0].health {
        PlanHealth::Current { operation_id, pending_revocations, .. } => {
            assert_eq!(operation_id.as_deref(), Some(report.outcomes[0].operation_id.as_str()));
            assert_eq!(*pending_revocations, 0);
        }
        other => panic!("unexpected health {other:?}"),
    }
}

#[tokio::test]
async fn test_origination_failure_touches_no_consumer() {
    let backends = backends();
    backends.directory.fail_operation("add_password").await;
    let plan = service_principal_plan("deployer", RevocationPolicy::Immediate);
    let orchestrator = orchestrator(&backends, vec![plan]);

    let result = orchestrator.rotate(&RotateOptions::new(Selection::All)).await;
    assert!(result.is_err());
    assert_eq!(backends.vault.mutation_count().await, 0);
    assert_eq!(backends.ci.call_count("set_variable").await, 0);
}
