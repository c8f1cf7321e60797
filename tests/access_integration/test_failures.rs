use serde_json::json;

use keyward::access::{MemoryConfigStore, ReconcileOptions};
use keyward::Error;

use crate::common::backends;
use crate::support::{document, reconciler, scope};

#[tokio::test]
async fn test_failing_identity_does_not_stop_the_others() {
    let backends = backends();
    backends.directory.fail_role_assignments_on(&scope("b")).await;
    let store = MemoryConfigStore::new([
        ("a.json", document("a")),
        ("b.json", document("b")),
        ("c.json", document("c")),
    ]);

    let err = reconciler(&backends)
        .reconcile(&store, &ReconcileOptions::default())
        .await
        .unwrap_err();

    let Error::Batch(batch) = &err else {
        panic!("expected a batch error, got {err}");
    };
    assert_eq!(batch.failed_names(), vec!["b-deployer"]);
    assert_eq!(batch.succeeded, vec!["a-deployer", "c-deployer"]);
    assert!(matches!(
        batch.failure("b-deployer").map(|f| &f.error),
        Some(Error::StepFailed { step: "role assignment", .. })
    ));

    assert!(backends.repositories.secret("acme/a", "AZURE_CLIENT_ID").await.is_some());
    assert!(backends.repositories.secret("acme/c", "AZURE_CLIENT_ID").await.is_some());
    assert!(backends.repositories.secret("acme/b", "AZURE_CLIENT_ID").await.is_none());

    // The failed identity's application exists, so its id is still saved
    let application = backends.directory.application("b-deployer").await.unwrap();
    let raw = store.raw("b.json").await.unwrap();
    assert_eq!(raw["properties"]["applicationId"], application.app_id.as_str());
    assert_eq!(store.save_count().await, 1);
}

#[tokio::test]
async fn test_unknown_token_blocks_the_identity() {
    let backends = backends();
    let mut broken = document("broken");
    broken["githubRepositorySecrets"][0]["secrets"]["REGION"] = json!("{{region}}");
    let store = MemoryConfigStore::new([("broken.json", broken)]);

    let err = reconciler(&backends)
        .reconcile(&store, &ReconcileOptions::default())
        .await
        .unwrap_err();

    let Error::Batch(batch) = &err else {
        panic!("expected a batch error, got {err}");
    };
    let failure = batch.failure("broken-deployer").unwrap();
    assert!(matches!(
        &failure.error,
        Error::UnresolvedTokens { tokens, .. } if tokens.contains(&"region".to_string())
    ));
    assert!(failure.error.is_configuration());
    assert_eq!(backends.directory.call_count("create_role_assignment").await, 0);
    assert_eq!(backends.repositories.call_count("set_secret").await, 0);
}

#[tokio::test]
async fn test_invalid_document_does_not_stop_the_others() {
    let backends = backends();
    let store = MemoryConfigStore::new([
        ("a.json", document("a")),
        ("bad.json", json!({ "properties": {} })),
        ("c.json", document("c")),
    ]);

    let err = reconciler(&backends)
        .reconcile(&store, &ReconcileOptions::default())
        .await
        .unwrap_err();

    let Error::Batch(batch) = &err else {
        panic!("expected a batch error, got {err}");
    };
    assert_eq!(batch.failed_names(), vec!["bad.json"]);
    assert_eq!(batch.succeeded, vec!["a-deployer", "c-deployer"]);
    let failure = batch.failure("bad.json").unwrap();
    assert!(failure.error.is_configuration());
    assert!(failure.error.to_string().contains("appDisplayName"));

    assert!(backends.directory.application("a-deployer").await.is_some());
    assert!(backends.directory.application("c-deployer").await.is_some());

    // Valid documents are saved; the broken one is left as it was
    let saved = store.raw("a.json").await.unwrap();
    assert!(saved["properties"]["applicationId"].is_string());
    assert_eq!(store.raw("bad.json").await.unwrap(), json!({ "properties": {} }));
}

#[tokio::test]
async fn test_cancelled_reconciliation_touches_nothing() {
    let backends = backends();
    let store = MemoryConfigStore::new([("a.json", document("a")), ("b.json", document("b"))]);
    let options = ReconcileOptions::default();
    options.cancel.cancel();

    let err = reconciler(&backends).reconcile(&store, &options).await.unwrap_err();

    let Error::Batch(batch) = &err else {
        panic!("expected a batch error, got {err}");
    };
    assert_eq!(batch.failed_names(), vec!["a-deployer", "b-deployer"]);
    assert!(batch.failures.iter().all(|f| matches!(f.error, Error::Cancelled)));
    assert!(backends.directory.calls().await.is_empty());
}
