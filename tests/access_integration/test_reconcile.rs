use keyward::access::{MemoryConfigStore, ReconcileOptions, DRY_RUN_APPLICATION_ID};
use keyward::domain::RoleBasedAccessControl;
use tracing_test::traced_test;

use crate::common::backends;
use crate::support::{credential, document, reconciler, scope};

#[tokio::test]
async fn test_first_pass_creates_everything() {
    let backends = backends();
    let store = MemoryConfigStore::new([("billing.json", document("billing"))]);

    let report = reconciler(&backends).reconcile(&store, &ReconcileOptions::default()).await.unwrap();

    let summary = &report.identities[0];
    assert_eq!(summary.display_name, "billing-deployer");
    assert!(summary.application_created);
    assert_eq!(summary.credentials_created, 2);
    assert_eq!(summary.secrets_pushed, 2);

    let application = backends.directory.application("billing-deployer").await.unwrap();
    assert_eq!(summary.application_id, application.app_id);

    let credentials = backends.directory.federated_credentials(&application.object_id).await;
    assert!(credentials.contains(&{
        let mut main = credential("main", "repo:acme/billing:ref:refs/heads/main");
        main.description = "Deploy from main".into();
        main
    }));

    let roles = backends.directory.role_assignments().await;
    assert_eq!(roles.len(), 1);
    assert_eq!(
        roles[0].1,
        RoleBasedAccessControl { role: "Contributor".into(), scope: scope("billing") }
    );

    let client_id = backends.repositories.secret("acme/billing", "AZURE_CLIENT_ID").await.unwrap();
    assert_eq!(client_id.expose_secret(), application.app_id);

    // Only the application id is written back; templates stay in place
    assert_eq!(report.saved, 1);
    let raw = store.raw("billing.json").await.unwrap();
    assert_eq!(raw["properties"]["applicationId"], application.app_id.as_str());
    assert_eq!(raw["appDisplayName"], "{{service}}-deployer");
    assert_eq!(
        raw["githubRepositorySecrets"][0]["secrets"]["AZURE_CLIENT_ID"],
        "{{applicationId}}"
    );
}

#[tokio::test]
async fn test_second_pass_changes_nothing_in_the_directory() {
    let backends = backends();
    let store = MemoryConfigStore::new([
        ("billing.json", document("billing")),
        ("orders.json", document("orders")),
    ]);
    let reconciler = reconciler(&backends);

    reconciler.reconcile(&store, &ReconcileOptions::default()).await.unwrap();
    let roles_before = backends.directory.role_assignments().await;
    let creates_before = backends.directory.call_count("create_federated_credential").await;

    let report = reconciler.reconcile(&store, &ReconcileOptions::default()).await.unwrap();

    assert_eq!(report.saved, 0);
    for summary in &report.identities {
        assert!(!summary.application_created);
        assert_eq!(summary.credentials_unchanged, 2);
        assert_eq!(summary.credentials_created, 0);
        assert_eq!(summary.credentials_removed, 0);
    }
    assert_eq!(backends.directory.call_count("create_application").await, 2);
    assert_eq!(backends.directory.call_count("create_service_principal").await, 2);
    assert_eq!(backends.directory.call_count("delete_federated_credential").await, 0);
    assert_eq!(
        backends.directory.call_count("create_federated_credential").await,
        creates_before
    );
    assert_eq!(backends.directory.role_assignments().await, roles_before);
}

#[tokio::test]
async fn test_changed_credential_is_deleted_before_recreation() {
    let backends = backends();
    let application = backends.directory.seed_application("billing-deployer").await;
    backends
        .directory
        .seed_federated_credential(
            &application.object_id,
            credential("main", "repo:acme/billing:ref:refs/heads/develop"),
        )
        .await;
    backends
        .directory
        .seed_federated_credential(&application.object_id, credential("legacy", "repo:acme/old:ref:x"))
        .await;

    let store = MemoryConfigStore::new([("billing.json", document("billing"))]);
    let report = reconciler(&backends).reconcile(&store, &ReconcileOptions::default()).await.unwrap();

    let summary = &report.identities[0];
    assert!(!summary.application_created);
    assert_eq!(summary.credentials_removed, 2);
    assert_eq!(summary.credentials_created, 2);

    let calls = backends.directory.calls().await;
    let last_delete = calls.iter().rposition(|c| c == "delete_federated_credential").unwrap();
    let first_create = calls.iter().position(|c| c == "create_federated_credential").unwrap();
    assert!(last_delete < first_create);

    let names: Vec<_> = backends
        .directory
        .federated_credentials(&application.object_id)
        .await
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["main", "production"]);

    // Existing application id is folded into the document
    let raw = store.raw("billing.json").await.unwrap();
    assert_eq!(raw["properties"]["applicationId"], application.app_id.as_str());
}

#[tokio::test]
async fn test_dry_run_mutates_nothing_and_saves_nothing() {
    let backends = backends();
    let store = MemoryConfigStore::new([("billing.json", document("billing"))]);
    let options = ReconcileOptions { dry_run: true, ..Default::default() };

    let report = reconciler(&backends).reconcile(&store, &options).await.unwrap();

    let summary = &report.identities[0];
    assert!(summary.application_created);
    assert_eq!(summary.application_id, DRY_RUN_APPLICATION_ID);
    assert_eq!(summary.credentials_created, 2);
    assert_eq!(summary.secrets_pushed, 0);

    assert_eq!(backends.directory.mutation_count().await, 0);
    assert_eq!(backends.repositories.call_count("set_secret").await, 0);
    assert_eq!(store.save_count().await, 0);
    let raw = store.raw("billing.json").await.unwrap();
    assert!(raw["properties"].get("applicationId").is_none());
}

#[tokio::test]
#[traced_test]
async fn test_dry_run_logs_intended_mutations() {
    let backends = backends();
    let store = MemoryConfigStore::new([("billing.json", document("billing"))]);
    let options = ReconcileOptions { dry_run: true, ..Default::default() };

    reconciler(&backends).reconcile(&store, &options).await.unwrap();

    assert!(logs_contain("Would create application"));
    assert!(logs_contain("Would assign role"));
    assert!(logs_contain("Would create federated credential"));
    assert!(logs_contain("Would set repository secret"));
    assert!(logs_contain("billing-deployer"));
}
