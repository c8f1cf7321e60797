use std::path::PathBuf;

use keyward::access::{ConfigStore, FileConfigStore, ReconcileOptions};

use crate::common::backends;
use crate::support::{document, reconciler};

fn write_document(dir: &std::path::Path, file: &str, service: &str) -> PathBuf {
    let path = dir.join(file);
    let mut json = serde_json::to_string_pretty(&document(service)).unwrap();
    json.push('\n');
    std::fs::write(&path, json).unwrap();
    path
}

#[tokio::test]
async fn test_directory_is_loaded_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    write_document(dir.path(), "orders.json", "orders");
    write_document(dir.path(), "billing.json", "billing");
    std::fs::write(dir.path().join("README.md"), "not a document").unwrap();

    let store = FileConfigStore::new(vec![dir.path().to_path_buf()]);
    let documents = store.load().await.unwrap().documents;

    let names: Vec<_> = documents.iter().map(|d| d.display_name()).collect();
    assert_eq!(names, vec!["billing-deployer", "orders-deployer"]);
}

#[tokio::test]
async fn test_reconcile_writes_back_application_id_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_document(dir.path(), "billing.json", "billing");
    let store = FileConfigStore::new(vec![path.clone()]);
    let backends = backends();
    let reconciler = reconciler(&backends);

    let report = reconciler.reconcile(&store, &ReconcileOptions::default()).await.unwrap();
    assert_eq!(report.saved, 1);

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(saved["properties"]["applicationId"], report.identities[0].application_id.as_str());
    assert_eq!(
        saved["federatedIdentityCredentials"][0]["subject"],
        "repo:{{org}}/{{service}}:ref:refs/heads/main"
    );

    let second = reconciler.reconcile(&store, &ReconcileOptions::default()).await.unwrap();
    assert_eq!(second.saved, 0);
}

#[tokio::test]
async fn test_missing_path_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileConfigStore::new(vec![dir.path().join("missing.json")]);

    let err = store.load().await.unwrap_err();
    assert!(matches!(err, keyward::Error::Io { .. }));
}
