use keyward::rotation::{PlanHealth, RevocationPolicy, RotateOptions, Selection};

use crate::common::{backends, orchestrator, service_principal_plan};

fn dry_run() -> RotateOptions {
    let mut options = RotateOptions::new(Selection::All);
    options.dry_run = true;
    options
}

#[tokio::test]
async fn test_dry_run_performs_no_mutation() {
    let backends = backends();
    let orchestrator = orchestrator(
        &backends,
        vec![service_principal_plan("deployer", RevocationPolicy::Immediate)],
    );

    let report = orchestrator.rotate(&dry_run()).await.unwrap();
    let outcome = &report.outcomes[0];
    assert!(outcome.dry_run);
    assert!(outcome.rotated);

    assert_eq!(backends.directory.mutation_count().await, 0);
    assert_eq!(backends.vault.mutation_count().await, 0);
    assert_eq!(backends.ci.call_count("set_variable").await, 0);

    let status = orchestrator.status(chrono::Utc::now()).await;
    assert_eq!(status[0].health, PlanHealth::NeverRotated);
}

#[tokio::test]
async fn test_dry_run_after_real_rotation_revokes_nothing() {
    let backends = backends();
    let orchestrator = orchestrator(
        &backends,
        vec![service_principal_plan("deployer", RevocationPolicy::Immediate)],
    );
    let real = orchestrator.rotate(&RotateOptions::new(Selection::All)).await.unwrap();

    let directory_before = backends.directory.mutation_count().await;
    let vault_before = backends.vault.mutation_count().await;
    let ci_before = backends.ci.call_count("set_variable").await;

    let preview = orchestrator.rotate(&dry_run()).await.unwrap();
    assert_eq!(preview.outcomes[0].revoked, 1);

    assert_eq!(backends.directory.mutation_count().await, directory_before);
    assert_eq!(backends.vault.mutation_count().await, vault_before);
    assert_eq!(backends.ci.call_count("set_variable").await, ci_before);
    assert_eq!(backends.directory.passwords("deployer-app").await.len(), 1);

    let status = orchestrator.status(chrono::Utc::now()).await;
    match &status[0].health {
        PlanHealth::Current { operation_id, .. } => {
            assert_eq!(operation_id.as_deref(), Some(real.outcomes[0].operation_id.as_str()))
        }
        other => panic!("unexpected health {other:?}"),
    }
}
