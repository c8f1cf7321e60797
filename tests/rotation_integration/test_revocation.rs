use chrono::{Duration, Utc};
use keyward::rotation::{PlanHealth, RevocationPolicy, RotateOptions, Selection};

use crate::common::{backends, orchestrator, service_principal_plan};

fn at(now: chrono::DateTime<Utc>) -> RotateOptions {
    let mut options = RotateOptions::new(Selection::All);
    options.now = now;
    options
}

fn pending_revocations(health: &PlanHealth) -> usize {
    match health {
        PlanHealth::Current { pending_revocations, .. } => *pending_revocations,
        other => panic!("unexpected health {other:?}"),
    }
}

#[tokio::test]
async fn test_deferred_revocation_waits_for_grace_period() {
    let backends = backends();
    let policy = RevocationPolicy::Deferred { after: std::time::Duration::from_secs(2 * 86_400) };
    let orchestrator = orchestrator(&backends, vec![service_principal_plan("deployer", policy)]);
    let now = Utc::now();

    orchestrator.rotate(&at(now)).await.unwrap();
    let second = orchestrator.rotate(&at(now)).await.unwrap();
    assert_eq!(second.outcomes[0].revoked, 0);
    assert_eq!(second.outcomes[0].deferred, 1);
    assert_eq!(backends.directory.passwords("deployer-app").await.len(), 2);

    let status = orchestrator.status(now).await;
    assert_eq!(pending_revocations(&status[0].health), 1);

    // Not yet expiring, but the grace period is over
    let mut later = at(now + Duration::days(3));
    later.expiring = true;
    let third = orchestrator.rotate(&later).await.unwrap();
    assert!(!third.outcomes[0].rotated);
    assert_eq!(third.outcomes[0].revoked, 1);
    assert_eq!(backends.directory.passwords("deployer-app").await.len(), 1);

    let status = orchestrator.status(now + Duration::days(3)).await;
    assert_eq!(pending_revocations(&status[0].health), 0);
}

#[tokio::test]
async fn test_never_policy_leaves_previous_values() {
    let backends = backends();
    let orchestrator =
        orchestrator(&backends, vec![service_principal_plan("deployer", RevocationPolicy::Never)]);

    orchestrator.rotate(&at(Utc::now())).await.unwrap();
    let second = orchestrator.rotate(&at(Utc::now())).await.unwrap();

    assert_eq!(second.outcomes[0].revoked, 0);
    assert_eq!(second.outcomes[0].deferred, 0);
    assert_eq!(backends.directory.call_count("remove_password").await, 0);
    assert_eq!(backends.directory.passwords("deployer-app").await.len(), 2);
}

#[tokio::test]
async fn test_failed_revocation_is_kept_for_retry() {
    let backends = backends();
    let orchestrator = orchestrator(
        &backends,
        vec![service_principal_plan("deployer", RevocationPolicy::Immediate)],
    );

    orchestrator.rotate(&at(Utc::now())).await.unwrap();
    backends.directory.fail_operation("remove_password").await;

    // The rotation itself succeeds; the old value waits for the next run
    let second = orchestrator.rotate(&at(Utc::now())).await.unwrap();
    let outcome = &second.outcomes[0];
    assert!(outcome.rotated);
    assert_eq!(outcome.revoked, 0);
    assert_eq!(outcome.revocation_failures.len(), 1);
    assert_eq!(outcome.deferred, 1);

    let status = orchestrator.status(Utc::now()).await;
    assert_eq!(pending_revocations(&status[0].health), 1);

    let mut retry = at(Utc::now());
    retry.expiring = true;
    let third = orchestrator.rotate(&retry).await.unwrap();
    assert_eq!(third.outcomes[0].revocation_failures.len(), 1);
    assert_eq!(backends.directory.call_count("remove_password").await, 2);
}

#[tokio::test]
async fn test_already_removed_credential_counts_as_revoked() {
    let backends = backends();
    let orchestrator = orchestrator(
        &backends,
        vec![service_principal_plan("deployer", RevocationPolicy::Immediate)],
    );
    orchestrator.rotate(&at(Utc::now())).await.unwrap();

    // Someone removed the credential out of band
    let key_ids = backends.directory.passwords("deployer-app").await;
    {
        use keyward::clients::DirectoryClient;
        backends.directory.remove_password("deployer-app", &key_ids[0]).await.unwrap();
    }

    let second = orchestrator.rotate(&at(Utc::now())).await.unwrap();
    assert_eq!(second.outcomes[0].revoked, 1);
    assert!(second.outcomes[0].revocation_failures.is_empty());
}
