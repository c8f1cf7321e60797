use keyward::access::diff_credentials;
use keyward::domain::FederatedIdentityCredential;
use proptest::prelude::*;

use crate::support::credential;

// Small pools so live and desired overlap often.
fn credentials() -> impl Strategy<Value = Vec<FederatedIdentityCredential>> {
    prop::collection::vec(("[ab]", "[xy]"), 0..6)
        .prop_map(|pairs| pairs.iter().map(|(name, subject)| credential(name, subject)).collect())
}

fn unique_live() -> impl Strategy<Value = Vec<FederatedIdentityCredential>> {
    credentials().prop_map(|mut live| {
        let mut seen = Vec::new();
        live.retain(|c| {
            let fresh = !seen.contains(c);
            seen.push(c.clone());
            fresh
        });
        live
    })
}

proptest! {
    #[test]
    fn live_splits_into_unchanged_and_removed(live in unique_live(), desired in credentials()) {
        let diff = diff_credentials(&live, &desired);
        for credential in &live {
            let kept = diff.unchanged.contains(credential);
            let dropped = diff.removed.contains(credential);
            prop_assert!(kept != dropped);
        }
        prop_assert_eq!(diff.unchanged.len() + diff.removed.len(), live.len());
    }

    #[test]
    fn created_entries_are_never_live(live in unique_live(), desired in credentials()) {
        let diff = diff_credentials(&live, &desired);
        for credential in &diff.created {
            prop_assert!(!live.contains(credential));
            prop_assert!(desired.contains(credential));
        }
    }

    #[test]
    fn applying_the_diff_yields_the_desired_set(live in unique_live(), desired in credentials()) {
        let diff = diff_credentials(&live, &desired);

        let mut result: Vec<_> = live.iter().filter(|c| !diff.removed.contains(c)).cloned().collect();
        result.extend(diff.created.iter().cloned());

        let mut expected = Vec::new();
        for credential in &desired {
            if !expected.contains(credential) {
                expected.push(credential.clone());
            }
        }

        prop_assert_eq!(result.len(), expected.len());
        for credential in &expected {
            prop_assert!(result.contains(credential));
        }
    }
}
