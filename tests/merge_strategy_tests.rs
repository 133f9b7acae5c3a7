//! Merge-strategy resolution precedence through the public API.

use provisio::{resolve, MergeStrategy, MergeStrategyMap};

fn namespace_direct_map() -> MergeStrategyMap {
    MergeStrategyMap::from_json(r#"{"k8s/namespace": "direct"}"#)
}

#[test]
fn explicit_override_wins() {
    assert_eq!(
        resolve(
            Some(MergeStrategy::PullRequest),
            "k8s/namespace",
            &namespace_direct_map(),
            MergeStrategy::Direct,
        ),
        MergeStrategy::PullRequest
    );
}

#[test]
fn configured_map_wins_over_default() {
    assert_eq!(
        resolve(
            None,
            "k8s/namespace",
            &namespace_direct_map(),
            MergeStrategy::Direct,
        ),
        MergeStrategy::Direct
    );

    let pr_map = MergeStrategyMap::from_json(r#"{"k8s/namespace": "pull_request"}"#);
    assert_eq!(
        resolve(None, "k8s/namespace", &pr_map, MergeStrategy::Direct),
        MergeStrategy::PullRequest
    );
}

#[test]
fn default_applies_when_category_is_unmapped() {
    assert_eq!(
        resolve(None, "misc", &MergeStrategyMap::default(), MergeStrategy::Direct),
        MergeStrategy::Direct
    );
}

#[test]
fn malformed_map_resolves_identically_to_empty() {
    let malformed = MergeStrategyMap::from_json("]]not json[[");
    let empty = MergeStrategyMap::default();
    for category in ["misc", "k8s/namespace", "compute/vms"] {
        assert_eq!(
            resolve(None, category, &malformed, MergeStrategy::Direct),
            resolve(None, category, &empty, MergeStrategy::Direct),
        );
        assert_eq!(
            resolve(None, category, &malformed, MergeStrategy::PullRequest),
            resolve(None, category, &empty, MergeStrategy::PullRequest),
        );
    }
}

#[test]
fn legacy_pr_spelling_is_accepted() {
    let map = MergeStrategyMap::from_json(r#"{"k8s/namespace": "pr"}"#);
    assert_eq!(
        resolve(None, "k8s/namespace", &map, MergeStrategy::Direct),
        MergeStrategy::PullRequest
    );
}
