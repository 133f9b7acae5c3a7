//! Merge-strategy policy: how rendered configuration lands in a repository.
//!
//! Resolution is a pure function over (explicit override, per-category map,
//! system default); no network, no clock, unit-testable without any process
//! environment.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::jobs::Payload;

/// Delivery mode for rendered configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Commit straight to the default branch.
    #[default]
    Direct,
    /// Push a review branch; merging is gated on an out-of-band PR.
    PullRequest,
}

impl FromStr for MergeStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(MergeStrategy::Direct),
            // "pr" is the legacy spelling still found in operator config
            "pull_request" | "pr" => Ok(MergeStrategy::PullRequest),
            _ => Err(()),
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeStrategy::Direct => f.write_str("direct"),
            MergeStrategy::PullRequest => f.write_str("pull_request"),
        }
    }
}

/// Per-category strategy mapping sourced from operator configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeStrategyMap(HashMap<String, MergeStrategy>);

impl MergeStrategyMap {
    pub fn new(map: HashMap<String, MergeStrategy>) -> Self {
        Self(map)
    }

    /// Parse the JSON map operators push through configuration.
    ///
    /// Malformed input degrades to an empty map with a warning; a bad
    /// config push must not take resolution down with it. Unrecognized
    /// strategy values are skipped the same way.
    pub fn from_json(raw: &str) -> Self {
        let parsed: HashMap<String, Value> = match serde_json::from_str(raw) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(error = %err, "malformed merge-strategy map, treating as empty");
                return Self::default();
            }
        };

        let mut map = HashMap::new();
        for (category, value) in parsed {
            match value.as_str().and_then(|s| s.parse::<MergeStrategy>().ok()) {
                Some(strategy) => {
                    map.insert(category, strategy);
                }
                None => {
                    warn!(%category, %value, "unrecognized merge strategy, skipping entry");
                }
            }
        }
        Self(map)
    }

    pub fn get(&self, category: &str) -> Option<MergeStrategy> {
        self.0.get(category).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Resolve the merge strategy for one delivery.
///
/// Precedence: explicit override, then the configured per-category mapping,
/// then the system default.
pub fn resolve(
    explicit: Option<MergeStrategy>,
    category: &str,
    configured: &MergeStrategyMap,
    default: MergeStrategy,
) -> MergeStrategy {
    if let Some(strategy) = explicit {
        return strategy;
    }
    if let Some(strategy) = configured.get(category) {
        return strategy;
    }
    default
}

/// Extract an explicit per-job override from the request payload.
///
/// An invalid value is not an error: it degrades to "no override" with a
/// warning, matching the resolver's tolerance for bad operator input.
pub fn explicit_override(payload: &Payload) -> Option<MergeStrategy> {
    let raw = payload.get("merge_strategy")?.as_str()?;
    match raw.parse() {
        Ok(strategy) => Some(strategy),
        Err(()) => {
            warn!(value = %raw, "invalid merge_strategy override in payload, ignoring");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn configured(entries: &[(&str, MergeStrategy)]) -> MergeStrategyMap {
        MergeStrategyMap::new(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        )
    }

    #[test]
    fn explicit_wins_over_map_and_default() {
        let map = configured(&[("k8s/namespace", MergeStrategy::Direct)]);
        assert_eq!(
            resolve(
                Some(MergeStrategy::PullRequest),
                "k8s/namespace",
                &map,
                MergeStrategy::Direct
            ),
            MergeStrategy::PullRequest
        );
    }

    #[test]
    fn map_wins_over_default() {
        let map = configured(&[("k8s/namespace", MergeStrategy::Direct)]);
        assert_eq!(
            resolve(None, "k8s/namespace", &map, MergeStrategy::Direct),
            MergeStrategy::Direct
        );
        let pr_map = configured(&[("k8s/namespace", MergeStrategy::PullRequest)]);
        assert_eq!(
            resolve(None, "k8s/namespace", &pr_map, MergeStrategy::Direct),
            MergeStrategy::PullRequest
        );
    }

    #[test]
    fn default_applies_for_unmapped_category() {
        assert_eq!(
            resolve(None, "misc", &MergeStrategyMap::default(), MergeStrategy::Direct),
            MergeStrategy::Direct
        );
    }

    #[test]
    fn malformed_map_resolves_like_empty() {
        let malformed = MergeStrategyMap::from_json("{not json at all");
        assert!(malformed.is_empty());
        assert_eq!(
            resolve(None, "misc", &malformed, MergeStrategy::Direct),
            MergeStrategy::Direct
        );
    }

    #[test]
    fn unknown_strategy_values_are_skipped() {
        let map = MergeStrategyMap::from_json(
            r#"{"k8s/namespace": "rebase", "k8s/pvs": "pr"}"#,
        );
        assert_eq!(map.get("k8s/namespace"), None);
        assert_eq!(map.get("k8s/pvs"), Some(MergeStrategy::PullRequest));
    }

    #[test]
    fn payload_override_parses_leniently() {
        let mut payload = Payload::new();
        payload.insert("merge_strategy".to_string(), json!("pull_request"));
        assert_eq!(explicit_override(&payload), Some(MergeStrategy::PullRequest));

        payload.insert("merge_strategy".to_string(), json!("sideways"));
        assert_eq!(explicit_override(&payload), None);

        payload.remove("merge_strategy");
        assert_eq!(explicit_override(&payload), None);
    }
}
