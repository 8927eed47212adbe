//! Duplicate run detection
//!
//! A run is a duplicate when its fingerprint `(tier, wave, duration, coins)`
//! exactly matches an already-logged run. Cells, dice and killed-by are left
//! out because OCR misreads them most often. Matching is exact rather than
//! fuzzy: a false positive would overwrite a distinct run.

use crate::run::{Amount, RunRecord};

/// Result of a duplicate scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DuplicateMatch {
    pub is_duplicate: bool,
    pub matched_run_id: Option<String>,
}

impl DuplicateMatch {
    pub fn none() -> Self {
        Self::default()
    }

    fn matched(run_id: Option<String>) -> Self {
        Self {
            is_duplicate: true,
            matched_run_id: run_id,
        }
    }
}

/// Comparison key of a run
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    /// Numeric tier; the `+` qualifier does not take part
    pub tier: Option<u32>,
    pub wave: Option<u64>,
    /// Canonical `XhYmZs` text, compared strictly
    pub duration: String,
    pub coins: Amount,
}

impl Fingerprint {
    pub fn of(run: &RunRecord) -> Self {
        Self {
            tier: run.tier.level,
            wave: run.wave,
            duration: run.duration.to_string(),
            coins: run.coins.clone(),
        }
    }

    /// Loose numeric equality for tier, wave and coins; strict for duration
    pub fn matches(&self, other: &Fingerprint) -> bool {
        self.tier == other.tier
            && self.wave == other.wave
            && self.duration == other.duration
            && self.coins.same_value(&other.coins)
    }
}

/// Find the first run in `history` sharing the candidate's fingerprint
pub fn find_duplicate(candidate: &RunRecord, history: &[RunRecord]) -> DuplicateMatch {
    let key = Fingerprint::of(candidate);
    history
        .iter()
        .find(|existing| key.matches(&Fingerprint::of(existing)))
        .map(|existing| DuplicateMatch::matched(existing.run_id.clone()))
        .unwrap_or_else(DuplicateMatch::none)
}

/// Split a migration batch into runs not yet logged and runs already present
///
/// Runs earlier in the batch count as history for later ones, so a batch that
/// repeats itself imports each run once.
pub fn partition_new_runs(candidates: Vec<RunRecord>, history: &[RunRecord]) -> (Vec<RunRecord>, Vec<RunRecord>) {
    let mut fresh: Vec<RunRecord> = Vec::new();
    let mut existing = Vec::new();
    for candidate in candidates {
        if find_duplicate(&candidate, history).is_duplicate || find_duplicate(&candidate, &fresh).is_duplicate {
            existing.push(candidate);
        } else {
            fresh.push(candidate);
        }
    }
    (fresh, existing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_incoming;
    use serde_json::{json, Map, Value};

    fn run(value: Value) -> RunRecord {
        normalize_incoming(value.as_object().unwrap(), &Map::new())
    }

    fn candidate() -> RunRecord {
        run(json!({ "tier": 15, "wave": 200, "duration": "1h0m0s", "coins": "5M" }))
    }

    #[test]
    fn test_matches_across_types() {
        let history = vec![run(
            json!({ "tier": "15", "wave": 200, "duration": "1h0m0s", "coins": 5000000, "runId": "abc" }),
        )];
        assert_eq!(
            find_duplicate(&candidate(), &history),
            DuplicateMatch {
                is_duplicate: true,
                matched_run_id: Some("abc".to_string())
            }
        );
    }

    #[test]
    fn test_coin_mismatch_breaks_match() {
        let history = vec![run(
            json!({ "tier": "15", "wave": 200, "duration": "1h0m0s", "coins": "5.1M", "runId": "abc" }),
        )];
        assert_eq!(find_duplicate(&candidate(), &history), DuplicateMatch::none());
    }

    #[test]
    fn test_duration_is_normalized_before_compare() {
        let history = vec![run(
            json!({ "tier": 15, "wave": 200, "duration": "1h", "coins": "5000K", "runId": "x" }),
        )];
        assert!(find_duplicate(&candidate(), &history).is_duplicate);

        let carried = vec![run(
            json!({ "tier": 15, "wave": 200, "duration": "60m", "coins": "5M", "runId": "y" }),
        )];
        assert!(!find_duplicate(&candidate(), &carried).is_duplicate);
    }

    #[test]
    fn test_plus_qualifier_ignored_for_matching() {
        let history = vec![run(
            json!({ "tier": "15+", "wave": 200, "duration": "1h0m0s", "coins": "5M", "runId": "p" }),
        )];
        assert_eq!(
            find_duplicate(&candidate(), &history).matched_run_id.as_deref(),
            Some("p")
        );
    }

    #[test]
    fn test_first_match_wins_and_order_of_others_is_irrelevant() {
        let other_a = run(json!({ "tier": 3, "wave": 10, "coins": "1K", "runId": "a" }));
        let other_b = run(json!({ "tier": 4, "wave": 20, "coins": "2K", "runId": "b" }));
        let first = run(json!({ "tier": 15, "wave": 200, "duration": "1h0m0s", "coins": "5M", "runId": "first" }));
        let second = run(json!({ "tier": 15, "wave": 200, "duration": "1h0m0s", "coins": "5M", "runId": "second" }));

        let h1 = vec![other_a.clone(), first.clone(), other_b.clone(), second.clone()];
        let h2 = vec![other_b, first, other_a, second];
        let c = candidate();

        assert_eq!(find_duplicate(&c, &h1).matched_run_id.as_deref(), Some("first"));
        assert_eq!(find_duplicate(&c, &h1), find_duplicate(&c, &h1));
        assert_eq!(find_duplicate(&c, &h2).matched_run_id.as_deref(), Some("first"));
    }

    #[test]
    fn test_partition_new_runs() {
        let history = vec![run(json!({ "tier": 1, "wave": 1, "coins": "1", "runId": "old" }))];
        let batch = vec![
            run(json!({ "tier": 1, "wave": 1, "coins": "1" })),
            run(json!({ "tier": 2, "wave": 2, "coins": "2" })),
            run(json!({ "tier": 2, "wave": 2, "coins": "2" })),
        ];
        let (fresh, existing) = partition_new_runs(batch, &history);
        assert_eq!(fresh.len(), 1);
        assert_eq!(existing.len(), 2);
    }
}
