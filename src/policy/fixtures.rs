//! Fixture-driven policy regression checking.
//!
//! Operators keep a JSON file of (task, expected decision) cases next to
//! their rule file; any drift between the deployed rules and the engine
//! is a blocking error, one message per mismatched case.

use serde::Deserialize;

use crate::policy::evaluator::{self, PolicyRuleSet, TaskRequest};
use crate::vram::VramSignal;

/// One regression case.
#[derive(Debug, Clone, Deserialize)]
pub struct FixtureCase {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub tokens: u64,
    /// Optional per-case VRAM signal, so the VRAM branches are
    /// regression-testable too.
    #[serde(default)]
    pub vram: Option<VramSignal>,
    pub expected: ExpectedDecision,
}

impl FixtureCase {
    fn label(&self, idx: usize) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("case[{idx}]"))
    }
}

/// Expected route/reason pair, compared by wire name.
#[derive(Debug, Clone, Deserialize)]
pub struct ExpectedDecision {
    pub route: String,
    pub reason: String,
}

/// Evaluate every case against the rules; return one message per
/// mismatch, in case order. Empty means the fixtures pass.
pub fn check(rules: &PolicyRuleSet, cases: &[FixtureCase]) -> Vec<String> {
    let mut failures = Vec::new();

    for (idx, case) in cases.iter().enumerate() {
        let task = TaskRequest {
            paths: case.paths.clone(),
            token_count: case.tokens,
        };
        let decision = evaluator::evaluate(&task, rules, case.vram.as_ref());

        if decision.route.as_str() != case.expected.route
            || decision.reason.as_str() != case.expected.reason
        {
            failures.push(format!(
                "{}: expected {}/{} got {}/{}",
                case.label(idx),
                case.expected.route,
                case.expected.reason,
                decision.route,
                decision.reason,
            ));
        }
    }

    failures
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> PolicyRuleSet {
        PolicyRuleSet {
            denylist_paths: vec!["secrets/*".into()],
            long_context_threshold_tokens: 1000,
            min_free_vram_mib: 2000,
            ..PolicyRuleSet::default()
        }
    }

    fn case(name: &str, paths: &[&str], tokens: u64, route: &str, reason: &str) -> FixtureCase {
        FixtureCase {
            name: Some(name.to_string()),
            paths: paths.iter().map(|p| (*p).to_string()).collect(),
            tokens,
            vram: None,
            expected: ExpectedDecision {
                route: route.to_string(),
                reason: reason.to_string(),
            },
        }
    }

    #[test]
    fn matching_fixtures_pass() {
        let cases = vec![
            case("deny", &["secrets/key"], 0, "claude_only", "denylist_path"),
            case("no_signal", &["src/a.rs"], 0, "claude_first", "missing_vram_signal"),
        ];
        assert!(check(&rules(), &cases).is_empty());
    }

    #[test]
    fn mismatch_names_the_case_and_both_decisions() {
        let cases = vec![case("wrong", &["secrets/key"], 0, "local", "default_safe")];
        let failures = check(&rules(), &cases);
        assert_eq!(failures.len(), 1);
        assert_eq!(
            failures[0],
            "wrong: expected local/default_safe got claude_only/denylist_path"
        );
    }

    #[test]
    fn unnamed_cases_get_positional_labels() {
        let mut unnamed = case("", &["src/a.rs"], 0, "local", "default_safe");
        unnamed.name = None;
        let failures = check(&rules(), &[unnamed]);
        // Rules gate on VRAM, so this case actually fails closed.
        assert_eq!(failures.len(), 1);
        assert!(failures[0].starts_with("case[0]:"), "got: {}", failures[0]);
    }

    #[test]
    fn per_case_vram_signal_is_used() {
        let mut low = case("low", &["src/a.rs"], 0, "claude_first", "low_vram");
        low.vram = Some(VramSignal {
            free_mib: Some(1500),
            free_ratio: None,
        });
        let mut ok = case("ok", &["src/a.rs"], 0, "local", "default_safe");
        ok.vram = Some(VramSignal {
            free_mib: Some(3000),
            free_ratio: None,
        });
        assert!(check(&rules(), &[low, ok]).is_empty());
    }

    #[test]
    fn fixture_case_deserializes_from_json() {
        let case: FixtureCase = serde_json::from_value(serde_json::json!({
            "name": "deny",
            "paths": ["secrets/key"],
            "tokens": 5,
            "vram": {"free_mib": 4096},
            "expected": {"route": "claude_only", "reason": "denylist_path"},
        }))
        .unwrap();
        assert_eq!(case.vram.unwrap().free_mib, Some(4096));
    }
}
