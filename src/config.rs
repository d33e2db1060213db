//! Configuration file loading.
//!
//! Every input is a small JSON object with optional keys: serde defaults
//! keep absent keys meaning "disabled", and unknown keys are ignored for
//! forward compatibility. Malformed files are fatal configuration
//! errors, reported before any network activity happens.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::policy::evaluator::PolicyRuleSet;
use crate::policy::fixtures::FixtureCase;
use crate::probe::orchestrator::RuntimeTarget;
use crate::vram::VramSignal;

/// Prompt used by latency probes when a config does not override it.
pub const DEFAULT_LATENCY_PROMPT: &str = "Say hello in one sentence.";

/// Load the routing rule file. All keys are optional; an empty object is
/// a valid rule set with everything disabled.
pub fn load_rules(path: &Path) -> Result<PolicyRuleSet> {
    read_json(path).with_context(|| format!("failed to load policy rules from {}", path.display()))
}

// ── VRAM sample file ─────────────────────────────────────────────

/// External VRAM sampler output: the reduced signal. The full `vram`
/// snapshot is a superset carrying the same reduction keys, so either
/// file works here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VramSampleFile {
    pub min_free_mib: Option<i64>,
    pub min_free_ratio: Option<f64>,
}

impl VramSampleFile {
    pub fn signal(&self) -> VramSignal {
        VramSignal {
            free_mib: self.min_free_mib,
            free_ratio: self.min_free_ratio,
        }
    }
}

/// Load an external VRAM sample into the signal shape routing consumes.
pub fn load_vram_sample(path: &Path) -> Result<VramSignal> {
    let sample: VramSampleFile = read_json(path)
        .with_context(|| format!("failed to load VRAM sample from {}", path.display()))?;
    Ok(sample.signal())
}

// ── Runtime probe config ─────────────────────────────────────────

/// Runtime probe configuration: targets plus shared probe knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub runtimes: Vec<RuntimeTarget>,
    pub latency_prompt: String,
    pub iterations: u32,
    pub timeout_sec: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            runtimes: Vec::new(),
            latency_prompt: DEFAULT_LATENCY_PROMPT.to_string(),
            iterations: 3,
            timeout_sec: 60,
        }
    }
}

/// Load the runtime config, rejecting values the probes cannot honor.
pub fn load_runtime_config(path: &Path) -> Result<RuntimeConfig> {
    let config: RuntimeConfig = read_json(path)
        .with_context(|| format!("failed to load runtime config from {}", path.display()))?;
    if config.iterations == 0 {
        bail!("iterations must be positive in {}", path.display());
    }
    Ok(config)
}

// ── Policy fixtures ──────────────────────────────────────────────

/// Policy regression fixtures: a rules path plus expectation cases.
#[derive(Debug, Clone, Deserialize)]
pub struct FixtureFile {
    /// Path to the rule file the cases were written against.
    pub rules: String,
    pub cases: Vec<FixtureCase>,
}

pub fn load_fixtures(path: &Path) -> Result<FixtureFile> {
    let fixtures: FixtureFile = read_json(path)
        .with_context(|| format!("failed to load policy fixtures from {}", path.display()))?;
    if fixtures.cases.is_empty() {
        bail!(
            "fixtures must include a non-empty cases[] ({})",
            path.display()
        );
    }
    Ok(fixtures)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_json(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn rules_load_with_all_keys() {
        let file = write_json(
            r#"{
                "denylist_paths": ["secrets/*"],
                "sensitive_paths": ["billing/*"],
                "long_context_threshold_tokens": 8000,
                "min_free_vram_mib": 2000,
                "min_free_vram_ratio": 0.1
            }"#,
        );
        let rules = load_rules(file.path()).unwrap();
        assert_eq!(rules.denylist_paths, vec!["secrets/*"]);
        assert_eq!(rules.long_context_threshold_tokens, 8000);
        assert!(rules.vram_gated());
    }

    #[test]
    fn empty_rules_object_disables_everything() {
        let file = write_json("{}");
        let rules = load_rules(file.path()).unwrap();
        assert!(rules.denylist_paths.is_empty());
        assert_eq!(rules.long_context_threshold_tokens, 0);
        assert!(!rules.vram_gated());
    }

    #[test]
    fn unknown_rule_keys_are_ignored() {
        let file = write_json(r#"{"future_knob": true, "denylist_paths": ["*.pem"]}"#);
        let rules = load_rules(file.path()).unwrap();
        assert_eq!(rules.denylist_paths, vec!["*.pem"]);
    }

    #[test]
    fn malformed_rules_are_a_fatal_error() {
        let file = write_json("{not json");
        let err = load_rules(file.path()).unwrap_err();
        assert!(err.to_string().contains("failed to load policy rules"));
    }

    #[test]
    fn missing_rule_file_is_a_fatal_error() {
        assert!(load_rules(Path::new("/nonexistent/rules.json")).is_err());
    }

    #[test]
    fn vram_sample_maps_to_signal() {
        let file = write_json(r#"{"min_free_mib": 1500, "min_free_ratio": 0.12}"#);
        let signal = load_vram_sample(file.path()).unwrap();
        assert_eq!(signal.free_mib, Some(1500));
        assert_eq!(signal.free_ratio, Some(0.12));
    }

    #[test]
    fn partial_vram_sample_keeps_absent_fields_absent() {
        let file = write_json(r#"{"min_free_mib": 1500}"#);
        let signal = load_vram_sample(file.path()).unwrap();
        assert_eq!(signal.free_mib, Some(1500));
        assert_eq!(signal.free_ratio, None);
    }

    #[test]
    fn full_snapshot_output_is_accepted_as_a_sample() {
        // The `vram` subcommand's snapshot is a superset of the sample file.
        let file = write_json(
            r#"{"ok": true, "timestamp": 1, "gpus": [], "min_free_mib": 900, "min_free_ratio": 0.07}"#,
        );
        let signal = load_vram_sample(file.path()).unwrap();
        assert_eq!(signal.free_mib, Some(900));
    }

    #[test]
    fn runtime_config_defaults_apply() {
        let file = write_json(r#"{"runtimes": [{"name": "ollama", "url": "http://127.0.0.1:11434/v1/chat/completions", "models": ["qwen3:0.6b"]}]}"#);
        let config = load_runtime_config(file.path()).unwrap();
        assert_eq!(config.latency_prompt, DEFAULT_LATENCY_PROMPT);
        assert_eq!(config.iterations, 3);
        assert_eq!(config.timeout_sec, 60);
        assert!(config.runtimes[0].enabled);
    }

    #[test]
    fn runtime_config_zero_iterations_rejected() {
        let file = write_json(r#"{"iterations": 0}"#);
        let err = load_runtime_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("iterations must be positive"));
    }

    #[test]
    fn fixtures_require_cases() {
        let file = write_json(r#"{"rules": "rules.json", "cases": []}"#);
        let err = load_fixtures(file.path()).unwrap_err();
        assert!(err.to_string().contains("non-empty cases[]"));
    }

    #[test]
    fn fixtures_load_cases_in_order() {
        let file = write_json(
            r#"{"rules": "rules.json", "cases": [
                {"name": "a", "paths": ["x"], "expected": {"route": "local", "reason": "default_safe"}},
                {"name": "b", "paths": ["y"], "tokens": 9, "expected": {"route": "local", "reason": "default_safe"}}
            ]}"#,
        );
        let fixtures = load_fixtures(file.path()).unwrap();
        assert_eq!(fixtures.rules, "rules.json");
        assert_eq!(fixtures.cases.len(), 2);
        assert_eq!(fixtures.cases[1].tokens, 9);
    }
}
