//! Probe orchestrator: conformance + latency across configured runtimes.
//!
//! Probes run sequentially, one HTTP round trip at a time, each under
//! its own timeout. Structurally invalid targets (no url, no models) are
//! recorded as configuration failures without any network I/O. There are
//! no automatic retries; retry policy belongs to the caller.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::probe::wire::ToolCallCheck;
use crate::probe::{conformance, latency, ProbeOutcome};

// ── Targets ──────────────────────────────────────────────────────

/// One runtime endpoint and the models it should serve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeTarget {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_name() -> String {
    "unknown".to_string()
}

fn default_enabled() -> bool {
    true
}

// ── Report ───────────────────────────────────────────────────────

/// Probe results for one (runtime, model) pair.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeRecord {
    pub runtime: String,
    pub url: String,
    pub model: String,
    pub tool_calls: ProbeOutcome,
    pub latency: ProbeOutcome,
}

impl ProbeRecord {
    pub fn is_ok(&self) -> bool {
        self.tool_calls.is_ok() && self.latency.is_ok()
    }

    /// First error across the pair's probes, for the failure list.
    pub fn first_error(&self) -> Option<&str> {
        self.tool_calls.error().or_else(|| self.latency.error())
    }
}

/// One failure, in probe order. Configuration failures carry no model.
#[derive(Debug, Clone, Serialize)]
pub struct FailureEntry {
    pub runtime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub error: String,
}

/// Aggregated outcome of one orchestrator run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProbeReport {
    pub results: Vec<ProbeRecord>,
    pub failures: Vec<FailureEntry>,
}

impl ProbeReport {
    /// Nonempty failures means the overall run (and process) failed.
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

// ── Options ──────────────────────────────────────────────────────

/// Knobs shared by every probe in a run.
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub latency_prompt: String,
    pub iterations: u32,
    pub timeout: Duration,
    /// Stop at the first failure instead of reporting everything.
    pub fail_fast: bool,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            latency_prompt: crate::config::DEFAULT_LATENCY_PROMPT.to_string(),
            iterations: 3,
            timeout: Duration::from_secs(60),
            fail_fast: false,
        }
    }
}

// ── Run loop ─────────────────────────────────────────────────────

/// Run conformance then latency probes for every enabled runtime and
/// every declared model.
///
/// Every pair gets a record regardless of outcome. In fail-fast mode the
/// loop stops at the first failure, keeping everything recorded so far
/// and probing nothing further.
pub async fn run(
    client: &reqwest::Client,
    runtimes: &[RuntimeTarget],
    options: &ProbeOptions,
) -> ProbeReport {
    let mut report = ProbeReport::default();

    for runtime in runtimes {
        if !runtime.enabled {
            tracing::debug!(runtime = %runtime.name, "skipping disabled runtime");
            continue;
        }

        if runtime.url.is_empty() || runtime.models.is_empty() {
            report.failures.push(FailureEntry {
                runtime: runtime.name.clone(),
                model: None,
                error: "missing url or models".to_string(),
            });
            if options.fail_fast {
                return report;
            }
            continue;
        }

        for model in &runtime.models {
            tracing::info!(runtime = %runtime.name, model = %model, "probing");

            let tool_calls = conformance::probe_tool_call(
                client,
                &runtime.url,
                model,
                &ToolCallCheck::default(),
                options.timeout,
            )
            .await;
            let latency = latency::probe_latency(
                client,
                &runtime.url,
                model,
                &options.latency_prompt,
                options.iterations,
                options.timeout,
            )
            .await;

            let record = ProbeRecord {
                runtime: runtime.name.clone(),
                url: runtime.url.clone(),
                model: model.clone(),
                tool_calls,
                latency,
            };

            let failed = !record.is_ok();
            if failed {
                let error = record.first_error().unwrap_or("unknown error").to_string();
                tracing::warn!(runtime = %runtime.name, model = %model, %error, "probe failed");
                report.failures.push(FailureEntry {
                    runtime: runtime.name.clone(),
                    model: Some(model.clone()),
                    error,
                });
            }
            report.results.push(record);

            if failed && options.fail_fast {
                return report;
            }
        }
    }

    report
}

// ── Tests ────────────────────────────────────────────────────────
