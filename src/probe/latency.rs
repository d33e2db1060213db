//! Latency / throughput probe.
//!
//! Issues N sequential plain completions and averages wall-clock latency,
//! plus tokens/sec where the endpoint reports completion-token usage.
//! Endpoints that omit usage still pass; the throughput figure is then
//! omitted, never fabricated as zero. One transport failure aborts the
//! whole probe with that reason; there is no partial averaging over
//! failed iterations.

use std::time::{Duration, Instant};

use crate::probe::wire::{self, ChatResponse};
use crate::probe::{LatencyStats, ProbeFailure, ProbeOutcome};

/// One measured iteration.
#[derive(Debug, Clone, Copy)]
struct Sample {
    elapsed_sec: f64,
    completion_tokens: Option<u64>,
}

/// Probe one (endpoint, model) pair for latency and throughput.
pub async fn probe_latency(
    client: &reqwest::Client,
    url: &str,
    model: &str,
    prompt: &str,
    iterations: u32,
    timeout: Duration,
) -> ProbeOutcome {
    if iterations == 0 {
        return ProbeOutcome::fail(ProbeFailure::Invalid(
            "iterations must be positive".to_string(),
        ));
    }

    let payload = wire::completion_request(model, prompt);
    let mut samples = Vec::with_capacity(iterations as usize);

    for _ in 0..iterations {
        let start = Instant::now();

        let response = match client
            .post(url)
            .timeout(timeout)
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => return ProbeOutcome::fail(ProbeFailure::from_transport(err)),
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => return ProbeOutcome::fail(ProbeFailure::from_transport(err)),
        };
        if status.as_u16() >= 400 {
            return ProbeOutcome::fail(ProbeFailure::http(status.as_u16(), &body));
        }

        let parsed: ChatResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(err) => return ProbeOutcome::fail(ProbeFailure::NonJson(err.to_string())),
        };

        samples.push(Sample {
            elapsed_sec: start.elapsed().as_secs_f64(),
            completion_tokens: parsed.usage.as_ref().and_then(|u| u.completion_tokens),
        });
    }

    ProbeOutcome::Latency(aggregate(&samples))
}

/// Arithmetic means over the samples; throughput only from iterations
/// whose usage was present and whose elapsed time is nonzero.
fn aggregate(samples: &[Sample]) -> LatencyStats {
    let avg_latency_sec = mean(samples.iter().map(|s| s.elapsed_sec)).unwrap_or(0.0);
    let avg_tokens_per_sec = mean(samples.iter().filter_map(|s| {
        let tokens = s.completion_tokens?;
        (s.elapsed_sec > 0.0).then(|| tokens as f64 / s.elapsed_sec)
    }));

    LatencyStats {
        avg_latency_sec,
        avg_tokens_per_sec,
        iterations: samples.len() as u32,
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0u32;
    for value in values {
        sum += value;
        count += 1;
    }
    (count > 0).then(|| sum / f64::from(count))
}

// ── Tests ────────────────────────────────────────────────────────
