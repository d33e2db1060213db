//! Conformance and performance probes for OpenAI-compatible runtimes.
//!
//! Each probe is one attempt against one endpoint: build a request, send
//! it under an explicit timeout, classify what came back. A probe's life
//! is Pending → Sent → Succeeded | Failed(reason); there are no automatic
//! retries, and no failure escapes as an error or panic. Callers always
//! receive a structured [`ProbeOutcome`].

pub mod conformance;
pub mod discovery;
pub mod latency;
pub mod orchestrator;
pub mod wire;

use std::time::Duration;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Why a probe failed. Transport, protocol, and validation causes stay
/// distinct so operators can tell a dead endpoint from a noncompliant
/// one.
#[derive(Debug, Error)]
pub enum ProbeFailure {
    /// The endpoint answered with an error status.
    #[error("HTTP {status} ({body})")]
    Http { status: u16, body: String },
    /// The request deadline expired.
    #[error("timeout ({0})")]
    Timeout(String),
    /// The connection could not be established.
    #[error("connection error ({0})")]
    Connect(String),
    /// Any other transport-level failure (DNS, TLS, bad URL, …).
    #[error("request error ({0})")]
    Transport(String),
    /// A 2xx body that does not parse as JSON.
    #[error("non-JSON response ({0})")]
    NonJson(String),
    /// The response parsed but violates the expected contract.
    #[error("{0}")]
    Invalid(String),
}

impl ProbeFailure {
    /// Classify a reqwest error into the transport taxonomy.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProbeFailure::Timeout(err.to_string())
        } else if err.is_connect() {
            ProbeFailure::Connect(err.to_string())
        } else {
            ProbeFailure::Transport(err.to_string())
        }
    }

    /// Protocol failure carrying the response body for diagnosis.
    pub fn http(status: u16, body: &str) -> Self {
        let body = body.trim();
        ProbeFailure::Http {
            status,
            body: if body.is_empty() {
                "no error body".to_string()
            } else {
                body.to_string()
            },
        }
    }
}

/// Aggregated numbers carried by a successful latency probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyStats {
    /// Arithmetic mean of per-call wall-clock seconds.
    pub avg_latency_sec: f64,
    /// Mean tokens/sec over the iterations that reported usage; absent
    /// when the endpoint never did.
    pub avg_tokens_per_sec: Option<f64>,
    pub iterations: u32,
}

/// Result of a single probe.
///
/// `Pass`/`Latency` never carry an error and `Fail` never carries stats,
/// so "ok xor error" holds by construction.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    /// Conformance probe passed.
    Pass,
    /// Latency probe passed, with its aggregates.
    Latency(LatencyStats),
    /// Probe failed with a classified reason.
    Fail(String),
}

impl ProbeOutcome {
    pub fn fail(failure: ProbeFailure) -> Self {
        ProbeOutcome::Fail(failure.to_string())
    }

    pub fn is_ok(&self) -> bool {
        !matches!(self, ProbeOutcome::Fail(_))
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ProbeOutcome::Fail(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn stats(&self) -> Option<&LatencyStats> {
        match self {
            ProbeOutcome::Latency(stats) => Some(stats),
            _ => None,
        }
    }
}

impl Serialize for ProbeOutcome {
    /// Wire shape is always `{ok, …}` so scripts can branch on one field.
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ProbeOutcome::Pass => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("ok", &true)?;
                map.end()
            }
            ProbeOutcome::Latency(stats) => {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("ok", &true)?;
                map.serialize_entry("avg_latency_sec", &stats.avg_latency_sec)?;
                if let Some(tps) = stats.avg_tokens_per_sec {
                    map.serialize_entry("avg_tokens_per_sec", &tps)?;
                }
                map.serialize_entry("iterations", &stats.iterations)?;
                map.end()
            }
            ProbeOutcome::Fail(reason) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("ok", &false)?;
                map.serialize_entry("error", reason)?;
                map.end()
            }
        }
    }
}

/// Build the HTTP client shared by the probes. Connection setup gets its
/// own short deadline; per-request timeouts come from the caller.
pub fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_serializes_ok_only() {
        let json = serde_json::to_value(ProbeOutcome::Pass).unwrap();
        assert_eq!(json, serde_json::json!({"ok": true}));
    }

    #[test]
    fn fail_serializes_ok_and_error() {
        let json = serde_json::to_value(ProbeOutcome::Fail("boom".into())).unwrap();
        assert_eq!(json, serde_json::json!({"ok": false, "error": "boom"}));
    }

    #[test]
    fn latency_serializes_stats() {
        let outcome = ProbeOutcome::Latency(LatencyStats {
            avg_latency_sec: 0.5,
            avg_tokens_per_sec: Some(8.0),
            iterations: 3,
        });
        let json = serde_json::to_value(outcome).unwrap();
        assert_eq!(json["ok"], true);
        assert_eq!(json["avg_latency_sec"], 0.5);
        assert_eq!(json["avg_tokens_per_sec"], 8.0);
        assert_eq!(json["iterations"], 3);
    }

    #[test]
    fn absent_throughput_is_omitted_not_zero() {
        let outcome = ProbeOutcome::Latency(LatencyStats {
            avg_latency_sec: 0.5,
            avg_tokens_per_sec: None,
            iterations: 3,
        });
        let json = serde_json::to_value(outcome).unwrap();
        assert!(json.get("avg_tokens_per_sec").is_none());
    }

    #[test]
    fn http_failure_formats_status_and_body() {
        let failure = ProbeFailure::http(500, "  internal error  ");
        assert_eq!(failure.to_string(), "HTTP 500 (internal error)");
    }

    #[test]
    fn empty_http_body_is_named() {
        let failure = ProbeFailure::http(502, "");
        assert_eq!(failure.to_string(), "HTTP 502 (no error body)");
    }

    #[test]
    fn outcome_accessors() {
        assert!(ProbeOutcome::Pass.is_ok());
        assert!(ProbeOutcome::Pass.error().is_none());
        let fail = ProbeOutcome::Fail("x".into());
        assert!(!fail.is_ok());
        assert_eq!(fail.error(), Some("x"));
    }
}
