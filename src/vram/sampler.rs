//! GPU VRAM sampling via nvidia-smi.
//!
//! Shells out to `nvidia-smi --query-gpu=… --format=csv,noheader,nounits`
//! under its own short timeout, independent of any network timeouts, and
//! reduces the per-GPU rows to the worst-case minimums routing consumes.

use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;

use crate::vram::VramSignal;

/// Columns requested from nvidia-smi, in order.
const QUERY_FIELDS: &[&str] = &[
    "index",
    "name",
    "memory.total",
    "memory.used",
    "memory.free",
    "utilization.gpu",
    "temperature.gpu",
    "pstate",
];

/// One GPU's memory and utilization sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpuSample {
    pub index: u32,
    pub name: String,
    pub total_mib: i64,
    pub used_mib: i64,
    pub free_mib: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utilization_gpu_pct: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_c: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pstate: Option<String>,
}

/// A snapshot across all GPUs, reduced to worst-case minimums so one
/// starved GPU gates routing even on multi-GPU hosts.
#[derive(Debug, Clone, Serialize)]
pub struct VramSnapshot {
    /// Epoch seconds when the sample completed.
    pub timestamp: i64,
    /// How long the query tool took.
    pub duration_ms: i64,
    pub gpus: Vec<GpuSample>,
    pub min_free_mib: i64,
    pub min_free_ratio: f64,
}

impl VramSnapshot {
    /// Reduce to the signal shape the policy evaluator consumes.
    pub fn signal(&self) -> VramSignal {
        VramSignal {
            free_mib: Some(self.min_free_mib),
            free_ratio: Some(self.min_free_ratio),
        }
    }
}

/// Sample all NVIDIA GPUs.
///
/// Fails when nvidia-smi is missing, exits nonzero, times out, prints an
/// unexpected row, or reports no GPUs. Callers decide whether a failure
/// degrades a routing decision (fail closed) or aborts a CLI run.
pub async fn sample_nvidia(timeout: Duration) -> Result<VramSnapshot> {
    let exe = which::which("nvidia-smi").context("nvidia-smi not found in PATH")?;
    let query = format!("--query-gpu={}", QUERY_FIELDS.join(","));
    let started = Instant::now();

    let output = tokio::time::timeout(
        timeout,
        tokio::process::Command::new(&exe)
            .arg(&query)
            .arg("--format=csv,noheader,nounits")
            .output(),
    )
    .await
    .map_err(|_| anyhow!("nvidia-smi timed out after {:.1}s", timeout.as_secs_f64()))?
    .context("failed to run nvidia-smi")?;

    if !output.status.success() {
        bail!(
            "nvidia-smi exited with {} ({})",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let gpus = parse_gpu_rows(&stdout)?;
    if gpus.is_empty() {
        bail!("no GPUs detected");
    }

    Ok(snapshot_from(gpus, started.elapsed()))
}

fn snapshot_from(gpus: Vec<GpuSample>, elapsed: Duration) -> VramSnapshot {
    let min_free_mib = gpus.iter().map(|g| g.free_mib).min().unwrap_or(0);
    let min_free_ratio = gpus
        .iter()
        .filter(|g| g.total_mib > 0)
        .map(|g| g.free_mib as f64 / g.total_mib as f64)
        .fold(f64::INFINITY, f64::min);
    let min_free_ratio = if min_free_ratio.is_finite() {
        (min_free_ratio * 10_000.0).round() / 10_000.0
    } else {
        0.0
    };

    VramSnapshot {
        timestamp: chrono::Utc::now().timestamp(),
        duration_ms: elapsed.as_millis() as i64,
        gpus,
        min_free_mib,
        min_free_ratio,
    }
}

fn parse_gpu_rows(stdout: &str) -> Result<Vec<GpuSample>> {
    let mut gpus = Vec::new();
    for raw_line in stdout.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        if parts.len() != QUERY_FIELDS.len() {
            bail!("unexpected nvidia-smi output: {raw_line}");
        }
        gpus.push(GpuSample {
            index: parse_required(parts[0])
                .with_context(|| format!("bad GPU index in: {raw_line}"))? as u32,
            name: parts[1].to_string(),
            total_mib: parse_required(parts[2])
                .with_context(|| format!("bad memory.total in: {raw_line}"))?,
            used_mib: parse_required(parts[3])
                .with_context(|| format!("bad memory.used in: {raw_line}"))?,
            free_mib: parse_required(parts[4])
                .with_context(|| format!("bad memory.free in: {raw_line}"))?,
            utilization_gpu_pct: parse_optional(parts[5]),
            temperature_c: parse_optional(parts[6]),
            pstate: if parts[7].is_empty() {
                None
            } else {
                Some(parts[7].to_string())
            },
        });
    }
    Ok(gpus)
}

/// nvidia-smi prints integers with `nounits`, but some drivers emit
/// floats; accept both.
fn parse_required(value: &str) -> Result<i64> {
    value
        .parse::<f64>()
        .map(|v| v as i64)
        .map_err(|_| anyhow!("not a number: {value}"))
}

/// "N/A" variants mean the field is unsupported on this GPU; absent, not zero.
fn parse_optional(value: &str) -> Option<i64> {
    let value = value.trim();
    if value.is_empty()
        || value.eq_ignore_ascii_case("n/a")
        || value.eq_ignore_ascii_case("na")
        || value.eq_ignore_ascii_case("[n/a]")
    {
        return None;
    }
    value.parse::<f64>().ok().map(|v| v as i64)
}

// ── Tests ────────────────────────────────────────────────────────
