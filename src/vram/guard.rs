//! Concurrent GPU runtime guard.
//!
//! vLLM and GPU-accelerated Ollama running together can exhaust VRAM and
//! crash the runner (cudaMalloc OOM). A running vLLM container therefore
//! blocks GPU probes unless the operator explicitly allows the
//! contention.

use std::time::Duration;

/// Environment variable that lifts the guard when set to `1`.
pub const ALLOW_ENV: &str = "ALLOW_CONCURRENT_GPU";

/// What the guard concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardVerdict {
    /// No conflicting GPU runtime detected.
    Clear,
    /// vLLM is running but the operator allowed the contention.
    AllowedConflict,
    /// vLLM is running and nothing allowed it.
    Blocked,
}

impl GuardVerdict {
    pub fn is_blocking(self) -> bool {
        matches!(self, GuardVerdict::Blocked)
    }
}

/// Check for a conflicting vLLM container.
///
/// The override comes from the `--allow` flag or `ALLOW_CONCURRENT_GPU=1`.
pub async fn check(allow_flag: bool, timeout: Duration) -> GuardVerdict {
    let allow = allow_flag || std::env::var(ALLOW_ENV).is_ok_and(|v| v == "1");
    verdict(vllm_container_running(timeout).await, allow)
}

fn verdict(vllm_running: bool, allow: bool) -> GuardVerdict {
    match (vllm_running, allow) {
        (false, _) => GuardVerdict::Clear,
        (true, true) => GuardVerdict::AllowedConflict,
        (true, false) => GuardVerdict::Blocked,
    }
}

/// Whether `docker ps` lists a vLLM container.
///
/// Docker being absent, unlistable, or slow counts as "not running";
/// the guard only blocks on positive evidence.
pub async fn vllm_container_running(timeout: Duration) -> bool {
    let Ok(exe) = which::which("docker") else {
        return false;
    };

    let output = match tokio::time::timeout(
        timeout,
        tokio::process::Command::new(&exe)
            .args(["ps", "--format", "{{.Image}} {{.Names}}"])
            .output(),
    )
    .await
    {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => {
            tracing::debug!("docker ps failed: {err}");
            return false;
        }
        Err(_) => {
            tracing::debug!("docker ps timed out");
            return false;
        }
    };

    if !output.status.success() {
        return false;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .any(line_names_vllm)
}

/// Match the image/name conventions of the official vLLM container.
fn line_names_vllm(line: &str) -> bool {
    let line = line.trim();
    if line.is_empty() {
        return false;
    }
    line.contains("vllm/vllm-openai") || line.ends_with(" vllm-openai") || line.ends_with(" vllm")
}

// ── Tests ────────────────────────────────────────────────────────
