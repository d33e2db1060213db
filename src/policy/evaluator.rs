//! Routing policy evaluator.
//!
//! Decides, per coding task, whether work may run on a local runtime or
//! must go to a cloud model. Pure rule evaluation: the paths a task
//! touches, its token count, and an optional VRAM signal go in; a route
//! plus a reason code comes out. No I/O, no mutation, deterministic.

use serde::{Deserialize, Serialize};

use crate::vram::VramSignal;

// ── Rule set ─────────────────────────────────────────────────────

/// Declarative routing rules, loaded once per evaluation.
///
/// A zero threshold or an empty pattern list means that rule is
/// disabled.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PolicyRuleSet {
    /// Glob patterns for paths that must never reach a local runtime.
    pub denylist_paths: Vec<String>,
    /// Glob patterns for paths that should try the cloud model first.
    pub sensitive_paths: Vec<String>,
    /// Token count above which a task counts as long-context (0 = disabled).
    pub long_context_threshold_tokens: u64,
    /// Minimum free VRAM in MiB required for local routing (0 = disabled).
    pub min_free_vram_mib: i64,
    /// Minimum free VRAM ratio in [0, 1] required for local routing (0 = disabled).
    pub min_free_vram_ratio: f64,
}

impl PolicyRuleSet {
    /// Whether any VRAM threshold is configured.
    pub fn vram_gated(&self) -> bool {
        self.min_free_vram_mib > 0 || self.min_free_vram_ratio > 0.0
    }
}

// ── Task metadata ────────────────────────────────────────────────

/// One task to route: the files it touches and its context size.
#[derive(Debug, Clone, Default)]
pub struct TaskRequest {
    /// Paths the task reads or writes, as supplied by the caller.
    pub paths: Vec<String>,
    /// Total prompt tokens the task would send.
    pub token_count: u64,
}

// ── Decision ─────────────────────────────────────────────────────

/// Destination classification for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Eligible for the local runtime.
    Local,
    /// Try the cloud model before any local fallback.
    ClaudeFirst,
    /// Must not reach a local runtime at all.
    ClaudeOnly,
}

impl Route {
    pub fn as_str(self) -> &'static str {
        match self {
            Route::Local => "local",
            Route::ClaudeFirst => "claude_first",
            Route::ClaudeOnly => "claude_only",
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the route was chosen. Exactly one reason per decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    /// A task path matched `denylist_paths`.
    DenylistPath,
    /// A task path matched `sensitive_paths`.
    SensitivePath,
    /// Token count exceeded the long-context threshold.
    LongContext,
    /// A VRAM threshold is configured but no signal arrived.
    MissingVramSignal,
    /// The observed free VRAM is below a configured threshold.
    LowVram,
    /// No rule blocked local execution.
    DefaultSafe,
}

impl Reason {
    pub fn as_str(self) -> &'static str {
        match self {
            Reason::DenylistPath => "denylist_path",
            Reason::SensitivePath => "sensitive_path",
            Reason::LongContext => "long_context",
            Reason::MissingVramSignal => "missing_vram_signal",
            Reason::LowVram => "low_vram",
            Reason::DefaultSafe => "default_safe",
        }
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of evaluating the rules for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PolicyDecision {
    pub route: Route,
    pub reason: Reason,
}

impl PolicyDecision {
    /// Whether this task may run on the local runtime.
    pub fn is_local(&self) -> bool {
        self.route == Route::Local
    }

    fn new(route: Route, reason: Reason) -> Self {
        Self { route, reason }
    }
}

// ── Path matching ────────────────────────────────────────────────

/// Normalize path separators so equivalent paths expressed with `\` or
/// `/` match identically. Matching stays case-sensitive.
fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Shell-glob match (`*`, `?`, bracket classes) of one normalized path
/// against a pattern list; any hit suffices.
fn match_any(path: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| {
        let pattern = normalize_path(pattern);
        match glob::Pattern::new(&pattern) {
            Ok(compiled) => compiled.matches(path),
            Err(err) => {
                // A malformed pattern matches nothing; evaluation stays total.
                tracing::warn!(%pattern, "ignoring malformed glob pattern: {err}");
                false
            }
        }
    })
}

// ── Evaluation ───────────────────────────────────────────────────

/// Evaluate the routing rules for one task.
///
/// Guards run in fixed precedence order and the first match wins:
/// denylist, sensitive paths, long context, missing VRAM signal, low
/// VRAM (MiB then ratio), then the local default. A configured VRAM
/// threshold with no signal fails closed toward the cloud path rather
/// than permitting local execution under unknown memory pressure.
pub fn evaluate(
    task: &TaskRequest,
    rules: &PolicyRuleSet,
    vram: Option<&VramSignal>,
) -> PolicyDecision {
    // 1. Denylisted paths never reach a local runtime.
    for path in &task.paths {
        if match_any(&normalize_path(path), &rules.denylist_paths) {
            return PolicyDecision::new(Route::ClaudeOnly, Reason::DenylistPath);
        }
    }

    // 2. Sensitive paths go cloud-first.
    for path in &task.paths {
        if match_any(&normalize_path(path), &rules.sensitive_paths) {
            return PolicyDecision::new(Route::ClaudeFirst, Reason::SensitivePath);
        }
    }

    // 3. Long-context tasks go cloud-first.
    if rules.long_context_threshold_tokens > 0
        && task.token_count > rules.long_context_threshold_tokens
    {
        return PolicyDecision::new(Route::ClaudeFirst, Reason::LongContext);
    }

    if rules.vram_gated() {
        // 4. VRAM-gated rules fail closed when no signal arrived.
        let Some(signal) = vram else {
            return PolicyDecision::new(Route::ClaudeFirst, Reason::MissingVramSignal);
        };

        // 5. Observed free MiB below the configured floor.
        if rules.min_free_vram_mib > 0 {
            if let Some(free_mib) = signal.free_mib {
                if free_mib < rules.min_free_vram_mib {
                    return PolicyDecision::new(Route::ClaudeFirst, Reason::LowVram);
                }
            }
        }

        // 6. Observed free ratio below the configured floor.
        if rules.min_free_vram_ratio > 0.0 {
            if let Some(free_ratio) = signal.free_ratio {
                if free_ratio < rules.min_free_vram_ratio {
                    return PolicyDecision::new(Route::ClaudeFirst, Reason::LowVram);
                }
            }
        }
    }

    // 7. Nothing blocked local execution.
    PolicyDecision::new(Route::Local, Reason::DefaultSafe)
}

// ── Tests ────────────────────────────────────────────────────────
