//! Command-line surface.
//!
//! One subcommand per operator task. Networked subcommands take explicit
//! timeouts; `--json` switches stdout to exactly one machine-readable
//! JSON object (logs go to stderr either way). Exit code 0 means pass,
//! 1 means any validation or probe failure.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::config;
use crate::policy::{self, evaluator::TaskRequest};
use crate::probe::orchestrator::{self, ProbeOptions};
use crate::probe::wire::ToolCallCheck;
use crate::probe::{self, conformance, discovery, latency, ProbeOutcome};
use crate::vram::{guard, sampler};

/// Routing gatekeeper and conformance probes for local LLM runtimes.
#[derive(Debug, Parser)]
#[command(name = "slmgate", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Evaluate routing policy for one task.
    Route(RouteArgs),
    /// Check policy fixtures against the evaluator.
    Regress(RegressArgs),
    /// Sample GPU VRAM pressure via nvidia-smi.
    Vram(VramArgs),
    /// Guard against concurrent GPU runtimes before probing.
    Guard(GuardArgs),
    /// Probe one model for tool-call conformance.
    ToolCall(ToolCallArgs),
    /// Measure latency and tokens/sec for one model.
    Latency(LatencyArgs),
    /// Run conformance + latency probes across configured runtimes.
    Suite(SuiteArgs),
}

#[derive(Debug, Args)]
pub struct RouteArgs {
    /// Path to the policy rules JSON.
    #[arg(long)]
    pub rules: PathBuf,
    /// File paths the task touches.
    #[arg(long, num_args = 1.., required = true)]
    pub paths: Vec<String>,
    /// Total prompt tokens for the task.
    #[arg(long, default_value_t = 0)]
    pub tokens: u64,
    /// Read an external VRAM sample JSON instead of probing.
    #[arg(long, conflicts_with = "probe_vram")]
    pub vram_sample: Option<PathBuf>,
    /// Sample VRAM live via nvidia-smi.
    #[arg(long)]
    pub probe_vram: bool,
    /// nvidia-smi timeout when --probe-vram is set.
    #[arg(long, default_value_t = 2)]
    pub vram_timeout_sec: u64,
    /// Emit machine-readable JSON output.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct RegressArgs {
    /// Path to the fixtures JSON.
    #[arg(long)]
    pub fixtures: PathBuf,
}

#[derive(Debug, Args)]
pub struct VramArgs {
    /// nvidia-smi timeout.
    #[arg(long, default_value_t = 2)]
    pub timeout_sec: u64,
    /// Emit machine-readable JSON output.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct GuardArgs {
    /// Allow concurrent GPU runtimes (also allowed via ALLOW_CONCURRENT_GPU=1).
    #[arg(long)]
    pub allow: bool,
    /// docker ps timeout.
    #[arg(long, default_value_t = 5)]
    pub timeout_sec: u64,
}

#[derive(Debug, Args)]
pub struct ToolCallArgs {
    /// Chat completions URL.
    #[arg(long)]
    pub url: String,
    /// Model name.
    #[arg(long, required_unless_present = "discover_model", conflicts_with = "discover_model")]
    pub model: Option<String>,
    /// Discover the model id from GET /v1/models (llama.cpp style).
    #[arg(long)]
    pub discover_model: bool,
    /// Tool name the model must call.
    #[arg(long, default_value = "add")]
    pub tool_name: String,
    /// First operand.
    #[arg(long, default_value_t = 2)]
    pub a: i64,
    /// Second operand.
    #[arg(long, default_value_t = 3)]
    pub b: i64,
    /// Request timeout.
    #[arg(long, default_value_t = 60)]
    pub timeout_sec: u64,
    /// Emit machine-readable JSON output.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct LatencyArgs {
    /// Chat completions URL.
    #[arg(long)]
    pub url: String,
    /// Model name.
    #[arg(long)]
    pub model: String,
    /// Prompt sent each iteration.
    #[arg(long, default_value = config::DEFAULT_LATENCY_PROMPT)]
    pub prompt: String,
    /// Number of sequential completions.
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    pub iterations: u32,
    /// Request timeout per completion.
    #[arg(long, default_value_t = 60)]
    pub timeout_sec: u64,
    /// Emit machine-readable JSON output.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct SuiteArgs {
    /// Path to the runtime config JSON.
    #[arg(long)]
    pub config: PathBuf,
    /// Stop after the first failure instead of reporting all of them.
    #[arg(long)]
    pub fail_fast: bool,
    /// Also write the JSON report to this path.
    #[arg(long)]
    pub output: Option<PathBuf>,
    /// Emit the JSON report on stdout instead of per-model lines.
    #[arg(long)]
    pub json: bool,
}

/// Dispatch a parsed invocation; the returned code becomes the process
/// exit status.
pub async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Route(args) => run_route(args).await,
        Command::Regress(args) => run_regress(args),
        Command::Vram(args) => run_vram(args).await,
        Command::Guard(args) => run_guard(args).await,
        Command::ToolCall(args) => run_tool_call(args).await,
        Command::Latency(args) => run_latency(args).await,
        Command::Suite(args) => run_suite(args).await,
    }
}

async fn run_route(args: RouteArgs) -> Result<i32> {
    let rules = config::load_rules(&args.rules)?;

    let vram = if let Some(path) = &args.vram_sample {
        Some(config::load_vram_sample(path)?)
    } else if args.probe_vram {
        // Sampler failure degrades the decision to the fail-closed
        // missing-signal branch; it never aborts routing.
        match sampler::sample_nvidia(Duration::from_secs(args.vram_timeout_sec)).await {
            Ok(snapshot) => Some(snapshot.signal()),
            Err(err) => {
                tracing::warn!("VRAM sampling failed, routing fails closed: {err:#}");
                None
            }
        }
    } else {
        None
    };

    let task = TaskRequest {
        paths: args.paths,
        token_count: args.tokens,
    };
    let decision = policy::evaluate(&task, &rules, vram.as_ref());

    if args.json {
        println!("{}", serde_json::to_string(&decision)?);
    } else {
        println!("{} (reason: {})", decision.route, decision.reason);
    }
    Ok(0)
}

fn run_regress(args: RegressArgs) -> Result<i32> {
    let fixtures = config::load_fixtures(&args.fixtures)?;
    let rules = config::load_rules(Path::new(&fixtures.rules))?;

    let failures = policy::fixtures::check(&rules, &fixtures.cases);
    if failures.is_empty() {
        println!("OK: {} policy fixtures passed", fixtures.cases.len());
        return Ok(0);
    }
    for failure in &failures {
        println!("ERROR: {failure}");
    }
    Ok(1)
}

async fn run_vram(args: VramArgs) -> Result<i32> {
    match sampler::sample_nvidia(Duration::from_secs(args.timeout_sec)).await {
        Ok(snapshot) => {
            if args.json {
                let envelope = serde_json::json!({"ok": true});
                let mut value = serde_json::to_value(&snapshot)?;
                merge(&mut value, envelope);
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                for gpu in &snapshot.gpus {
                    println!(
                        "GPU{} {}: {} MiB free / {} MiB total",
                        gpu.index, gpu.name, gpu.free_mib, gpu.total_mib
                    );
                }
                println!(
                    "min free: {} MiB ({:.1}%)",
                    snapshot.min_free_mib,
                    snapshot.min_free_ratio * 100.0
                );
            }
            Ok(0)
        }
        Err(err) => {
            if args.json {
                println!(
                    "{}",
                    serde_json::json!({"ok": false, "error": format!("{err:#}")})
                );
            } else {
                println!("VRAM probe failed: {err:#}");
            }
            Ok(1)
        }
    }
}

/// Fold `extra`'s keys into a JSON object in place.
fn merge(value: &mut serde_json::Value, extra: serde_json::Value) {
    if let (Some(target), serde_json::Value::Object(extra)) = (value.as_object_mut(), extra) {
        for (key, val) in extra {
            target.insert(key, val);
        }
    }
}

async fn run_guard(args: GuardArgs) -> Result<i32> {
    let verdict = guard::check(args.allow, Duration::from_secs(args.timeout_sec)).await;
    match verdict {
        guard::GuardVerdict::Clear => {
            println!("OK: no conflicting vLLM container detected");
            Ok(0)
        }
        guard::GuardVerdict::AllowedConflict => {
            println!(
                "WARN: concurrent GPU runtimes allowed ({}=1); expect VRAM contention.",
                guard::ALLOW_ENV
            );
            Ok(0)
        }
        guard::GuardVerdict::Blocked => {
            println!(
                "ERROR: vLLM container appears to be running; stop it before running \
                 GPU-accelerated probes (or set {}=1).",
                guard::ALLOW_ENV
            );
            Ok(1)
        }
    }
}

async fn run_tool_call(args: ToolCallArgs) -> Result<i32> {
    let client = probe::build_client();
    let timeout = Duration::from_secs(args.timeout_sec);

    let model = match &args.model {
        Some(model) => model.clone(),
        None => discovery::first_model_id(&client, &args.url, timeout).await?,
    };

    let check = ToolCallCheck {
        tool_name: args.tool_name,
        a: args.a,
        b: args.b,
    };
    let outcome = conformance::probe_tool_call(&client, &args.url, &model, &check, timeout).await;

    if args.json {
        println!("{}", serde_json::to_string(&outcome)?);
    } else {
        match outcome.error() {
            None => println!("Tool-call compliant"),
            Some(reason) => println!("Tool-call failed: {reason}"),
        }
    }
    Ok(exit_code(outcome.is_ok()))
}

async fn run_latency(args: LatencyArgs) -> Result<i32> {
    let client = probe::build_client();
    let outcome = latency::probe_latency(
        &client,
        &args.url,
        &args.model,
        &args.prompt,
        args.iterations,
        Duration::from_secs(args.timeout_sec),
    )
    .await;

    if args.json {
        println!("{}", serde_json::to_string(&outcome)?);
    } else {
        match &outcome {
            ProbeOutcome::Latency(stats) => {
                println!(
                    "avg latency: {:.3}s over {} iterations",
                    stats.avg_latency_sec, stats.iterations
                );
                match stats.avg_tokens_per_sec {
                    Some(tps) => println!("avg throughput: {tps:.1} tokens/sec"),
                    None => println!("throughput unavailable (endpoint reports no completion_tokens)"),
                }
            }
            other => println!(
                "Latency probe failed: {}",
                other.error().unwrap_or("unknown error")
            ),
        }
    }
    Ok(exit_code(outcome.is_ok()))
}

async fn run_suite(args: SuiteArgs) -> Result<i32> {
    let config = config::load_runtime_config(&args.config)?;
    let client = probe::build_client();

    let options = ProbeOptions {
        latency_prompt: config.latency_prompt,
        iterations: config.iterations,
        timeout: Duration::from_secs(config.timeout_sec),
        fail_fast: args.fail_fast,
    };
    let report = orchestrator::run(&client, &config.runtimes, &options).await;

    let rendered = serde_json::to_string_pretty(&report)?;
    if let Some(path) = &args.output {
        std::fs::write(path, &rendered)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
    }

    if args.json {
        println!("{rendered}");
    } else {
        for record in &report.results {
            match record.first_error() {
                None => println!("{}/{}: PASS", record.runtime, record.model),
                Some(error) => println!("{}/{}: FAIL ({error})", record.runtime, record.model),
            }
        }
        for failure in report.failures.iter().filter(|f| f.model.is_none()) {
            println!("{}: FAIL ({})", failure.runtime, failure.error);
        }
    }
    Ok(exit_code(!report.has_failures()))
}

fn exit_code(ok: bool) -> i32 {
    if ok {
        0
    } else {
        1
    }
}

// ── Tests ────────────────────────────────────────────────────────
