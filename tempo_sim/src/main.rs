//! Tempo DST Simulator CLI
//!
//! Run deterministic timeline scenarios, or drive a world at wall-clock pace.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tempo_core::TimelineConfig;
use tempo_env::{StepPacer, TokioContext};
use tempo_sim::scenarios::ScenarioId;
use tempo_sim::{ScenarioResult, ScenarioRunner, SimConfig, SimWorld};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Tempo Deterministic Simulation Testing CLI
#[derive(Parser, Debug)]
#[command(name = "tempo-sim")]
#[command(about = "Run deterministic simulation tests for the Tempo timeline", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (cadence_window, rewind_in_window, ..., paced_frames, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Forward ticks each scenario runs before acting
    #[arg(short, long, default_value = "120")]
    ticks: u64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export per-step frames of a single scenario to a JSON file
    #[arg(long)]
    export: Option<String>,

    /// Timeline configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Drive one world at wall-clock pace instead of running scenarios
    #[arg(long)]
    realtime: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    if !args.json {
        info!("Tempo DST Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let timeline = match &args.config {
        Some(path) => TimelineConfig::from_path(path)
            .with_context(|| format!("loading timeline config {}", path.display()))?,
        None => TimelineConfig::default(),
    };

    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .context("system clock before epoch")?
            .as_nanos() as u64
    } else {
        args.seed
    };

    if args.realtime {
        return run_realtime(base_seed, args.ticks, timeline);
    }

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        let scenario = args.scenario.parse::<ScenarioId>().map_err(|e: String| {
            let available: Vec<_> = ScenarioId::all().iter().map(|s| s.name()).collect();
            anyhow::anyhow!("{}. Available scenarios: {}, all", e, available.join(", "))
        })?;
        vec![scenario]
    };

    if let Some(export_path) = &args.export {
        if scenarios.len() > 1 {
            bail!("--export only supports a single scenario, not 'all'");
        }
        return run_with_export(base_seed, scenarios[0], &args, timeline, export_path);
    }

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    let mut failed_count = 0;

    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = ScenarioRunner::new(seed)
            .with_ticks(args.ticks)
            .with_timeline_config(timeline.clone());

        for scenario in &scenarios {
            let result = runner.run(*scenario);

            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }

            if !result.passed {
                failed_count += 1;
            }
            all_results.push(result);
        }
    }

    let total = all_results.len();
    let passed = total - failed_count;

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "steps": r.total_steps,
                    "final_tick": r.final_tick,
                    "final_mode": r.final_mode.to_string(),
                    "failure_reason": r.failure_reason,
                    "metrics": r.metrics,
                })
            }).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);
            for result in all_results.iter().filter(|r| !r.passed) {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    if failed_count > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Runs one scenario and writes every step as a frame.
fn run_with_export(
    seed: u64,
    scenario: ScenarioId,
    args: &Args,
    timeline: TimelineConfig,
    export_path: &str,
) -> Result<()> {
    info!("Running with export to: {}", export_path);

    let (result, export) = ScenarioRunner::new(seed)
        .with_ticks(args.ticks)
        .with_timeline_config(timeline)
        .run_exported(scenario);

    export
        .write_to_file(export_path)
        .with_context(|| format!("writing export {}", export_path))?;
    info!("Exported {} frames to {}", export.frames.len(), export_path);

    if result.passed {
        info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
        Ok(())
    } else {
        error!(
            "✗ {} FAILED: {}",
            scenario.name(),
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
        std::process::exit(1);
    }
}

/// Drives a fresh world on the host clock until it reaches `ticks`.
fn run_realtime(seed: u64, ticks: u64, timeline: TimelineConfig) -> Result<()> {
    let frame = Duration::from_secs_f64(timeline.fixed_delta_time);
    let mut pacer = StepPacer::new(timeline.fixed_delta_time, 5)?;
    let mut world = SimWorld::new(SimConfig {
        seed,
        timeline,
        ..Default::default()
    })?;
    if world.timeline.tick_state().is_paused {
        bail!("--realtime needs a config that does not start paused");
    }

    info!("Running {} ticks at wall-clock pace ({:?} frames)", ticks, frame);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;
    let ctx = TokioContext::new();
    let summary = runtime.block_on(world.run_paced(&ctx, &mut pacer, ticks, u64::MAX, || frame));

    info!(
        "Reached tick {} in {} frames ({} steps, max {} per frame, {:.3}s dropped)",
        world.timeline.tick(),
        summary.frames,
        summary.steps,
        summary.max_steps_in_frame,
        summary.dropped_secs
    );
    let metrics = world.timeline.metrics();
    info!(
        "Recorded {} entries, trimmed {}",
        metrics.entries_recorded, metrics.entries_trimmed
    );
    Ok(())
}
