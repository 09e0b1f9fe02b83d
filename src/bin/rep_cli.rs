use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use rep_engine::config::{EngineConfig, ExerciseMode};
use rep_engine::fixtures::{
    ExpectationDiff, FixtureCatalog, FixtureDefinition, FixtureExpectations, FixtureProcessor,
    FixtureReport, FixtureStep, JitterSpec,
};
use rep_engine::store::{JsonFileSummaryStore, SummaryStore};
use rep_engine::testing::PoseName;
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "rep_cli",
    about = "Deterministic pose-script harness for the repetition engine"
)]
struct Cli {
    /// Override directory containing fixture scripts (defaults to ./fixtures)
    #[arg(long)]
    fixtures_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a fixture script and compare against its expectations
    Replay {
        #[arg(long)]
        fixture: String,
        /// Expectation JSON replacing the fixture's own `expect` block
        #[arg(long)]
        expect: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
        /// Include every session event in the report
        #[arg(long)]
        events: bool,
    },
    /// Generate a clean session for an exercise and check it completes
    Simulate {
        #[arg(long, default_value = "squat", value_parser = parse_mode)]
        mode: ExerciseMode,
        #[arg(long, default_value_t = 3)]
        reps: u32,
        #[arg(long, default_value_t = 1)]
        sets: u32,
        #[arg(long, default_value_t = 5)]
        rest: u32,
        #[arg(long, default_value_t = 3)]
        countdown: u32,
        /// Positional noise in normalized units (0 disables)
        #[arg(long, default_value_t = 0.0)]
        jitter: f32,
        #[arg(long, default_value_t = 7)]
        seed: u64,
        /// Base engine configuration JSON
        #[arg(long)]
        config: Option<PathBuf>,
        /// Append the summary record to this JSON store
        #[arg(long)]
        store: Option<PathBuf>,
    },
    /// Print the default engine configuration
    Defaults,
    /// List available fixtures on disk
    List,
}

fn main() -> ExitCode {
    rep_engine::init_logging();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let catalog = cli
        .fixtures_dir
        .map(FixtureCatalog::new)
        .unwrap_or_default();

    match cli.command {
        Commands::Replay {
            fixture,
            expect,
            output,
            events,
        } => run_replay(&catalog, &fixture, expect, output, events),
        Commands::Simulate {
            mode,
            reps,
            sets,
            rest,
            countdown,
            jitter,
            seed,
            config,
            store,
        } => {
            let mut base = config
                .map(EngineConfig::load_from_file)
                .unwrap_or_default();
            base.session.exercise_mode = mode;
            base.session.target_repetitions = reps;
            base.session.target_sets = sets;
            base.session.rest_time_seconds = rest;
            base.session.countdown_seconds = countdown;
            let jitter = (jitter > 0.0).then_some(JitterSpec {
                seed,
                amount: jitter,
            });
            run_simulate(base, jitter, store)
        }
        Commands::Defaults => {
            println!("{}", serde_json::to_string_pretty(&EngineConfig::default())?);
            Ok(ExitCode::from(0))
        }
        Commands::List => run_list(&catalog),
    }
}

fn run_replay(
    catalog: &FixtureCatalog,
    fixture: &str,
    override_expect: Option<PathBuf>,
    output_path: Option<PathBuf>,
    include_events: bool,
) -> Result<ExitCode> {
    let data = catalog.load(fixture, override_expect)?;
    let report = FixtureProcessor::new()
        .run(&data.metadata.name, &data.definition)
        .with_context(|| format!("processing fixture {}", fixture))?;

    emit_report(&report, include_events, output_path)?;
    check_expectations(data.expectations.as_ref(), &report)
}

fn run_simulate(
    config: EngineConfig,
    jitter: Option<JitterSpec>,
    store_path: Option<PathBuf>,
) -> Result<ExitCode> {
    let mode = config.session.exercise_mode;
    if mode == ExerciseMode::None {
        return Err(anyhow!("simulate needs an exercise mode other than none"));
    }
    let expectations = FixtureExpectations {
        completed: Some(true),
        completed_sets: Some(config.session.target_sets),
        total_reps: Some(config.session.target_repetitions),
        ..FixtureExpectations::default()
    };
    let definition = FixtureDefinition {
        notes: None,
        steps: simulated_steps(&config),
        config,
        jitter,
        expect: None,
    };

    let name = format!("simulated_{}", mode.display_name());
    let report = FixtureProcessor::new().run(&name, &definition)?;
    emit_report(&report, false, None)?;

    if let Some(path) = store_path {
        let mut store = JsonFileSummaryStore::new(&path);
        store
            .append(report.record.clone())
            .with_context(|| format!("appending summary to {}", path.display()))?;
    }

    check_expectations(Some(&expectations), &report)
}

/// Stand through the countdown, then alternate sets with rest-length pauses
fn simulated_steps(config: &EngineConfig) -> Vec<FixtureStep> {
    let session = &config.session;
    let rest_pose = match session.exercise_mode {
        ExerciseMode::PushUp => PoseName::PushUpTop,
        ExerciseMode::PullUp => PoseName::PullUpRelease,
        _ => PoseName::SquatStanding,
    };
    let hold = |seconds: u32| FixtureStep::Hold {
        pose: rest_pose,
        ms: u64::from(seconds) * 1000 + 500,
        low_confidence: Vec::new(),
        missing: Vec::new(),
    };

    let mut steps = vec![hold(session.countdown_seconds)];
    for set in 1..=session.target_sets {
        steps.push(FixtureStep::Repetitions {
            count: session.target_repetitions,
        });
        if set < session.target_sets {
            steps.push(hold(session.rest_time_seconds));
        }
    }
    steps
}

fn run_list(catalog: &FixtureCatalog) -> Result<ExitCode> {
    let fixtures = catalog.discover()?;
    if fixtures.is_empty() {
        println!("No fixtures found under {}", catalog.root().display());
        return Ok(ExitCode::from(0));
    }

    for metadata in fixtures {
        println!("{} -> {}", metadata.name, metadata.path.display());
    }
    Ok(ExitCode::from(0))
}

fn check_expectations(
    expectations: Option<&FixtureExpectations>,
    report: &FixtureReport,
) -> Result<ExitCode> {
    match expectations.map(|expect| expect.verify(report)) {
        Some(Err(diff)) => {
            emit_diff(&diff)?;
            Ok(ExitCode::from(2))
        }
        _ => Ok(ExitCode::from(0)),
    }
}

fn emit_report(
    report: &FixtureReport,
    include_events: bool,
    output_path: Option<PathBuf>,
) -> Result<()> {
    let payload = ReportPayload {
        fixture: &report.fixture,
        phase: report.phase,
        stopped_early: report.stopped_early,
        record: &report.record,
        sets: &report.sets,
        metrics: &report.metrics,
        event_count: report.events.len(),
        events: include_events.then_some(&report.events),
    };
    let json = serde_json::to_string_pretty(&payload)?;

    if let Some(path) = output_path {
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    } else {
        println!("{json}");
    }

    Ok(())
}

fn emit_diff(diff: &ExpectationDiff) -> Result<()> {
    let json = serde_json::to_string_pretty(&diff.to_json())?;
    eprintln!("{json}");
    Ok(())
}

fn parse_mode(value: &str) -> Result<ExerciseMode, String> {
    serde_json::from_value(serde_json::Value::String(value.replace('-', "_")))
        .map_err(|_| format!("unknown exercise mode '{value}' (squat, push_up, pull_up)"))
}

#[derive(Serialize)]
struct ReportPayload<'a> {
    fixture: &'a str,
    phase: rep_engine::session::SessionPhase,
    stopped_early: bool,
    record: &'a rep_engine::store::ExerciseSummaryRecord,
    sets: &'a [rep_engine::session::SetSummary],
    metrics: &'a rep_engine::session::SessionMetrics,
    event_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    events: Option<&'a Vec<rep_engine::fixtures::TimedEvent>>,
}
