//! Fixture utilities for the deterministic CLI harness.
//!
//! A fixture is a JSON file describing an engine configuration, a script of
//! poses over time and, optionally, the outcome the session must reach.
//! The processor replays the script against a real [`SessionController`]
//! on a virtual clock, so runs are reproducible in CI.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::feedback::LoggingFeedback;
use crate::pose::Joint;
use crate::session::{SessionController, SessionEvent, SessionMetrics, SessionPhase, SetSummary};
use crate::store::{ExerciseSummaryRecord, InMemorySummaryStore};
use crate::testing::{PoseBuilder, PoseName, ScriptBuilder, ScriptedFrame, DEFAULT_FRAME_INTERVAL};

/// Default location for fixture JSON assets.
pub const DEFAULT_FIXTURE_ROOT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures");

/// Virtual clock resolution used to poll the session timers between frames
const CLOCK_STEP_MS: u64 = 100;

/// Metadata describing an available fixture.
#[derive(Clone, Debug)]
pub struct FixtureMetadata {
    pub name: String,
    pub path: PathBuf,
}

/// Loaded fixture definition plus resolved expectations.
#[derive(Debug, Clone)]
pub struct FixtureData {
    pub metadata: FixtureMetadata,
    pub definition: FixtureDefinition,
    pub expectations: Option<FixtureExpectations>,
}

/// On-disk fixture schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureDefinition {
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub config: EngineConfig,
    #[serde(default)]
    pub jitter: Option<JitterSpec>,
    pub steps: Vec<FixtureStep>,
    #[serde(default)]
    pub expect: Option<FixtureExpectations>,
}

/// Seeded positional noise applied to every scripted frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct JitterSpec {
    pub seed: u64,
    pub amount: f32,
}

/// One step of a fixture script.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum FixtureStep {
    /// Hold a canonical pose, optionally with degraded joints
    Hold {
        pose: PoseName,
        ms: u64,
        #[serde(default)]
        low_confidence: Vec<Joint>,
        #[serde(default)]
        missing: Vec<Joint>,
    },
    /// Frames the pose oracle dropped
    Dropout { ms: u64 },
    /// Time passing with no frames at all
    Idle { ms: u64 },
    /// Full repetitions of the configured exercise
    Repetitions { count: u32 },
    Pause,
    Resume,
}

/// JSON expectation schema for fixture verification.
///
/// Every field is optional; only the ones present are checked.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureExpectations {
    /// Whether the session reached completion on its own
    pub completed: Option<bool>,
    pub completed_sets: Option<u32>,
    pub total_reps: Option<u32>,
    pub set_repetitions: Option<Vec<u32>>,
    pub repetitions_detected: Option<u64>,
    pub min_noise_rejections: Option<u64>,
    pub calories_burned: Option<f64>,
    #[serde(default = "default_calorie_tolerance")]
    pub calorie_tolerance: f64,
}

fn default_calorie_tolerance() -> f64 {
    0.01
}

impl FixtureExpectations {
    pub fn verify(&self, report: &FixtureReport) -> std::result::Result<(), ExpectationDiff> {
        let mut failures = Vec::new();
        let mut check = |field: &str, expected: serde_json::Value, actual: serde_json::Value, ok: bool| {
            if !ok {
                failures.push(ExpectationFailure {
                    field: field.to_string(),
                    expected,
                    actual,
                });
            }
        };

        if let Some(expected) = self.completed {
            let actual = !report.stopped_early;
            check("completed", expected.into(), actual.into(), expected == actual);
        }
        if let Some(expected) = self.completed_sets {
            let actual = report.record.completed_sets;
            check("completed_sets", expected.into(), actual.into(), expected == actual);
        }
        if let Some(expected) = self.total_reps {
            let actual = report.record.total_reps;
            check("total_reps", expected.into(), actual.into(), expected == actual);
        }
        if let Some(expected) = &self.set_repetitions {
            let actual: Vec<u32> = report.sets.iter().map(|set| set.repetitions).collect();
            check(
                "set_repetitions",
                serde_json::json!(expected),
                serde_json::json!(actual),
                *expected == actual,
            );
        }
        if let Some(expected) = self.repetitions_detected {
            let actual = report.metrics.repetitions_detected;
            check("repetitions_detected", expected.into(), actual.into(), expected == actual);
        }
        if let Some(expected) = self.min_noise_rejections {
            let actual = report.metrics.noise_rejections;
            check("min_noise_rejections", expected.into(), actual.into(), actual >= expected);
        }
        if let Some(expected) = self.calories_burned {
            let actual = report.record.calories_burned;
            let ok = (actual - expected).abs() <= self.calorie_tolerance;
            check("calories_burned", expected.into(), actual.into(), ok);
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ExpectationDiff { failures })
        }
    }
}

/// Outcome of comparing a run with expectations.
#[derive(Debug)]
pub struct ExpectationDiff {
    pub failures: Vec<ExpectationFailure>,
}

impl ExpectationDiff {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "failures": self.failures.iter().map(|failure| {
                serde_json::json!({
                    "field": failure.field,
                    "expected": failure.expected,
                    "actual": failure.actual,
                })
            }).collect::<Vec<_>>()
        })
    }
}

/// Detailed diff entry for a single failure.
#[derive(Debug)]
pub struct ExpectationFailure {
    pub field: String,
    pub expected: serde_json::Value,
    pub actual: serde_json::Value,
}

/// Catalog responsible for discovering fixtures on disk.
pub struct FixtureCatalog {
    root: PathBuf,
}

impl FixtureCatalog {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List all fixtures by their metadata.
    pub fn discover(&self) -> Result<Vec<FixtureMetadata>> {
        let mut fixtures = Vec::new();
        if !self.root.exists() {
            return Ok(fixtures);
        }

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let path = entry.path();
                if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
                    fixtures.push(self.metadata_for_path(&path)?);
                }
            }
        }

        fixtures.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(fixtures)
    }

    /// Load a fixture by name or path; `override_expect` replaces its
    /// embedded expectations.
    pub fn load(&self, fixture: &str, override_expect: Option<PathBuf>) -> Result<FixtureData> {
        let path = self.resolve_fixture_path(fixture)?;
        let metadata = self.metadata_for_path(&path)?;
        let json = fs::read_to_string(&path)
            .with_context(|| format!("reading fixture {}", path.display()))?;
        let definition: FixtureDefinition =
            serde_json::from_str(&json).with_context(|| format!("parsing {}", path.display()))?;

        let expectations = match override_expect {
            Some(path) => {
                let json = fs::read_to_string(&path)
                    .with_context(|| format!("reading expectation {}", path.display()))?;
                Some(
                    serde_json::from_str(&json)
                        .with_context(|| format!("parsing {}", path.display()))?,
                )
            }
            None => definition.expect.clone(),
        };

        Ok(FixtureData {
            metadata,
            definition,
            expectations,
        })
    }

    fn resolve_fixture_path(&self, fixture: &str) -> Result<PathBuf> {
        let as_path = Path::new(fixture);
        if as_path.is_file() {
            return Ok(as_path.to_path_buf());
        }

        let candidate = self.root.join(format!("{fixture}.json"));
        if candidate.exists() {
            Ok(candidate)
        } else {
            Err(anyhow!(
                "Fixture '{fixture}' not found in {}",
                self.root.display()
            ))
        }
    }

    fn metadata_for_path(&self, path: &Path) -> Result<FixtureMetadata> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| anyhow!("Invalid fixture name for {}", path.display()))?
            .to_string();
        Ok(FixtureMetadata {
            name,
            path: path.to_path_buf(),
        })
    }
}

impl Default for FixtureCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_FIXTURE_ROOT)
    }
}

/// Event observed during a run, stamped with its offset from session start.
#[derive(Debug, Clone, Serialize)]
pub struct TimedEvent {
    pub offset_ms: u64,
    #[serde(flatten)]
    pub event: SessionEvent,
}

/// Result of replaying one fixture.
#[derive(Debug, Clone, Serialize)]
pub struct FixtureReport {
    pub fixture: String,
    pub phase: SessionPhase,
    /// Set when the script ended before the session completed and the
    /// harness had to stop it
    pub stopped_early: bool,
    pub record: ExerciseSummaryRecord,
    pub sets: Vec<SetSummary>,
    pub metrics: SessionMetrics,
    pub duration_ms: u64,
    pub events: Vec<TimedEvent>,
}

enum Action {
    Frame(ScriptedFrame),
    Pause,
    Resume,
}

/// Executes fixtures by replaying their scripts through a session controller.
#[derive(Debug, Default)]
pub struct FixtureProcessor;

impl FixtureProcessor {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&self, name: &str, definition: &FixtureDefinition) -> Result<FixtureReport> {
        let config = definition.config.clone();
        let mode = config.session.exercise_mode;
        let poses = PoseBuilder::for_detection(&config.detection);
        let (timeline, end_ms) = build_timeline(definition, &poses);

        let store = InMemorySummaryStore::new();
        let mut controller =
            SessionController::new(config, Box::new(store), Box::new(LoggingFeedback))
                .map_err(|err| anyhow!("fixture {name}: {err}"))?;
        let mut events = controller.subscribe();
        let mut observed = Vec::new();
        let mut drain = |offset_ms: u64, observed: &mut Vec<TimedEvent>| {
            while let Ok(event) = events.try_recv() {
                observed.push(TimedEvent { offset_ms, event });
            }
        };

        tracing::info!(
            "[Fixtures] Running '{}' ({} mode, {} actions over {} ms)",
            name,
            mode.display_name(),
            timeline.len(),
            end_ms
        );

        let t0 = Instant::now();
        let at = |offset_ms: u64| t0 + Duration::from_millis(offset_ms);
        controller
            .start(t0)
            .map_err(|err| anyhow!("fixture {name}: {err}"))?;
        drain(0, &mut observed);

        let mut clock_ms = 0;
        for (offset_ms, action) in timeline {
            while clock_ms + CLOCK_STEP_MS < offset_ms {
                clock_ms += CLOCK_STEP_MS;
                controller.tick(at(clock_ms));
                drain(clock_ms, &mut observed);
            }
            clock_ms = clock_ms.max(offset_ms);
            controller.tick(at(offset_ms));

            match action {
                Action::Frame(frame) => {
                    controller.on_frame(frame.to_input(t0));
                }
                Action::Pause => {
                    if let Err(err) = controller.pause(at(offset_ms)) {
                        tracing::warn!("[Fixtures] pause at {} ms ignored: {}", offset_ms, err);
                    }
                }
                Action::Resume => {
                    if let Err(err) = controller.resume(at(offset_ms)) {
                        tracing::warn!("[Fixtures] resume at {} ms ignored: {}", offset_ms, err);
                    }
                }
            }
            drain(offset_ms, &mut observed);
        }

        while clock_ms + CLOCK_STEP_MS <= end_ms {
            clock_ms += CLOCK_STEP_MS;
            controller.tick(at(clock_ms));
            drain(clock_ms, &mut observed);
        }

        let stopped_early = controller.phase().is_running();
        if stopped_early {
            controller
                .stop(at(end_ms))
                .map_err(|err| anyhow!("fixture {name}: stopping session: {err}"))?;
            drain(end_ms, &mut observed);
        }

        let record = controller
            .summary_record()
            .cloned()
            .ok_or_else(|| anyhow!("fixture {name}: session produced no summary"))?;

        Ok(FixtureReport {
            fixture: name.to_string(),
            phase: controller.phase(),
            stopped_early,
            record,
            sets: controller.sets().to_vec(),
            metrics: controller.metrics(),
            duration_ms: end_ms,
            events: observed,
        })
    }
}

/// Flatten fixture steps into timed actions; returns them with the script end offset
fn build_timeline(definition: &FixtureDefinition, poses: &PoseBuilder) -> (Vec<(u64, Action)>, u64) {
    let mode = definition.config.session.exercise_mode;
    let mut script = ScriptBuilder::new(DEFAULT_FRAME_INTERVAL);
    if let Some(jitter) = definition.jitter {
        script = script.with_jitter(jitter.seed, jitter.amount);
    }

    let mut timeline = Vec::new();
    for step in &definition.steps {
        let first_new = script.frames().len();
        match step {
            FixtureStep::Hold {
                pose,
                ms,
                low_confidence,
                missing,
            } => {
                let mut held = poses.pose(*pose);
                for joint in low_confidence {
                    held = held.with_confidence(*joint, 0.0);
                }
                for joint in missing {
                    held = held.without(*joint);
                }
                script.hold(&held, Duration::from_millis(*ms));
            }
            FixtureStep::Dropout { ms } => {
                script.dropout(Duration::from_millis(*ms));
            }
            FixtureStep::Idle { ms } => {
                script.idle(Duration::from_millis(*ms));
            }
            FixtureStep::Repetitions { count } => {
                script.repetitions(poses, mode, *count);
            }
            FixtureStep::Pause => {
                timeline.push((script.cursor().as_millis() as u64, Action::Pause));
            }
            FixtureStep::Resume => {
                timeline.push((script.cursor().as_millis() as u64, Action::Resume));
            }
        }
        timeline.extend(
            script.frames()[first_new..]
                .iter()
                .cloned()
                .map(|frame| (frame.offset_ms, Action::Frame(frame))),
        );
    }

    (timeline, script.cursor().as_millis() as u64)
}
