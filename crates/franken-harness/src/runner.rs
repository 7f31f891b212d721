//! Fixture execution: per-fixture lifecycle, isolation, timeouts and
//! batches across worker threads.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::RunnerConfig;
use crate::digest::{digest_hex, sha256_hex};
use crate::engine::{EngineFactory, EvaluationEngine, ExecutionBudget, InterruptHandle};
use crate::error::{EngineError, FE_HARNESS_TIMEOUT, HarnessError};
use crate::host::FixtureHost;
use crate::loader::{Fixture, ScriptLoader, ScriptUnit};
use crate::outcome::{ExecutionOutcome, FixtureError, OutcomeStatus};
use crate::value::Completion;

pub const HARNESS_COMPONENT: &str = "franken_harness";

/// Extra wait past the budget so engines that honor it can report their
/// own interruption and release resources.
const TIMEOUT_GRACE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixturePhase {
    Pending,
    Loading,
    Executing,
    Reported,
    Errored,
}

impl FixturePhase {
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Loading)
                | (Self::Loading, Self::Executing)
                | (Self::Loading, Self::Errored)
                | (Self::Executing, Self::Reported)
                | (Self::Executing, Self::Errored)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Reported | Self::Errored)
    }
}

impl fmt::Display for FixturePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Loading => "loading",
            Self::Executing => "executing",
            Self::Reported => "reported",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid fixture phase transition {from} -> {to}")]
pub struct PhaseTransitionError {
    pub from: FixturePhase,
    pub to: FixturePhase,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureLifecycle {
    phase: FixturePhase,
}

impl Default for FixtureLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl FixtureLifecycle {
    pub fn new() -> Self {
        Self {
            phase: FixturePhase::Pending,
        }
    }

    pub fn phase(&self) -> FixturePhase {
        self.phase
    }

    pub fn advance(&mut self, next: FixturePhase) -> Result<(), PhaseTransitionError> {
        if !self.phase.can_transition_to(next) {
            return Err(PhaseTransitionError {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        Ok(())
    }
}

/// Shared signal that stops a batch from starting further fixtures.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeterministicWorkerAssignment {
    pub fixture_id: String,
    /// Position in the batch input.
    pub position: usize,
    pub worker_index: usize,
    pub queue_index: usize,
}

/// Round-robin over input positions; each worker runs its queue in order.
pub fn deterministic_worker_assignments(
    fixture_ids: &[String],
    worker_count: usize,
) -> Vec<DeterministicWorkerAssignment> {
    let workers = worker_count.max(1);
    let mut queue_counts = vec![0usize; workers];
    let mut out = Vec::with_capacity(fixture_ids.len());

    for (position, fixture_id) in fixture_ids.iter().enumerate() {
        let worker_index = position % workers;
        let queue_index = queue_counts[worker_index];
        queue_counts[worker_index] += 1;
        out.push(DeterministicWorkerAssignment {
            fixture_id: fixture_id.clone(),
            position,
            worker_index,
            queue_index,
        });
    }

    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessLogEvent {
    pub trace_id: String,
    pub decision_id: String,
    pub policy_id: String,
    pub component: String,
    pub event: String,
    pub fixture_id: String,
    pub outcome: OutcomeStatus,
    pub error_code: Option<String>,
    pub error_detail: Option<String>,
    pub duration_us: u64,
    pub worker_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub run_id: String,
    pub engine_id: String,
    pub fixture_set_hash: String,
    pub total: usize,
    pub executed: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    /// Subset of `errored`.
    pub timed_out: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRun {
    pub run_id: String,
    /// Executed fixtures only, in input order.
    pub outcomes: Vec<ExecutionOutcome>,
    pub logs: Vec<HarnessLogEvent>,
    pub summary: BatchSummary,
}

impl BatchRun {
    pub fn all_passed(&self) -> bool {
        self.summary.skipped == 0 && self.outcomes.iter().all(ExecutionOutcome::is_pass)
    }

    pub fn exit_code(&self) -> u8 {
        if self.all_passed() { 0 } else { 1 }
    }
}

pub struct TestRunner<F: EngineFactory> {
    factory: Arc<F>,
    loader: ScriptLoader,
    config: RunnerConfig,
}

impl<F> TestRunner<F>
where
    F: EngineFactory + 'static,
{
    pub fn new(factory: F, loader: ScriptLoader, config: RunnerConfig) -> Self {
        Self::with_shared_factory(Arc::new(factory), loader, config)
    }

    pub fn with_shared_factory(factory: Arc<F>, loader: ScriptLoader, config: RunnerConfig) -> Self {
        Self {
            factory,
            loader,
            config,
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn loader(&self) -> &ScriptLoader {
        &self.loader
    }

    /// Loads and executes one fixture in a fresh engine. Every failure is
    /// folded into the returned outcome.
    pub fn run_one(&self, path: impl AsRef<Path>) -> ExecutionOutcome {
        let path = path.as_ref();
        self.drive(path).unwrap_or_else(|err| {
            ExecutionOutcome::errored(
                self.loader.fixture_id(path),
                FixtureError::engine_crash(err.to_string()),
                0,
            )
        })
    }

    fn drive(&self, path: &Path) -> Result<ExecutionOutcome, PhaseTransitionError> {
        let started = Instant::now();
        let mut lifecycle = FixtureLifecycle::new();

        lifecycle.advance(FixturePhase::Loading)?;
        let fixture = match self.loader.load(path) {
            Ok(fixture) => fixture,
            Err(err) => {
                lifecycle.advance(FixturePhase::Errored)?;
                return Ok(ExecutionOutcome::errored(
                    self.loader.fixture_id(path),
                    FixtureError::from_load(&err),
                    elapsed_us(started),
                ));
            }
        };

        lifecycle.advance(FixturePhase::Executing)?;
        let outcome = self.execute(&fixture);
        let terminal = if outcome.status == OutcomeStatus::Error {
            FixturePhase::Errored
        } else {
            FixturePhase::Reported
        };
        lifecycle.advance(terminal)?;
        Ok(outcome)
    }

    /// Runs an already loaded fixture on its own thread under the timeout.
    /// On timeout the thread is interrupted and abandoned.
    pub fn execute(&self, fixture: &Fixture) -> ExecutionOutcome {
        let started = Instant::now();
        let unit = fixture.unit();
        let fixture_id = unit.fixture_id.clone();
        let timeout = self.config.timeout();
        let interrupt = InterruptHandle::new();

        let (outcome_tx, outcome_rx) = mpsc::channel();
        let factory = Arc::clone(&self.factory);
        let thread_interrupt = interrupt.clone();
        let spawned = thread::Builder::new()
            .name(format!("fixture:{fixture_id}"))
            .spawn(move || {
                let budget = ExecutionBudget::new(timeout, thread_interrupt);
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    evaluate_unit(factory.as_ref(), &unit, &budget, started)
                }));
                let _ = outcome_tx.send(result);
            });
        if let Err(err) = spawned {
            return ExecutionOutcome::errored(
                fixture_id,
                FixtureError::engine_crash(format!("failed to spawn execution thread: {err}")),
                elapsed_us(started),
            );
        }

        match outcome_rx.recv_timeout(timeout + TIMEOUT_GRACE) {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(payload)) => ExecutionOutcome::errored(
                fixture_id,
                FixtureError::engine_crash(format!(
                    "engine panicked: {}",
                    panic_message(payload.as_ref())
                )),
                elapsed_us(started),
            ),
            Err(RecvTimeoutError::Timeout) => {
                interrupt.interrupt();
                ExecutionOutcome::errored(
                    fixture_id,
                    FixtureError::timeout(FE_HARNESS_TIMEOUT, self.config.timeout_ms),
                    elapsed_us(started),
                )
            }
            Err(RecvTimeoutError::Disconnected) => ExecutionOutcome::errored(
                fixture_id,
                FixtureError::engine_crash("execution thread exited without an outcome"),
                elapsed_us(started),
            ),
        }
    }

    pub fn run_batch(
        &self,
        paths: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Result<BatchRun, HarnessError> {
        self.config.validate()?;

        let fixture_ids: Vec<String> = paths
            .iter()
            .map(|path| self.loader.fixture_id(path))
            .collect();
        let fixture_set_hash = sha256_hex(fixture_ids.join("\n").as_bytes());
        let run_material = format!(
            "engine={};fixtures={fixture_set_hash};date={};timeout_ms={};workers={};stop={}",
            self.factory.engine_id(),
            self.config.run_date,
            self.config.timeout_ms,
            self.config.worker_count,
            self.config.stop_on_first_failure
        );
        let run_id = format!("harness-{}", &digest_hex(run_material.as_bytes())[..12]);

        let assignments = deterministic_worker_assignments(&fixture_ids, self.config.worker_count);
        let mut queues: Vec<Vec<&DeterministicWorkerAssignment>> =
            vec![Vec::new(); self.config.worker_count.max(1)];
        for assignment in &assignments {
            queues[assignment.worker_index].push(assignment);
        }

        let halted = AtomicBool::new(false);
        let slots: Mutex<Vec<Option<ExecutionOutcome>>> = Mutex::new(vec![None; paths.len()]);

        thread::scope(|scope| {
            for queue in &queues {
                let halted = &halted;
                let slots = &slots;
                scope.spawn(move || {
                    for assignment in queue {
                        if cancel.is_cancelled() || halted.load(Ordering::Acquire) {
                            break;
                        }
                        let outcome = self.run_one(&paths[assignment.position]);
                        if self.config.stop_on_first_failure && !outcome.is_pass() {
                            halted.store(true, Ordering::Release);
                        }
                        let mut guard = slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                        guard[assignment.position] = Some(outcome);
                    }
                });
            }
        });

        let slots = slots
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut outcomes = Vec::with_capacity(paths.len());
        let mut logs = Vec::with_capacity(paths.len());
        let (mut passed, mut failed, mut errored, mut timed_out) = (0usize, 0usize, 0usize, 0usize);

        for (assignment, slot) in assignments.iter().zip(slots) {
            let Some(outcome) = slot else { continue };
            let idx = assignment.position;
            match outcome.status {
                OutcomeStatus::Pass => passed += 1,
                OutcomeStatus::Fail => failed += 1,
                OutcomeStatus::Error => errored += 1,
            }
            if outcome.is_timeout() {
                timed_out += 1;
            }
            logs.push(HarnessLogEvent {
                trace_id: format!("{}-{}-{idx:04}", self.config.trace_prefix, run_id),
                decision_id: format!("decision-harness-{idx:04}"),
                policy_id: self.config.policy_id.clone(),
                component: HARNESS_COMPONENT.to_string(),
                event: "fixture_evaluated".to_string(),
                fixture_id: outcome.fixture_id.clone(),
                outcome: outcome.status,
                error_code: outcome.error_code().map(str::to_string),
                error_detail: failure_detail(&outcome),
                duration_us: outcome.duration_us,
                worker_index: assignment.worker_index,
            });
            outcomes.push(outcome);
        }

        let executed = outcomes.len();
        let summary = BatchSummary {
            run_id: run_id.clone(),
            engine_id: self.factory.engine_id().to_string(),
            fixture_set_hash,
            total: paths.len(),
            executed,
            passed,
            failed,
            errored,
            timed_out,
            skipped: paths.len() - executed,
        };

        Ok(BatchRun {
            run_id,
            outcomes,
            logs,
            summary,
        })
    }
}

fn evaluate_unit<F: EngineFactory>(
    factory: &F,
    unit: &ScriptUnit,
    budget: &ExecutionBudget,
    started: Instant,
) -> ExecutionOutcome {
    let fixture_id = unit.fixture_id.clone();
    let mut engine = match factory.create() {
        Ok(engine) => engine,
        Err(err) => {
            return ExecutionOutcome::errored(
                fixture_id,
                FixtureError::from_engine(&err),
                elapsed_us(started),
            );
        }
    };

    let mut host = FixtureHost::new();
    let result = engine.evaluate(unit, &mut host, budget);
    let duration_us = elapsed_us(started);
    match result {
        Ok(Completion::Normal(_)) => host.finish(fixture_id, None, duration_us),
        Ok(Completion::Thrown(thrown)) => {
            host.finish(fixture_id, Some(FixtureError::uncaught(thrown)), duration_us)
        }
        // A timed-out fixture reports no partial evidence.
        Err(err @ EngineError::Interrupted { .. }) => {
            ExecutionOutcome::errored(fixture_id, FixtureError::from_engine(&err), duration_us)
        }
        Err(err) => host.finish(fixture_id, Some(FixtureError::from_engine(&err)), duration_us),
    }
}

fn failure_detail(outcome: &ExecutionOutcome) -> Option<String> {
    match outcome.status {
        OutcomeStatus::Pass => None,
        OutcomeStatus::Error => outcome.error.as_ref().map(|err| err.detail.clone()),
        OutcomeStatus::Fail => {
            let failures = outcome.failures().count();
            let mismatches = outcome
                .compare_checkpoints
                .iter()
                .filter(|checkpoint| !checkpoint.matched)
                .count();
            Some(format!(
                "{failures} failed assertion(s), {mismatches} reportCompare mismatch(es)"
            ))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn elapsed_us(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX)
}
