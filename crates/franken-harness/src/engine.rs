//! Contract between the harness and a host evaluation engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::EngineError;
use crate::host::FixtureHost;
use crate::loader::ScriptUnit;
use crate::value::Completion;

/// Shared flag raised by the runner when a fixture's budget is spent.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle {
    raised: Arc<AtomicBool>,
}

impl InterruptHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interrupt(&self) {
        self.raised.store(true, Ordering::Release);
    }

    pub fn is_interrupted(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }
}

/// Wall-clock budget for one fixture.
#[derive(Debug, Clone)]
pub struct ExecutionBudget {
    started: Instant,
    deadline: Instant,
    interrupt: InterruptHandle,
}

impl ExecutionBudget {
    pub fn new(timeout: Duration, interrupt: InterruptHandle) -> Self {
        let started = Instant::now();
        Self {
            started,
            deadline: started + timeout,
            interrupt,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Engines poll this at loop back-edges or while waiting on a child.
    pub fn is_exhausted(&self) -> bool {
        self.interrupt.is_interrupted() || Instant::now() >= self.deadline
    }

    pub fn interrupted(&self, engine_id: &str) -> EngineError {
        EngineError::Interrupted {
            engine_id: engine_id.to_string(),
            elapsed_ms: self.elapsed_ms(),
        }
    }
}

/// One isolated realm. A fresh instance evaluates exactly one fixture.
///
/// `evaluate` installs `unit.bindings` as globals routed into `host`, runs
/// the include sources and then the body in order, and returns the body's
/// completion. A throw from any source ends evaluation with `Thrown`.
pub trait EvaluationEngine {
    fn engine_id(&self) -> &str;

    fn evaluate(
        &mut self,
        unit: &ScriptUnit,
        host: &mut FixtureHost,
        budget: &ExecutionBudget,
    ) -> Result<Completion, EngineError>;
}

/// Builds a fresh engine per fixture. Shared across worker threads.
pub trait EngineFactory: Send + Sync {
    type Engine: EvaluationEngine;

    fn engine_id(&self) -> &str;

    fn create(&self) -> Result<Self::Engine, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_is_visible_through_clones() {
        let handle = InterruptHandle::new();
        let budget = ExecutionBudget::new(Duration::from_secs(60), handle.clone());
        assert!(!budget.is_exhausted());
        handle.interrupt();
        assert!(budget.is_exhausted());
    }

    #[test]
    fn zero_budget_is_exhausted_immediately() {
        let budget = ExecutionBudget::new(Duration::ZERO, InterruptHandle::new());
        assert!(budget.is_exhausted());
        assert_eq!(budget.remaining(), Duration::ZERO);
    }

    #[test]
    fn interrupted_error_maps_to_timeout_code() {
        let budget = ExecutionBudget::new(Duration::ZERO, InterruptHandle::new());
        let err = budget.interrupted("stub");
        assert_eq!(err.code(), crate::error::FE_HARNESS_TIMEOUT);
    }
}
