use serde::{Deserialize, Serialize};

use crate::error::{
    AssertionKind, EngineError, FE_HARNESS_ASSERTION, FE_HARNESS_COMPARE_MISMATCH,
    FE_HARNESS_ENGINE_CRASH, FE_HARNESS_UNCAUGHT, LoadError,
};
use crate::value::{Completion, JsValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Pass,
    Fail,
    Error,
}

impl OutcomeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureErrorKind {
    Load,
    UncaughtScript,
    Timeout,
    Engine,
}

/// Error that terminated a fixture before it completed normally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureError {
    pub kind: FixtureErrorKind,
    pub code: String,
    pub detail: String,
    /// Payload of an uncaught throw.
    pub thrown: Option<JsValue>,
}

impl FixtureError {
    pub fn from_load(err: &LoadError) -> Self {
        Self {
            kind: FixtureErrorKind::Load,
            code: err.code().to_string(),
            detail: err.to_string(),
            thrown: None,
        }
    }

    pub fn from_engine(err: &EngineError) -> Self {
        let kind = match err {
            EngineError::Interrupted { .. } => FixtureErrorKind::Timeout,
            _ => FixtureErrorKind::Engine,
        };
        Self {
            kind,
            code: err.code().to_string(),
            detail: err.to_string(),
            thrown: None,
        }
    }

    pub fn uncaught(thrown: JsValue) -> Self {
        Self {
            kind: FixtureErrorKind::UncaughtScript,
            code: FE_HARNESS_UNCAUGHT.to_string(),
            detail: format!("uncaught exception: {thrown}"),
            thrown: Some(thrown),
        }
    }

    pub fn timeout(code: &str, budget_ms: u64) -> Self {
        Self {
            kind: FixtureErrorKind::Timeout,
            code: code.to_string(),
            detail: format!("fixture exceeded its {budget_ms}ms execution budget"),
            thrown: None,
        }
    }

    pub fn engine_crash(detail: impl Into<String>) -> Self {
        Self {
            kind: FixtureErrorKind::Engine,
            code: FE_HARNESS_ENGINE_CRASH.to_string(),
            detail: detail.into(),
            thrown: None,
        }
    }
}

/// One assertion call, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionRecord {
    pub index: usize,
    pub kind: AssertionKind,
    pub expected: JsValue,
    /// `Normal(actual)` for sameValue; the thunk's completion for
    /// throwsValue.
    pub observed: Completion,
    pub satisfied: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareCheckpoint {
    pub actual: JsValue,
    pub expected: JsValue,
    pub matched: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub fixture_id: String,
    pub status: OutcomeStatus,
    pub records: Vec<AssertionRecord>,
    pub compare_checkpoints: Vec<CompareCheckpoint>,
    pub error: Option<FixtureError>,
    pub diagnostics: Vec<String>,
    pub duration_us: u64,
}

impl ExecutionOutcome {
    pub fn new(
        fixture_id: impl Into<String>,
        records: Vec<AssertionRecord>,
        compare_checkpoints: Vec<CompareCheckpoint>,
        error: Option<FixtureError>,
        diagnostics: Vec<String>,
        duration_us: u64,
    ) -> Self {
        let status = classify_status(&records, &compare_checkpoints, error.as_ref());
        Self {
            fixture_id: fixture_id.into(),
            status,
            records,
            compare_checkpoints,
            error,
            diagnostics,
            duration_us,
        }
    }

    /// Outcome of a fixture that never produced assertion evidence.
    pub fn errored(fixture_id: impl Into<String>, error: FixtureError, duration_us: u64) -> Self {
        Self::new(fixture_id, Vec::new(), Vec::new(), Some(error), Vec::new(), duration_us)
    }

    pub fn is_pass(&self) -> bool {
        self.status == OutcomeStatus::Pass
    }

    pub fn failures(&self) -> impl Iterator<Item = &AssertionRecord> {
        self.records.iter().filter(|record| !record.satisfied)
    }

    pub fn is_timeout(&self) -> bool {
        self.error
            .as_ref()
            .is_some_and(|err| err.kind == FixtureErrorKind::Timeout)
    }

    /// Stable code explaining a non-passing status.
    pub fn error_code(&self) -> Option<&str> {
        match self.status {
            OutcomeStatus::Pass => None,
            OutcomeStatus::Error => self.error.as_ref().map(|err| err.code.as_str()),
            OutcomeStatus::Fail => {
                if self.failures().next().is_some() {
                    Some(FE_HARNESS_ASSERTION)
                } else {
                    Some(FE_HARNESS_COMPARE_MISMATCH)
                }
            }
        }
    }
}

/// Error iff an uncaught error terminated the fixture; Fail iff an
/// assertion or compare checkpoint did not hold; Pass otherwise.
pub fn classify_status(
    records: &[AssertionRecord],
    compare_checkpoints: &[CompareCheckpoint],
    error: Option<&FixtureError>,
) -> OutcomeStatus {
    if error.is_some() {
        OutcomeStatus::Error
    } else if records.iter().any(|record| !record.satisfied)
        || compare_checkpoints.iter().any(|checkpoint| !checkpoint.matched)
    {
        OutcomeStatus::Fail
    } else {
        OutcomeStatus::Pass
    }
}
