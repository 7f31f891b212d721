//! Globals the harness injects into every fixture's engine, and the
//! per-fixture object those globals call into.

use serde::{Deserialize, Serialize};

use crate::assertion::{self, PendingThrowsValue};
use crate::error::AssertionError;
use crate::outcome::{ExecutionOutcome, FixtureError};
use crate::reporter::ResultReporter;
use crate::value::{Completion, JsValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostBinding {
    SameValue,
    ThrowsValue,
    ReportCompare,
    Print,
}

pub const HOST_BINDINGS: [HostBinding; 4] = [
    HostBinding::SameValue,
    HostBinding::ThrowsValue,
    HostBinding::ReportCompare,
    HostBinding::Print,
];

impl HostBinding {
    /// Dotted path of the global the binding is installed under.
    pub fn global_path(self) -> &'static str {
        match self {
            Self::SameValue => "assert.sameValue",
            Self::ThrowsValue => "assertThrowsValue",
            Self::ReportCompare => "reportCompare",
            Self::Print => "print",
        }
    }
}

/// Receiver for binding calls made by one fixture's script.
///
/// Engines return `undefined` to the script for every binding; a failed
/// assertion is recorded here and does not throw into the script.
#[derive(Debug, Default)]
pub struct FixtureHost {
    reporter: ResultReporter,
}

impl FixtureHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn same_value(
        &mut self,
        actual: JsValue,
        expected: JsValue,
        message: Option<String>,
    ) -> Result<(), AssertionError> {
        assertion::same_value(&mut self.reporter, actual, expected, message)
    }

    /// Runs `thunk` with access to the host, so assertions nested inside the
    /// thunk are recorded too.
    pub fn throws_value<F>(
        &mut self,
        thunk: F,
        expected: JsValue,
        message: Option<String>,
    ) -> Result<(), AssertionError>
    where
        F: FnOnce(&mut FixtureHost) -> Completion,
    {
        let pending = self.begin_throws_value(expected, message);
        let completion = thunk(self);
        self.finish_throws_value(pending, completion)
    }

    /// `throwsValue` for engines that already ran the thunk themselves.
    pub fn throws_value_observed(
        &mut self,
        completion: Completion,
        expected: JsValue,
        message: Option<String>,
    ) -> Result<(), AssertionError> {
        self.throws_value(|_| completion, expected, message)
    }

    /// Split form of [`Self::throws_value`] for engines that report the
    /// thunk's start and end as separate events.
    pub fn begin_throws_value(
        &mut self,
        expected: JsValue,
        message: Option<String>,
    ) -> PendingThrowsValue {
        assertion::begin_throws_value(&mut self.reporter, expected, message)
    }

    pub fn finish_throws_value(
        &mut self,
        pending: PendingThrowsValue,
        completion: Completion,
    ) -> Result<(), AssertionError> {
        pending.finish(&mut self.reporter, completion)
    }

    pub fn report_compare(
        &mut self,
        actual: JsValue,
        expected: JsValue,
        message: Option<String>,
    ) -> bool {
        self.reporter.report_compare(actual, expected, message)
    }

    pub fn print(&mut self, message: impl Into<String>) {
        self.reporter.print(message);
    }

    pub fn reporter(&self) -> &ResultReporter {
        &self.reporter
    }

    pub fn finish(
        self,
        fixture_id: impl Into<String>,
        error: Option<FixtureError>,
        duration_us: u64,
    ) -> ExecutionOutcome {
        self.reporter.finish(fixture_id, error, duration_us)
    }
}
