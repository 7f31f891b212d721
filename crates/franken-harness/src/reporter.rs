//! Per-fixture accumulation of assertion records, compare checkpoints and
//! diagnostic output.

use crate::error::AssertionKind;
use crate::outcome::{AssertionRecord, CompareCheckpoint, ExecutionOutcome, FixtureError};
use crate::value::{Completion, JsValue};

#[derive(Debug)]
enum RecordSlot {
    Pending,
    Done(AssertionRecord),
}

/// Reserved position in the record list for an assertion whose result is
/// only known after nested script code runs.
#[derive(Debug)]
#[must_use = "a reserved assertion slot must be completed"]
pub struct ReservedRecord {
    index: usize,
    kind: AssertionKind,
    expected: JsValue,
    message: Option<String>,
}

impl ReservedRecord {
    pub fn expected(&self) -> &JsValue {
        &self.expected
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

#[derive(Debug, Default)]
pub struct ResultReporter {
    slots: Vec<RecordSlot>,
    compare_checkpoints: Vec<CompareCheckpoint>,
    diagnostics: Vec<String>,
}

impl ResultReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(
        &mut self,
        kind: AssertionKind,
        expected: JsValue,
        observed: Completion,
        satisfied: bool,
        message: Option<String>,
    ) -> usize {
        let index = self.slots.len();
        self.slots.push(RecordSlot::Done(AssertionRecord {
            index,
            kind,
            expected,
            observed,
            satisfied,
            message,
        }));
        index
    }

    pub fn reserve(
        &mut self,
        kind: AssertionKind,
        expected: JsValue,
        message: Option<String>,
    ) -> ReservedRecord {
        let index = self.slots.len();
        self.slots.push(RecordSlot::Pending);
        ReservedRecord {
            index,
            kind,
            expected,
            message,
        }
    }

    pub fn complete(
        &mut self,
        reserved: ReservedRecord,
        observed: Completion,
        satisfied: bool,
    ) {
        let index = reserved.index;
        self.slots[index] = RecordSlot::Done(AssertionRecord {
            index,
            kind: reserved.kind,
            expected: reserved.expected,
            observed,
            satisfied,
            message: reserved.message,
        });
    }

    /// `reportCompare`: ordinary strict equality, never SameValue.
    pub fn report_compare(
        &mut self,
        actual: JsValue,
        expected: JsValue,
        message: Option<String>,
    ) -> bool {
        let matched = actual.strict_equals(&expected);
        self.compare_checkpoints.push(CompareCheckpoint {
            actual,
            expected,
            matched,
            message,
        });
        matched
    }

    pub fn print(&mut self, message: impl Into<String>) {
        self.diagnostics.push(message.into());
    }

    pub fn records(&self) -> impl Iterator<Item = &AssertionRecord> {
        self.slots.iter().filter_map(|slot| match slot {
            RecordSlot::Done(record) => Some(record),
            RecordSlot::Pending => None,
        })
    }

    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    pub fn compare_checkpoints(&self) -> &[CompareCheckpoint] {
        &self.compare_checkpoints
    }

    /// Builds the immutable outcome. Slots still pending belong to a thunk
    /// that never returned and are dropped.
    pub fn finish(
        self,
        fixture_id: impl Into<String>,
        error: Option<FixtureError>,
        duration_us: u64,
    ) -> ExecutionOutcome {
        let records = self
            .slots
            .into_iter()
            .filter_map(|slot| match slot {
                RecordSlot::Done(record) => Some(record),
                RecordSlot::Pending => None,
            })
            .collect();
        ExecutionOutcome::new(
            fixture_id,
            records,
            self.compare_checkpoints,
            error,
            self.diagnostics,
            duration_us,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::OutcomeStatus;

    #[test]
    fn report_compare_uses_strict_equality() {
        let mut reporter = ResultReporter::new();
        assert!(reporter.report_compare(JsValue::number(0.0), JsValue::number(-0.0), None));
        assert!(!reporter.report_compare(
            JsValue::number(f64::NAN),
            JsValue::number(f64::NAN),
            None
        ));
        let outcome = reporter.finish("nan.js", None, 0);
        assert_eq!(outcome.status, OutcomeStatus::Fail);
    }

    #[test]
    fn print_never_changes_status() {
        let mut reporter = ResultReporter::new();
        reporter.print("1199695: summary");
        reporter.print("Tests complete");
        reporter.report_compare(JsValue::number(0.0), JsValue::number(0.0), None);
        let outcome = reporter.finish("print.js", None, 0);
        assert_eq!(outcome.status, OutcomeStatus::Pass);
        assert_eq!(outcome.diagnostics, vec!["1199695: summary", "Tests complete"]);
    }

    #[test]
    fn reserved_slots_keep_call_order() {
        let mut reporter = ResultReporter::new();
        let outer = reporter.reserve(AssertionKind::ThrowsValue, JsValue::number(42.0), None);
        reporter.append(
            AssertionKind::SameValue,
            JsValue::Bool(true),
            Completion::Normal(JsValue::Bool(true)),
            true,
            None,
        );
        reporter.complete(outer, Completion::Thrown(JsValue::number(42.0)), true);

        let kinds: Vec<_> = reporter.records().map(|record| record.kind).collect();
        assert_eq!(kinds, vec![AssertionKind::ThrowsValue, AssertionKind::SameValue]);
        let indexes: Vec<_> = reporter.records().map(|record| record.index).collect();
        assert_eq!(indexes, vec![0, 1]);
    }

    #[test]
    fn unfinished_reservations_are_not_reported() {
        let mut reporter = ResultReporter::new();
        let _pending = reporter.reserve(AssertionKind::ThrowsValue, JsValue::Undefined, None);
        let outcome = reporter.finish("hang.js", None, 0);
        assert!(outcome.records.is_empty());
    }
}
