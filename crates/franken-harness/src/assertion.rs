//! The comparison primitives fixtures call: `assert.sameValue` and
//! `assertThrowsValue`. Every call leaves exactly one record behind.

use crate::error::{AssertionError, AssertionKind};
use crate::reporter::{ReservedRecord, ResultReporter};
use crate::value::{Completion, JsValue};

pub fn same_value(
    reporter: &mut ResultReporter,
    actual: JsValue,
    expected: JsValue,
    message: Option<String>,
) -> Result<(), AssertionError> {
    let satisfied = actual.same_value(&expected);
    let observed = Completion::Normal(actual);
    let error = (!satisfied).then(|| AssertionError {
        kind: AssertionKind::SameValue,
        expected: expected.clone(),
        observed: observed.clone(),
        message: message.clone(),
    });
    reporter.append(AssertionKind::SameValue, expected, observed, satisfied, message);
    error.map_or(Ok(()), Err)
}

/// First half of `assertThrowsValue`: claims the record slot before the
/// thunk runs, so assertions made inside the thunk are ordered after it.
pub fn begin_throws_value(
    reporter: &mut ResultReporter,
    expected: JsValue,
    message: Option<String>,
) -> PendingThrowsValue {
    PendingThrowsValue {
        reserved: reporter.reserve(AssertionKind::ThrowsValue, expected, message),
    }
}

#[derive(Debug)]
#[must_use = "finish the assertion with the thunk's completion"]
pub struct PendingThrowsValue {
    reserved: ReservedRecord,
}

impl PendingThrowsValue {
    /// Satisfied iff the thunk threw a value SameValue-equal to the
    /// expected one.
    pub fn finish(
        self,
        reporter: &mut ResultReporter,
        completion: Completion,
    ) -> Result<(), AssertionError> {
        let expected = self.reserved.expected().clone();
        let satisfied = match &completion {
            Completion::Thrown(thrown) => thrown.same_value(&expected),
            Completion::Normal(_) => false,
        };
        let message = if satisfied {
            None
        } else {
            self.reserved.message().map(str::to_string)
        };
        reporter.complete(self.reserved, completion.clone(), satisfied);
        if satisfied {
            Ok(())
        } else {
            Err(AssertionError {
                kind: AssertionKind::ThrowsValue,
                expected,
                observed: completion,
                message,
            })
        }
    }
}
