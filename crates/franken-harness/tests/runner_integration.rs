mod common;

use std::path::PathBuf;

use frankenengine_harness::error::{
    AssertionKind, FE_HARNESS_INCLUDE, FE_HARNESS_METADATA, FE_HARNESS_TIMEOUT,
    FE_HARNESS_UNCAUGHT,
};
use frankenengine_harness::outcome::{FixtureErrorKind, OutcomeStatus};
use frankenengine_harness::runner::{CancellationToken, TestRunner};
use frankenengine_harness::value::{Completion, JsValue};

use common::{ScriptedFactory, fixture, loader, runner, runner_config};

const EMPTY_LOOKAHEAD: &str = "staging/sm/RegExp/empty-lookahead.js";
const COMPUTED_PROPERTY: &str = "staging/sm/expressions/computed-property-side-effects.js";

#[test]
fn empty_lookahead_fixture_passes() {
    let outcome = runner(1, 2_000).run_one(fixture(EMPTY_LOOKAHEAD));
    assert_eq!(outcome.status, OutcomeStatus::Pass, "{outcome:?}");
    assert_eq!(outcome.fixture_id, EMPTY_LOOKAHEAD);
    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.compare_checkpoints.len(), 1);
}

#[test]
fn computed_property_fixture_passes_with_diagnostics() {
    let outcome = runner(1, 2_000).run_one(fixture(COMPUTED_PROPERTY));
    assert_eq!(outcome.status, OutcomeStatus::Pass, "{outcome:?}");

    let kinds: Vec<_> = outcome.records.iter().map(|record| record.kind).collect();
    assert_eq!(kinds, vec![AssertionKind::ThrowsValue, AssertionKind::ThrowsValue]);
    assert_eq!(
        outcome.records[0].observed,
        Completion::Thrown(JsValue::number(42.0))
    );
    assert_eq!(
        outcome.records[1].observed,
        Completion::Thrown(JsValue::number(17.0))
    );
    assert_eq!(outcome.diagnostics.len(), 2);
    assert!(outcome.diagnostics[0].starts_with("1199695: "));
    assert_eq!(outcome.diagnostics[1], "Tests complete");
}

#[test]
fn prototype_overrides_do_not_leak_between_fixtures() {
    let paths = vec![
        fixture(COMPUTED_PROPERTY),
        fixture("scripted/isolation-probe.js"),
    ];
    let factory = ScriptedFactory::default();
    let runner = TestRunner::new(factory.clone(), loader(), runner_config(1, 2_000));
    let run = runner
        .run_batch(&paths, &CancellationToken::new())
        .expect("batch");

    assert!(run.outcomes.iter().all(|outcome| outcome.is_pass()), "{run:?}");
    assert_eq!(factory.engines_created(), 2);
}

#[test]
fn same_value_nan_passes() {
    let outcome = runner(1, 2_000).run_one(fixture("scripted/nan-same-value.js"));
    assert_eq!(outcome.status, OutcomeStatus::Pass);
}

#[test]
fn same_value_signed_zero_fails_both_ways() {
    let outcome = runner(1, 2_000).run_one(fixture("scripted/signed-zero.js"));
    assert_eq!(outcome.status, OutcomeStatus::Fail);
    assert_eq!(outcome.failures().count(), 2);
}

#[test]
fn throws_value_requires_exact_thrown_value() {
    let runner = runner(1, 2_000);
    assert_eq!(
        runner.run_one(fixture("scripted/throws-exact.js")).status,
        OutcomeStatus::Pass
    );

    let wrong = runner.run_one(fixture("scripted/throws-wrong-value.js"));
    assert_eq!(wrong.status, OutcomeStatus::Fail);
    assert_eq!(
        wrong.records[0].observed,
        Completion::Thrown(JsValue::string("17"))
    );

    let returned = runner.run_one(fixture("scripted/throws-returns.js"));
    assert_eq!(returned.status, OutcomeStatus::Fail);
    assert_eq!(
        returned.records[0].observed,
        Completion::Normal(JsValue::Undefined)
    );
}

#[test]
fn report_compare_mismatch_fails_even_with_passing_assertions() {
    let runner = runner(1, 2_000);
    let mismatch = runner.run_one(fixture("scripted/compare-mismatch.js"));
    assert_eq!(mismatch.status, OutcomeStatus::Fail);
    assert_eq!(mismatch.failures().count(), 0);

    let zero = runner.run_one(fixture("scripted/compare-signed-zero.js"));
    assert_eq!(zero.status, OutcomeStatus::Pass);
}

#[test]
fn uncaught_throw_is_error_and_keeps_earlier_records() {
    let outcome = runner(1, 2_000).run_one(fixture("scripted/uncaught.js"));
    assert_eq!(outcome.status, OutcomeStatus::Error);
    assert_eq!(outcome.error_code(), Some(FE_HARNESS_UNCAUGHT));
    assert_eq!(outcome.records.len(), 1);
    let error = outcome.error.expect("error");
    assert_eq!(error.kind, FixtureErrorKind::UncaughtScript);
    assert_eq!(error.thrown, Some(JsValue::string("boom")));
}

#[test]
fn load_failures_are_fixture_errors() {
    let runner = runner(1, 2_000);
    let cases = [
        ("scripted/missing-include.js", FE_HARNESS_INCLUDE),
        ("scripted/contradictory-flags.js", FE_HARNESS_METADATA),
        ("scripted/unterminated-metadata.js", FE_HARNESS_METADATA),
    ];
    for (path, code) in cases {
        let outcome = runner.run_one(fixture(path));
        assert_eq!(outcome.status, OutcomeStatus::Error, "{path}");
        assert_eq!(outcome.error_code(), Some(code), "{path}");
        assert_eq!(
            outcome.error.as_ref().map(|err| err.kind),
            Some(FixtureErrorKind::Load)
        );
    }
}

#[test]
fn only_strict_fixture_runs_once_in_strict_mode() {
    let factory = ScriptedFactory::default();
    let runner = TestRunner::new(factory.clone(), loader(), runner_config(1, 2_000));
    let outcome = runner.run_one(fixture("scripted/only-strict.js"));
    assert_eq!(outcome.status, OutcomeStatus::Pass);
    assert_eq!(factory.engines_created(), 1);
}

#[test]
fn infinite_loop_times_out_and_batch_continues() {
    let paths = vec![
        fixture("scripted/infinite-loop.js"),
        fixture("scripted/nan-same-value.js"),
    ];
    let run = runner(1, 200)
        .run_batch(&paths, &CancellationToken::new())
        .expect("batch");

    assert_eq!(run.outcomes.len(), 2);
    let timed_out = &run.outcomes[0];
    assert_eq!(timed_out.status, OutcomeStatus::Error);
    assert!(timed_out.is_timeout());
    assert_eq!(timed_out.error_code(), Some(FE_HARNESS_TIMEOUT));
    assert!(timed_out.records.is_empty());
    assert_eq!(run.outcomes[1].status, OutcomeStatus::Pass);
    assert_eq!(run.summary.timed_out, 1);
}

#[test]
fn batch_order_matches_input_order_across_workers() {
    let inputs = [
        "scripted/throws-exact.js",
        "scripted/infinite-loop.js",
        "scripted/signed-zero.js",
        EMPTY_LOOKAHEAD,
        "scripted/missing-include.js",
        COMPUTED_PROPERTY,
        "scripted/nan-same-value.js",
    ];
    let paths: Vec<PathBuf> = inputs.iter().map(|path| fixture(path)).collect();
    let run = runner(4, 200)
        .run_batch(&paths, &CancellationToken::new())
        .expect("batch");

    let ids: Vec<_> = run
        .outcomes
        .iter()
        .map(|outcome| outcome.fixture_id.as_str())
        .collect();
    assert_eq!(ids, inputs.to_vec());

    let logged: Vec<_> = run.logs.iter().map(|event| event.fixture_id.as_str()).collect();
    assert_eq!(logged, inputs.to_vec());
    assert!(run.logs.iter().all(|event| event.worker_index < 4));
    assert_eq!(run.summary.total, inputs.len());
    assert_eq!(run.summary.passed, 4);
    assert_eq!(run.summary.failed, 1);
    assert_eq!(run.summary.errored, 2);
    assert_eq!(run.exit_code(), 1);
}

#[test]
fn stop_on_first_failure_reports_only_started_fixtures() {
    let paths = vec![
        fixture("scripted/nan-same-value.js"),
        fixture("scripted/signed-zero.js"),
        fixture("scripted/throws-exact.js"),
        fixture(EMPTY_LOOKAHEAD),
    ];
    let mut config = runner_config(1, 2_000);
    config.stop_on_first_failure = true;
    let run = TestRunner::new(ScriptedFactory::default(), loader(), config)
        .run_batch(&paths, &CancellationToken::new())
        .expect("batch");

    let statuses: Vec<_> = run.outcomes.iter().map(|outcome| outcome.status).collect();
    assert_eq!(statuses, vec![OutcomeStatus::Pass, OutcomeStatus::Fail]);
    assert_eq!(run.summary.skipped, 2);
    assert_eq!(run.exit_code(), 1);
}

#[test]
fn all_passing_batch_exits_zero() {
    let paths = vec![fixture(EMPTY_LOOKAHEAD), fixture(COMPUTED_PROPERTY)];
    let run = runner(2, 2_000)
        .run_batch(&paths, &CancellationToken::new())
        .expect("batch");
    assert!(run.all_passed());
    assert_eq!(run.exit_code(), 0);
    assert_eq!(run.summary.executed, 2);
}
