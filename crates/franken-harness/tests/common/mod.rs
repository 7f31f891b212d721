//! In-process engine double for integration tests.
//!
//! The two SpiderMonkey reference fixtures are evaluated by hand-written
//! scenarios that mirror what a conformant engine does with them. Every
//! other fixture is driven by `//@ <directive>` lines in its body.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use frankenengine_harness::config::RunnerConfig;
use frankenengine_harness::engine::{EngineFactory, EvaluationEngine, ExecutionBudget};
use frankenengine_harness::error::EngineError;
use frankenengine_harness::host::FixtureHost;
use frankenengine_harness::loader::{ScriptLoader, ScriptUnit};
use frankenengine_harness::metadata::Strictness;
use frankenengine_harness::runner::TestRunner;
use frankenengine_harness::value::{Completion, JsValue};

pub const ENGINE_ID: &str = "scripted";

pub fn fixtures_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

pub fn fixture(relative: &str) -> PathBuf {
    fixtures_root().join(relative)
}

pub fn loader() -> ScriptLoader {
    ScriptLoader::new(fixtures_root().join("harness")).with_fixture_root(fixtures_root())
}

pub fn runner_config(worker_count: usize, timeout_ms: u64) -> RunnerConfig {
    RunnerConfig {
        trace_prefix: "trace-harness-test".to_string(),
        policy_id: "policy-harness-test".to_string(),
        run_date: "2026-10-18".to_string(),
        worker_count,
        timeout_ms,
        stop_on_first_failure: false,
    }
}

pub fn runner(worker_count: usize, timeout_ms: u64) -> TestRunner<ScriptedFactory> {
    TestRunner::new(
        ScriptedFactory::default(),
        loader(),
        runner_config(worker_count, timeout_ms),
    )
}

/// Global state of one engine instance. Never shared between engines.
#[derive(Debug, Default)]
pub struct Realm {
    pub globals: BTreeMap<String, JsValue>,
    next_handle: u32,
}

impl Realm {
    fn allocate(&mut self, class: &str) -> JsValue {
        self.next_handle += 1;
        JsValue::object(self.next_handle, class)
    }
}

#[derive(Debug, Default, Clone)]
pub struct ScriptedFactory {
    created: Arc<AtomicUsize>,
}

impl ScriptedFactory {
    pub fn engines_created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl EngineFactory for ScriptedFactory {
    type Engine = ScriptedEngine;

    fn engine_id(&self) -> &str {
        ENGINE_ID
    }

    fn create(&self) -> Result<ScriptedEngine, EngineError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedEngine {
            realm: Realm::default(),
        })
    }
}

pub struct ScriptedEngine {
    realm: Realm,
}

impl EvaluationEngine for ScriptedEngine {
    fn engine_id(&self) -> &str {
        ENGINE_ID
    }

    fn evaluate(
        &mut self,
        unit: &ScriptUnit,
        host: &mut FixtureHost,
        budget: &ExecutionBudget,
    ) -> Result<Completion, EngineError> {
        for include in &unit.includes {
            if include.name == "sm/non262.js" {
                let assert_eq = self.realm.allocate("Function");
                self.realm.globals.insert("assertEq".to_string(), assert_eq);
            }
        }

        let file_name = Path::new(&unit.fixture_id)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        match file_name.as_str() {
            "empty-lookahead.js" => Ok(self.empty_lookahead(host)),
            "computed-property-side-effects.js" => Ok(self.computed_property(host)),
            _ => self.run_directives(unit, host, budget),
        }
    }
}

impl ScriptedEngine {
    fn empty_lookahead(&mut self, host: &mut FixtureHost) -> Completion {
        if !self.realm.globals.contains_key("assertEq") {
            return Completion::Thrown(JsValue::string("ReferenceError: assertEq is not defined"));
        }
        let regexp = self.realm.allocate("RegExp");
        self.realm.globals.insert("regexp".to_string(), regexp);
        // An empty lookahead matches at position 0 of any string.
        let _ = host.same_value(JsValue::Bool(true), JsValue::Bool(true), None);
        host.report_compare(JsValue::number(0.0), JsValue::number(0.0), None);
        Completion::Normal(JsValue::Undefined)
    }

    fn computed_property(&mut self, host: &mut FixtureHost) -> Completion {
        host.print(
            "1199695: Computed property names must be considered as always effectful even when \
             the name expression isn't effectful, because calling ToPropertyKey on some \
             non-effectful expressions has user-modifiable behavior",
        );

        let thrower = self.realm.allocate("Function");
        self.realm
            .globals
            .insert("RegExp.prototype.toString".to_string(), thrower);
        let realm = &self.realm;
        let _ = host.throws_value(
            |_| to_property_key(realm, "RegExp.prototype.toString", 42.0),
            JsValue::number(42.0),
            None,
        );

        let q = self.realm.allocate("Function");
        self.realm.globals.insert("Q".to_string(), q);
        let thrower = self.realm.allocate("Function");
        self.realm.globals.insert("Q.toString".to_string(), thrower);
        let realm = &self.realm;
        let _ = host.throws_value(
            |_| to_property_key(realm, "Q.toString", 17.0),
            JsValue::number(17.0),
            None,
        );

        host.print("Tests complete");
        host.report_compare(JsValue::number(0.0), JsValue::number(0.0), None);
        Completion::Normal(JsValue::Undefined)
    }

    fn run_directives(
        &mut self,
        unit: &ScriptUnit,
        host: &mut FixtureHost,
        budget: &ExecutionBudget,
    ) -> Result<Completion, EngineError> {
        for line in unit.body.text.lines() {
            let Some(directive) = line.trim().strip_prefix("//@ ") else {
                continue;
            };
            let mut words = directive.split_whitespace();
            let op = words.next().unwrap_or_default();
            let args: Vec<&str> = words.collect();
            match (op, args.as_slice()) {
                ("same_value", [actual, expected]) => {
                    let _ = host.same_value(literal(actual), literal(expected), None);
                }
                ("throws_value", [completion, expected]) => {
                    let completion = match completion.split_once(':') {
                        Some(("throw", value)) => Completion::Thrown(literal(value)),
                        Some(("return", value)) => Completion::Normal(literal(value)),
                        _ => return Ok(syntax_error(directive)),
                    };
                    let _ = host.throws_value(|_| completion, literal(expected), None);
                }
                ("report_compare", [actual, expected]) => {
                    host.report_compare(literal(actual), literal(expected), None);
                }
                ("print", _) => host.print(args.join(" ")),
                ("throw", [value]) => return Ok(Completion::Thrown(literal(value))),
                ("expect_global_absent", [name]) => {
                    let present = self.realm.globals.contains_key(*name);
                    let _ = host.same_value(JsValue::Bool(present), JsValue::Bool(false), None);
                }
                ("expect_strict", []) => {
                    let strict = unit.strictness == Strictness::Strict;
                    let _ = host.same_value(JsValue::Bool(strict), JsValue::Bool(true), None);
                }
                ("spin", []) => loop {
                    if budget.is_exhausted() {
                        return Err(budget.interrupted(ENGINE_ID));
                    }
                    thread::sleep(Duration::from_millis(1));
                },
                _ => return Ok(syntax_error(directive)),
            }
        }
        Ok(Completion::Normal(JsValue::Undefined))
    }
}

/// ToPropertyKey on a value whose `toString` the realm may have replaced
/// with a thrower.
fn to_property_key(realm: &Realm, override_key: &str, thrown: f64) -> Completion {
    if realm.globals.contains_key(override_key) {
        Completion::Thrown(JsValue::number(thrown))
    } else {
        Completion::Normal(JsValue::Undefined)
    }
}

fn syntax_error(directive: &str) -> Completion {
    Completion::Thrown(JsValue::string(format!(
        "SyntaxError: bad directive `{directive}`"
    )))
}

pub fn literal(raw: &str) -> JsValue {
    match raw {
        "undefined" => JsValue::Undefined,
        "null" => JsValue::Null,
        "true" => JsValue::Bool(true),
        "false" => JsValue::Bool(false),
        "NaN" => JsValue::number(f64::NAN),
        "-0" => JsValue::number(-0.0),
        quoted if quoted.len() >= 2 && quoted.starts_with('"') && quoted.ends_with('"') => {
            JsValue::string(&quoted[1..quoted.len() - 1])
        }
        other => other
            .parse::<f64>()
            .map(JsValue::number)
            .unwrap_or_else(|_| JsValue::string(other)),
    }
}
