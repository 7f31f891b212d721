//! [`EvaluationEngine`] backed by an external JavaScript shell process.
//!
//! The fixture is written to a scratch file behind a prelude that installs
//! the host bindings. The shell reports each binding call on stdout as a
//! line starting with [`PROTOCOL_MARKER`] followed by a JSON message; any
//! other output is kept as diagnostics.

use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use serde::Deserialize;

use crate::assertion::PendingThrowsValue;
use crate::engine::{EngineFactory, EvaluationEngine, ExecutionBudget};
use crate::error::EngineError;
use crate::host::FixtureHost;
use crate::loader::ScriptUnit;
use crate::metadata::Strictness;
use crate::value::{Completion, JsValue};

pub const PROTOCOL_MARKER: &str = "##franken-harness## ";

pub const HOST_PRELUDE: &str = include_str!("../harness/host_prelude.js");

const COMPLETION_CALL: &str = "__frankenHarness.done();";
const POLL_INTERVAL: Duration = Duration::from_millis(10);

static SCRATCH_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum ProtocolMessage {
    SameValue {
        actual: JsValue,
        expected: JsValue,
        #[serde(default)]
        message: Option<String>,
    },
    ThrowsValueBegin {
        expected: JsValue,
        #[serde(default)]
        message: Option<String>,
    },
    ThrowsValue {
        completion: Completion,
    },
    ReportCompare {
        actual: JsValue,
        expected: JsValue,
        #[serde(default)]
        message: Option<String>,
    },
    Print {
        message: String,
    },
    Done {
        completion: Completion,
    },
}

#[derive(Debug, Clone)]
pub struct ShellEngineFactory {
    engine_id: String,
    command: String,
    args: Vec<String>,
    scratch_dir: PathBuf,
}

impl ShellEngineFactory {
    pub fn new(command: impl Into<String>) -> Self {
        let command = command.into();
        Self {
            engine_id: format!("shell:{command}"),
            command,
            args: Vec::new(),
            scratch_dir: std::env::temp_dir(),
        }
    }

    /// Arguments placed before the scratch file path.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

impl EngineFactory for ShellEngineFactory {
    type Engine = ShellEngine;

    fn engine_id(&self) -> &str {
        &self.engine_id
    }

    fn create(&self) -> Result<ShellEngine, EngineError> {
        fs::create_dir_all(&self.scratch_dir).map_err(|err| EngineError::Create {
            engine_id: self.engine_id.clone(),
            detail: format!(
                "scratch dir `{}` unavailable: {err}",
                self.scratch_dir.display()
            ),
        })?;
        Ok(ShellEngine {
            factory: self.clone(),
        })
    }
}

#[derive(Debug)]
pub struct ShellEngine {
    factory: ShellEngineFactory,
}

/// Concatenated script handed to the shell: directive, prelude, includes,
/// body, completion call.
pub fn compose_script(unit: &ScriptUnit) -> String {
    let mut script = String::new();
    if unit.strictness == Strictness::Strict {
        script.push_str("'use strict';\n");
    }
    script.push_str(HOST_PRELUDE);
    for source in unit.sources() {
        script.push_str("\n// ");
        script.push_str(&source.name);
        script.push('\n');
        script.push_str(&source.text);
        if !source.text.ends_with('\n') {
            script.push('\n');
        }
    }
    script.push_str(COMPLETION_CALL);
    script.push('\n');
    script
}

struct ProtocolSession<'a> {
    engine_id: &'a str,
    host: &'a mut FixtureHost,
    pending: Vec<PendingThrowsValue>,
    completion: Option<Completion>,
    line_no: usize,
}

impl ProtocolSession<'_> {
    fn accept(&mut self, line: &str) -> Result<(), EngineError> {
        self.line_no += 1;
        let Some(payload) = line.strip_prefix(PROTOCOL_MARKER) else {
            self.host.print(line);
            return Ok(());
        };
        let message: ProtocolMessage =
            serde_json::from_str(payload).map_err(|err| EngineError::Protocol {
                engine_id: self.engine_id.to_string(),
                line: self.line_no,
                detail: err.to_string(),
            })?;

        // Assertion failures are already recorded by the host.
        match message {
            ProtocolMessage::SameValue {
                actual,
                expected,
                message,
            } => {
                let _ = self.host.same_value(actual, expected, message);
            }
            ProtocolMessage::ThrowsValueBegin { expected, message } => {
                self.pending
                    .push(self.host.begin_throws_value(expected, message));
            }
            ProtocolMessage::ThrowsValue { completion } => {
                let pending = self.pending.pop().ok_or_else(|| EngineError::Protocol {
                    engine_id: self.engine_id.to_string(),
                    line: self.line_no,
                    detail: "throws_value without matching throws_value_begin".to_string(),
                })?;
                let _ = self.host.finish_throws_value(pending, completion);
            }
            ProtocolMessage::ReportCompare {
                actual,
                expected,
                message,
            } => {
                self.host.report_compare(actual, expected, message);
            }
            ProtocolMessage::Print { message } => self.host.print(message),
            ProtocolMessage::Done { completion } => self.completion = Some(completion),
        }
        Ok(())
    }
}

impl ShellEngine {
    fn scratch_path(&self, unit: &ScriptUnit) -> PathBuf {
        let sequence = SCRATCH_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let stem: String = unit
            .fixture_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        self.factory.scratch_dir.join(format!(
            "franken-harness-{}-{sequence}-{stem}.js",
            std::process::id()
        ))
    }

    fn io_error(&self, source: std::io::Error) -> EngineError {
        EngineError::Io {
            engine_id: self.factory.engine_id.clone(),
            source,
        }
    }

    fn spawn(&self, script_path: &Path) -> Result<Child, EngineError> {
        Command::new(&self.factory.command)
            .args(&self.factory.args)
            .arg(script_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| EngineError::Spawn {
                engine_id: self.factory.engine_id.clone(),
                command: self.factory.command.clone(),
                source,
            })
    }

    fn run_child(
        &self,
        script_path: &Path,
        host: &mut FixtureHost,
        budget: &ExecutionBudget,
    ) -> Result<Completion, EngineError> {
        let engine_id = self.factory.engine_id.as_str();
        let mut child = self.spawn(script_path)?;

        let stdout = child.stdout.take();
        let (line_tx, line_rx) = mpsc::channel::<String>();
        if let Some(stdout) = stdout {
            thread::spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    let Ok(line) = line else { break };
                    if line_tx.send(line).is_err() {
                        break;
                    }
                }
            });
        }
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut text = String::new();
                let _ = stderr.read_to_string(&mut text);
                text
            })
        });

        let mut session = ProtocolSession {
            engine_id,
            host,
            pending: Vec::new(),
            completion: None,
            line_no: 0,
        };

        loop {
            if budget.is_exhausted() {
                let _ = child.kill();
                let _ = child.wait();
                return Err(budget.interrupted(engine_id));
            }
            match line_rx.recv_timeout(POLL_INTERVAL.min(budget.remaining())) {
                Ok(line) => {
                    if let Err(err) = session.accept(&line) {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(err);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let status = loop {
            if let Some(status) = child.try_wait().map_err(|err| self.io_error(err))? {
                break status;
            }
            if budget.is_exhausted() {
                let _ = child.kill();
                let _ = child.wait();
                return Err(budget.interrupted(engine_id));
            }
            thread::sleep(POLL_INTERVAL.min(budget.remaining()));
        };

        let stderr_text = stderr_reader
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();
        for line in stderr_text.lines().filter(|line| !line.trim().is_empty()) {
            session.host.print(line);
        }

        Ok(session
            .completion
            .take()
            .unwrap_or_else(|| Completion::Thrown(uncaught_payload(&stderr_text, status))))
    }
}

/// The shell printed no completion marker: the script threw. Shells put
/// the exception line (`TypeError: ...`) somewhere in their crash report,
/// often followed by a stack and a version banner; that line is the
/// closest thing to the thrown value we can observe.
fn uncaught_payload(stderr_text: &str, status: ExitStatus) -> JsValue {
    let lines = || stderr_text.lines().map(str::trim).filter(|line| !line.is_empty());
    lines()
        .find_map(exception_line)
        .or_else(|| lines().last())
        .map(JsValue::string)
        .unwrap_or_else(|| JsValue::string(format!("shell exited with {status}")))
}

/// `file.js:3: ReferenceError: x` or `Uncaught TypeError: y` yields the
/// text from the error name on.
fn exception_line(line: &str) -> Option<&str> {
    let mut offset = 0;
    for word in line.split(' ') {
        let name = word.strip_suffix(':').unwrap_or_default();
        let is_error_name = (name.ends_with("Error") || name.ends_with("Exception"))
            && name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if is_error_name {
            return Some(&line[offset..]);
        }
        offset += word.len() + 1;
    }
    None
}

impl EvaluationEngine for ShellEngine {
    fn engine_id(&self) -> &str {
        &self.factory.engine_id
    }

    fn evaluate(
        &mut self,
        unit: &ScriptUnit,
        host: &mut FixtureHost,
        budget: &ExecutionBudget,
    ) -> Result<Completion, EngineError> {
        let script_path = self.scratch_path(unit);
        fs::write(&script_path, compose_script(unit)).map_err(|err| self.io_error(err))?;
        let result = self.run_child(&script_path, host, budget);
        let _ = fs::remove_file(&script_path);
        result
    }
}
