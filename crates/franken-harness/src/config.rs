//! Runner settings and the `harness.toml` file they can be loaded from.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::HarnessError;

pub const HARNESS_CONFIG_SCHEMA: &str = "franken-harness.config.v1";

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub trace_prefix: String,
    pub policy_id: String,
    pub run_date: String,
    pub worker_count: usize,
    pub timeout_ms: u64,
    pub stop_on_first_failure: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            trace_prefix: "trace-harness".to_string(),
            policy_id: "policy-harness-default".to_string(),
            run_date: Utc::now().format("%Y-%m-%d").to_string(),
            worker_count: thread::available_parallelism()
                .map(|count| count.get())
                .unwrap_or(1),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            stop_on_first_failure: false,
        }
    }
}

impl RunnerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.trace_prefix.trim().is_empty() {
            return Err(HarnessError::InvalidConfig(
                "trace_prefix is required".to_string(),
            ));
        }
        if self.policy_id.trim().is_empty() {
            return Err(HarnessError::InvalidConfig(
                "policy_id is required".to_string(),
            ));
        }
        if !looks_like_yyyy_mm_dd(self.run_date.as_str()) {
            return Err(HarnessError::InvalidConfig(
                "run_date must be YYYY-MM-DD".to_string(),
            ));
        }
        if self.worker_count == 0 {
            return Err(HarnessError::InvalidConfig(
                "worker_count must be >= 1".to_string(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(HarnessError::InvalidConfig(
                "timeout_ms must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Everything a CLI run needs besides the fixture selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessConfig {
    pub runner: RunnerConfig,
    pub engine_command: Option<String>,
    pub engine_args: Vec<String>,
    pub scratch_dir: Option<PathBuf>,
    pub include_root: PathBuf,
    pub default_includes: Vec<String>,
    /// Fixture ids are reported relative to this directory when set.
    pub fixture_root: Option<PathBuf>,
    pub output_root: Option<PathBuf>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            runner: RunnerConfig::default(),
            engine_command: None,
            engine_args: Vec::new(),
            scratch_dir: None,
            include_root: PathBuf::from("harness"),
            default_includes: Vec::new(),
            fixture_root: None,
            output_root: None,
        }
    }
}

impl HarnessConfig {
    /// Relative paths in the file are resolved against its directory.
    pub fn load_toml(path: impl AsRef<Path>) -> Result<Self, HarnessError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let base = path.parent().unwrap_or(Path::new(""));
        parse_harness_toml(&content, base, path)
    }

    pub fn validate(&self) -> Result<(), HarnessError> {
        self.runner.validate()?;
        match self.engine_command.as_deref() {
            Some(command) if !command.trim().is_empty() => {}
            _ => {
                return Err(HarnessError::InvalidConfig(
                    "engine command is required".to_string(),
                ));
            }
        }
        for name in &self.default_includes {
            if name.trim().is_empty() {
                return Err(HarnessError::InvalidConfig(
                    "default_includes entries must be non-empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// On-disk shape of `harness.toml`. Absent keys keep their defaults.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HarnessConfigFile {
    schema_version: String,
    #[serde(default)]
    runner: RunnerSection,
    #[serde(default)]
    engine: EngineSection,
    #[serde(default)]
    fixtures: FixturesSection,
    #[serde(default)]
    evidence: EvidenceSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RunnerSection {
    trace_prefix: Option<String>,
    policy_id: Option<String>,
    run_date: Option<String>,
    worker_count: Option<usize>,
    timeout_ms: Option<u64>,
    stop_on_first_failure: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct EngineSection {
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    scratch_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FixturesSection {
    include_root: Option<PathBuf>,
    #[serde(default)]
    default_includes: Vec<String>,
    root: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct EvidenceSection {
    output_root: Option<PathBuf>,
}

impl HarnessConfigFile {
    fn into_config(self, base: &Path) -> Result<HarnessConfig, HarnessError> {
        if self.schema_version != HARNESS_CONFIG_SCHEMA {
            return Err(HarnessError::InvalidConfig(format!(
                "schema_version `{}` (expected `{HARNESS_CONFIG_SCHEMA}`)",
                self.schema_version
            )));
        }

        let resolve = |path: PathBuf| -> PathBuf {
            if path.is_absolute() {
                path
            } else {
                base.join(path)
            }
        };

        let mut runner = RunnerConfig::default();
        let section = self.runner;
        if let Some(trace_prefix) = section.trace_prefix {
            runner.trace_prefix = trace_prefix;
        }
        if let Some(policy_id) = section.policy_id {
            runner.policy_id = policy_id;
        }
        if let Some(run_date) = section.run_date {
            runner.run_date = run_date;
        }
        if let Some(worker_count) = section.worker_count {
            runner.worker_count = worker_count;
        }
        if let Some(timeout_ms) = section.timeout_ms {
            runner.timeout_ms = timeout_ms;
        }
        if let Some(stop) = section.stop_on_first_failure {
            runner.stop_on_first_failure = stop;
        }

        Ok(HarnessConfig {
            runner,
            engine_command: self.engine.command,
            engine_args: self.engine.args,
            scratch_dir: self.engine.scratch_dir.map(resolve),
            include_root: resolve(
                self.fixtures
                    .include_root
                    .unwrap_or_else(|| PathBuf::from("harness")),
            ),
            default_includes: self.fixtures.default_includes,
            fixture_root: self.fixtures.root.map(resolve),
            output_root: self.evidence.output_root.map(resolve),
        })
    }
}

fn parse_harness_toml(
    content: &str,
    base: &Path,
    path: &Path,
) -> Result<HarnessConfig, HarnessError> {
    let file =
        toml::from_str::<HarnessConfigFile>(content).map_err(|err| HarnessError::ConfigSyntax {
            path: path.to_path_buf(),
            line: err
                .span()
                .map(|span| line_of(content, span.start))
                .unwrap_or(1),
            detail: err.message().to_string(),
        })?;
    file.into_config(base)
}

fn line_of(content: &str, offset: usize) -> usize {
    let end = offset.min(content.len());
    content.as_bytes()[..end]
        .iter()
        .filter(|byte| **byte == b'\n')
        .count()
        + 1
}

fn looks_like_yyyy_mm_dd(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() != 10 {
        return false;
    }
    bytes[0..4].iter().all(|b| b.is_ascii_digit())
        && bytes[4] == b'-'
        && bytes[5..7].iter().all(|b| b.is_ascii_digit())
        && bytes[7] == b'-'
        && bytes[8..10].iter().all(|b| b.is_ascii_digit())
}
