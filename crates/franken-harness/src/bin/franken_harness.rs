use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use frankenengine_harness::config::HarnessConfig;
use frankenengine_harness::error::AssertionError;
use frankenengine_harness::evidence::HarnessEvidenceCollector;
use frankenengine_harness::loader::ScriptLoader;
use frankenengine_harness::outcome::ExecutionOutcome;
use frankenengine_harness::runner::{BatchRun, CancellationToken, TestRunner};
use frankenengine_harness::selection::expand_selection;
use frankenengine_harness::shell_engine::ShellEngineFactory;

const EXIT_USAGE: u8 = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct CliArgs {
    fixtures: Vec<String>,
    config_path: Option<PathBuf>,
    timeout_ms: Option<u64>,
    stop_on_first_failure: bool,
    engine: Option<String>,
    engine_args: Vec<String>,
    include_root: Option<PathBuf>,
    worker_count: Option<usize>,
    output_root: Option<PathBuf>,
    trace_prefix: Option<String>,
    policy_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Invocation {
    Help,
    Run(CliArgs),
}

fn usage() -> &'static str {
    "usage: franken_harness run <fixture-path-or-glob>... [--timeout=<ms>] [--stop-on-first-failure] [--config <path>] [--engine <command>] [--engine-arg <arg>]... [--include-root <dir>] [--workers <n>] [--output-root <dir>] [--trace-prefix <prefix>] [--policy-id <id>]"
}

fn parse_args<I>(raw: I) -> Result<Invocation, String>
where
    I: IntoIterator<Item = String>,
{
    let mut args = raw.into_iter();
    match args.next().as_deref() {
        Some("run") => {}
        Some("--help" | "-h" | "help") => return Ok(Invocation::Help),
        Some(other) => {
            return Err(format!(
                "unknown command: {other}. {usage}",
                usage = usage()
            ));
        }
        None => return Err(usage().to_string()),
    }

    let mut cli = CliArgs::default();
    while let Some(arg) = args.next() {
        if !arg.starts_with("--") {
            cli.fixtures.push(arg);
            continue;
        }
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
            None => (arg.clone(), None),
        };
        let mut value = |name: &str| -> Result<String, String> {
            inline
                .clone()
                .or_else(|| args.next())
                .ok_or_else(|| format!("{name} requires a value"))
        };

        match flag.as_str() {
            "--timeout" => {
                cli.timeout_ms = Some(
                    value("--timeout")?
                        .parse::<u64>()
                        .map_err(|_| "--timeout must be a positive integer".to_string())?,
                );
            }
            "--stop-on-first-failure" => {
                if inline.is_some() {
                    return Err("--stop-on-first-failure takes no value".to_string());
                }
                cli.stop_on_first_failure = true;
            }
            "--config" => cli.config_path = Some(PathBuf::from(value("--config")?)),
            "--engine" => cli.engine = Some(value("--engine")?),
            "--engine-arg" => cli.engine_args.push(value("--engine-arg")?),
            "--include-root" => cli.include_root = Some(PathBuf::from(value("--include-root")?)),
            "--workers" => {
                cli.worker_count = Some(
                    value("--workers")?
                        .parse::<usize>()
                        .map_err(|_| "--workers must be a positive integer".to_string())?,
                );
            }
            "--output-root" => cli.output_root = Some(PathBuf::from(value("--output-root")?)),
            "--trace-prefix" => cli.trace_prefix = Some(value("--trace-prefix")?),
            "--policy-id" => cli.policy_id = Some(value("--policy-id")?),
            "--help" | "-h" => return Ok(Invocation::Help),
            other => {
                return Err(format!(
                    "unknown argument: {other}. {usage}",
                    usage = usage()
                ));
            }
        }
    }

    if cli.fixtures.is_empty() {
        return Err(format!("no fixtures given. {usage}", usage = usage()));
    }
    Ok(Invocation::Run(cli))
}

/// File values first, then CLI flags on top.
fn resolve_config(cli: &CliArgs) -> Result<HarnessConfig> {
    let mut config = match cli.config_path.as_ref() {
        Some(path) => HarnessConfig::load_toml(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => HarnessConfig::default(),
    };

    if let Some(timeout_ms) = cli.timeout_ms {
        config.runner.timeout_ms = timeout_ms;
    }
    if cli.stop_on_first_failure {
        config.runner.stop_on_first_failure = true;
    }
    if let Some(engine) = cli.engine.as_ref() {
        config.engine_command = Some(engine.clone());
        config.engine_args = cli.engine_args.clone();
    } else if !cli.engine_args.is_empty() {
        config.engine_args.extend(cli.engine_args.iter().cloned());
    }
    if let Some(root) = cli.include_root.as_ref() {
        config.include_root = root.clone();
    }
    if let Some(workers) = cli.worker_count {
        config.runner.worker_count = workers;
    }
    if let Some(root) = cli.output_root.as_ref() {
        config.output_root = Some(root.clone());
    }
    if let Some(prefix) = cli.trace_prefix.as_ref() {
        config.runner.trace_prefix = prefix.clone();
    }
    if let Some(policy_id) = cli.policy_id.as_ref() {
        config.runner.policy_id = policy_id.clone();
    }

    config.validate()?;
    Ok(config)
}

fn report_outcome(outcome: &ExecutionOutcome) {
    let status = outcome.status.as_str().to_ascii_uppercase();
    match outcome.error_code() {
        Some(code) => println!(
            "{status} {} [{code}] ({}us)",
            outcome.fixture_id, outcome.duration_us
        ),
        None => println!("{status} {} ({}us)", outcome.fixture_id, outcome.duration_us),
    }
    if outcome.is_pass() {
        return;
    }

    for record in outcome.failures() {
        let failure = AssertionError {
            kind: record.kind,
            expected: record.expected.clone(),
            observed: record.observed.clone(),
            message: record.message.clone(),
        };
        eprintln!("  {}: #{} {failure}", outcome.fixture_id, record.index);
    }
    for checkpoint in outcome
        .compare_checkpoints
        .iter()
        .filter(|checkpoint| !checkpoint.matched)
    {
        eprintln!(
            "  {}: reportCompare mismatch: {} !== {}",
            outcome.fixture_id, checkpoint.actual, checkpoint.expected
        );
    }
    if let Some(error) = outcome.error.as_ref() {
        eprintln!("  {}: {}", outcome.fixture_id, error.detail);
    }
    for line in &outcome.diagnostics {
        eprintln!("  {}: | {line}", outcome.fixture_id);
    }
}

fn report_summary(run: &BatchRun) {
    println!("harness run_id={}", run.run_id);
    println!("harness engine={}", run.summary.engine_id);
    println!("harness total={}", run.summary.total);
    println!("harness passed={}", run.summary.passed);
    println!("harness failed={}", run.summary.failed);
    println!("harness errored={}", run.summary.errored);
    println!("harness timed_out={}", run.summary.timed_out);
    println!("harness skipped={}", run.summary.skipped);
}

fn run(cli: CliArgs) -> Result<u8> {
    let config = resolve_config(&cli)?;
    let paths = expand_selection(&cli.fixtures)?;

    let command = config
        .engine_command
        .clone()
        .context("engine command is required")?;
    let mut factory = ShellEngineFactory::new(command).with_args(config.engine_args.clone());
    if let Some(dir) = config.scratch_dir.as_ref() {
        factory = factory.with_scratch_dir(dir);
    }

    let mut loader = ScriptLoader::new(&config.include_root)
        .with_default_includes(config.default_includes.clone());
    if let Some(root) = config.fixture_root.as_ref() {
        loader = loader.with_fixture_root(root);
    }

    let runner = TestRunner::new(factory, loader, config.runner.clone());
    let run = runner.run_batch(&paths, &CancellationToken::new())?;

    for outcome in &run.outcomes {
        report_outcome(outcome);
    }
    report_summary(&run);

    if let Some(output_root) = config.output_root.as_ref() {
        let collector = HarnessEvidenceCollector::new(output_root)
            .with_context(|| format!("creating evidence root {}", output_root.display()))?;
        let artifacts = collector
            .collect(&run, &config.runner)
            .context("writing harness evidence")?;
        println!(
            "harness run_manifest={}",
            artifacts.run_manifest_path.display()
        );
        println!("harness evidence={}", artifacts.evidence_path.display());
    }

    Ok(run.exit_code())
}

fn main() -> ExitCode {
    let cli = match parse_args(std::env::args().skip(1)) {
        Ok(Invocation::Help) => {
            println!("{}", usage());
            return ExitCode::SUCCESS;
        }
        Ok(Invocation::Run(cli)) => cli,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("franken_harness: {err:#}");
            ExitCode::from(EXIT_USAGE)
        }
    }
}
