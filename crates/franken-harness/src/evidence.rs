use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::RunnerConfig;
use crate::runner::{BatchRun, BatchSummary};

pub const HARNESS_MANIFEST_SCHEMA: &str = "franken-harness.run-manifest.v1";
pub const HARNESS_EVIDENCE_SCHEMA: &str = "franken-harness.evidence.v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunManifest {
    pub schema_version: String,
    pub run_id: String,
    pub generated_at_utc: String,
    pub config: RunnerConfig,
    pub summary: BatchSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessCollectedArtifacts {
    pub run_manifest_path: PathBuf,
    pub evidence_path: PathBuf,
    pub outcomes_path: PathBuf,
}

/// Writes one directory per run under `root`:
/// `run_manifest.json`, `harness_evidence.jsonl` (summary line, then one
/// log event per fixture) and `fixture_outcomes.jsonl`.
#[derive(Debug, Clone)]
pub struct HarnessEvidenceCollector {
    root: PathBuf,
}

impl HarnessEvidenceCollector {
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn collect(
        &self,
        run: &BatchRun,
        config: &RunnerConfig,
    ) -> io::Result<HarnessCollectedArtifacts> {
        let run_root = self.root.join(&run.run_id);
        fs::create_dir_all(&run_root)?;

        let manifest = RunManifest {
            schema_version: HARNESS_MANIFEST_SCHEMA.to_string(),
            run_id: run.run_id.clone(),
            generated_at_utc: Utc::now().to_rfc3339(),
            config: config.clone(),
            summary: run.summary.clone(),
        };
        let run_manifest_path = run_root.join("run_manifest.json");
        write_atomic(&run_manifest_path, &canonical_json_bytes(&manifest)?)?;

        let mut evidence_lines = String::new();
        push_json_line(
            &mut evidence_lines,
            &serde_json::json!({
                "schema_version": HARNESS_EVIDENCE_SCHEMA,
                "run_manifest": "run_manifest.json",
                "run_id": run.run_id,
                "engine_id": run.summary.engine_id,
                "total": run.summary.total,
                "executed": run.summary.executed,
                "passed": run.summary.passed,
                "failed": run.summary.failed,
                "errored": run.summary.errored,
                "timed_out": run.summary.timed_out,
                "skipped": run.summary.skipped,
                "fixture_set_hash": run.summary.fixture_set_hash,
            }),
        )?;
        for event in &run.logs {
            push_json_line(&mut evidence_lines, event)?;
        }
        let evidence_path = run_root.join("harness_evidence.jsonl");
        write_atomic(&evidence_path, evidence_lines.as_bytes())?;

        let mut outcome_lines = String::new();
        for outcome in &run.outcomes {
            push_json_line(&mut outcome_lines, outcome)?;
        }
        let outcomes_path = run_root.join("fixture_outcomes.jsonl");
        write_atomic(&outcomes_path, outcome_lines.as_bytes())?;

        Ok(HarnessCollectedArtifacts {
            run_manifest_path,
            evidence_path,
            outcomes_path,
        })
    }
}

fn push_json_line<T: Serialize>(out: &mut String, value: &T) -> io::Result<()> {
    let line = serde_json::to_string(value)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    out.push_str(&line);
    out.push('\n');
    Ok(())
}

fn canonical_json_bytes<T: Serialize>(value: &T) -> io::Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, bytes)?;
    fs::rename(temp_path, path)?;
    Ok(())
}
