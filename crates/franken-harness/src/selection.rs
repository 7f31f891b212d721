//! Expands CLI fixture arguments (files, directories, `*` / `**` globs)
//! into an ordered list of fixture paths.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use glob::MatchOptions;
use walkdir::WalkDir;

use crate::error::HarnessError;

const FIXTURE_EXTENSION: &str = "js";

/// `*` and `?` stop at `/`; only `**` crosses directories.
const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Each argument expands in sorted order; arguments keep the order given.
/// A path selected twice is kept at its first position.
pub fn expand_selection<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<PathBuf>, HarnessError> {
    let mut seen = BTreeSet::new();
    let mut selected = Vec::new();
    for pattern in patterns {
        for path in expand_pattern(pattern.as_ref())? {
            let path = normalize(&path);
            if seen.insert(path.clone()) {
                selected.push(path);
            }
        }
    }
    Ok(selected)
}

fn expand_pattern(pattern: &str) -> Result<Vec<PathBuf>, HarnessError> {
    let selection_error = |detail: String| HarnessError::Selection {
        pattern: pattern.to_string(),
        detail,
    };

    if pattern.trim().is_empty() {
        return Err(selection_error("empty fixture argument".to_string()));
    }

    if !is_glob(pattern) {
        let path = PathBuf::from(pattern);
        if path.is_dir() {
            let found = walk_files(&path)
                .into_iter()
                .filter(|file| has_fixture_extension(file))
                .collect::<Vec<_>>();
            if found.is_empty() {
                return Err(selection_error(
                    "directory contains no .js fixtures".to_string(),
                ));
            }
            return Ok(found);
        }
        if path.is_file() {
            return Ok(vec![path]);
        }
        return Err(selection_error(
            "no such fixture file or directory".to_string(),
        ));
    }

    let paths = glob::glob_with(pattern, GLOB_OPTIONS)
        .map_err(|err| selection_error(format!("invalid glob: {err}")))?;
    let mut found: Vec<PathBuf> = paths
        .filter_map(Result::ok)
        .filter(|path| path.is_file())
        .collect();
    found.sort();
    if found.is_empty() {
        return Err(selection_error("glob matched no fixtures".to_string()));
    }
    Ok(found)
}

fn walk_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}

fn has_fixture_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(FIXTURE_EXTENSION))
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Drops `.` components so `./a/b.js` and `a/b.js` name one fixture.
fn normalize(path: &Path) -> PathBuf {
    let normalized: PathBuf = path
        .components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect();
    if normalized.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        normalized
    }
}
