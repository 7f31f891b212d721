//! Turns a fixture path into a [`Fixture`] and an executable [`ScriptUnit`].

use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::digest::sha256_hex;
use crate::error::LoadError;
use crate::host::{HOST_BINDINGS, HostBinding};
use crate::metadata::{FixtureMetadata, Strictness, parse_fixture_metadata};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludeScript {
    pub name: String,
    pub path: PathBuf,
    pub source: String,
}

/// A loaded fixture. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fixture {
    pub id: String,
    pub path: PathBuf,
    pub source: String,
    pub source_hash: String,
    pub metadata: FixtureMetadata,
    /// Resolved in evaluation order, each name at most once.
    pub includes: Vec<IncludeScript>,
    pub strictness: Strictness,
}

impl Fixture {
    pub fn unit(&self) -> ScriptUnit {
        ScriptUnit {
            fixture_id: self.id.clone(),
            strictness: self.strictness,
            includes: self
                .includes
                .iter()
                .map(|include| ScriptSource {
                    name: include.name.clone(),
                    text: include.source.clone(),
                })
                .collect(),
            body: ScriptSource {
                name: self.id.clone(),
                text: self.source.clone(),
            },
            bindings: HOST_BINDINGS.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptSource {
    pub name: String,
    pub text: String,
}

/// What an engine evaluates for one fixture: includes in order, then the
/// body, with `bindings` installed as globals beforehand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptUnit {
    pub fixture_id: String,
    pub strictness: Strictness,
    pub includes: Vec<ScriptSource>,
    pub body: ScriptSource,
    pub bindings: Vec<HostBinding>,
}

impl ScriptUnit {
    /// Every source in evaluation order.
    pub fn sources(&self) -> impl Iterator<Item = &ScriptSource> {
        self.includes.iter().chain(std::iter::once(&self.body))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScriptLoader {
    include_root: PathBuf,
    default_includes: Vec<String>,
    fixture_root: Option<PathBuf>,
}

impl ScriptLoader {
    pub fn new(include_root: impl Into<PathBuf>) -> Self {
        Self {
            include_root: include_root.into(),
            default_includes: Vec::new(),
            fixture_root: None,
        }
    }

    /// Includes evaluated before every non-`raw` fixture's own includes.
    pub fn with_default_includes(mut self, includes: Vec<String>) -> Self {
        self.default_includes = includes;
        self
    }

    /// Fixture ids are made relative to this directory.
    pub fn with_fixture_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.fixture_root = Some(root.into());
        self
    }

    pub fn include_root(&self) -> &Path {
        &self.include_root
    }

    pub fn load(&self, path: impl AsRef<Path>) -> Result<Fixture, LoadError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| LoadError::FixtureIo {
            path: path.to_path_buf(),
            source,
        })?;
        let metadata = parse_fixture_metadata(&source).map_err(|source| LoadError::Metadata {
            path: path.to_path_buf(),
            source,
        })?;
        let strictness = metadata.strictness().map_err(|source| LoadError::Metadata {
            path: path.to_path_buf(),
            source,
        })?;

        let mut names: Vec<&str> = Vec::new();
        if !metadata.is_raw() {
            names.extend(self.default_includes.iter().map(String::as_str));
        }
        names.extend(metadata.includes.iter().map(String::as_str));

        let mut seen = BTreeSet::new();
        let mut includes = Vec::with_capacity(names.len());
        for name in names {
            if !seen.insert(name) {
                continue;
            }
            includes.push(self.read_include(path, name)?);
        }

        Ok(Fixture {
            id: self.fixture_id(path),
            path: path.to_path_buf(),
            source_hash: sha256_hex(source.as_bytes()),
            source,
            metadata,
            includes,
            strictness,
        })
    }

    fn read_include(&self, fixture: &Path, name: &str) -> Result<IncludeScript, LoadError> {
        let relative = Path::new(name);
        let escapes = name.trim().is_empty()
            || relative
                .components()
                .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(LoadError::IncludeOutsideRoot {
                fixture: fixture.to_path_buf(),
                name: name.to_string(),
            });
        }

        let include_path = self.include_root.join(relative);
        let source = fs::read_to_string(&include_path).map_err(|source| LoadError::IncludeIo {
            fixture: fixture.to_path_buf(),
            name: name.to_string(),
            path: include_path.clone(),
            source,
        })?;
        Ok(IncludeScript {
            name: name.to_string(),
            path: include_path,
            source,
        })
    }

    /// `/`-separated path, relative to the fixture root when it applies.
    pub fn fixture_id(&self, path: &Path) -> String {
        let relative = self
            .fixture_root
            .as_deref()
            .and_then(|root| path.strip_prefix(root).ok())
            .unwrap_or(path);
        relative
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}
