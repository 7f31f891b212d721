use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metadata::MetadataError;
use crate::value::{Completion, JsValue};

pub const FE_HARNESS_INVALID_CONFIG: &str = "FE-HARNESS-1001";
pub const FE_HARNESS_SELECTION: &str = "FE-HARNESS-1002";
pub const FE_HARNESS_LOAD: &str = "FE-HARNESS-2001";
pub const FE_HARNESS_INCLUDE: &str = "FE-HARNESS-2002";
pub const FE_HARNESS_METADATA: &str = "FE-HARNESS-2003";
pub const FE_HARNESS_ASSERTION: &str = "FE-HARNESS-2101";
pub const FE_HARNESS_COMPARE_MISMATCH: &str = "FE-HARNESS-2102";
pub const FE_HARNESS_UNCAUGHT: &str = "FE-HARNESS-2201";
pub const FE_HARNESS_TIMEOUT: &str = "FE-HARNESS-2301";
pub const FE_HARNESS_ENGINE: &str = "FE-HARNESS-2401";
pub const FE_HARNESS_ENGINE_CRASH: &str = "FE-HARNESS-2402";

/// Failure to turn a fixture file into an executable unit. Fatal to that
/// fixture only.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read fixture `{}`: {source}", .path.display())]
    FixtureIo { path: PathBuf, source: io::Error },
    #[error("failed to read include `{name}` for `{}` at {}: {source}", .fixture.display(), .path.display())]
    IncludeIo {
        fixture: PathBuf,
        name: String,
        path: PathBuf,
        source: io::Error,
    },
    #[error("include `{name}` of `{}` escapes the include root", .fixture.display())]
    IncludeOutsideRoot { fixture: PathBuf, name: String },
    #[error("malformed metadata in `{}`: {source}", .path.display())]
    Metadata {
        path: PathBuf,
        source: MetadataError,
    },
}

impl LoadError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::FixtureIo { .. } => FE_HARNESS_LOAD,
            Self::IncludeIo { .. } | Self::IncludeOutsideRoot { .. } => FE_HARNESS_INCLUDE,
            Self::Metadata { .. } => FE_HARNESS_METADATA,
        }
    }
}

/// The engine itself failed, as opposed to the script throwing.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine `{engine_id}` could not be created: {detail}")]
    Create { engine_id: String, detail: String },
    #[error("engine `{engine_id}` failed to spawn `{command}`: {source}")]
    Spawn {
        engine_id: String,
        command: String,
        source: io::Error,
    },
    #[error("engine `{engine_id}` I/O failure: {source}")]
    Io {
        engine_id: String,
        source: io::Error,
    },
    #[error("engine `{engine_id}` protocol violation on output line {line}: {detail}")]
    Protocol {
        engine_id: String,
        line: usize,
        detail: String,
    },
    /// The execution budget ran out or the run was interrupted.
    #[error("engine `{engine_id}` interrupted after {elapsed_ms}ms")]
    Interrupted { engine_id: String, elapsed_ms: u64 },
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Interrupted { .. } => FE_HARNESS_TIMEOUT,
            _ => FE_HARNESS_ENGINE,
        }
    }
}

/// Configuration, selection or CLI failure; aborts the whole invocation.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("invalid harness config: {0}")]
    InvalidConfig(String),
    #[error("invalid config file `{}` line {line}: {detail}", .path.display())]
    ConfigSyntax {
        path: PathBuf,
        line: usize,
        detail: String,
    },
    #[error("fixture selection `{pattern}` failed: {detail}")]
    Selection { pattern: String, detail: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl HarnessError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Selection { .. } => FE_HARNESS_SELECTION,
            _ => FE_HARNESS_INVALID_CONFIG,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertionKind {
    SameValue,
    ThrowsValue,
}

impl AssertionKind {
    pub fn binding_name(self) -> &'static str {
        match self {
            Self::SameValue => "assert.sameValue",
            Self::ThrowsValue => "assertThrowsValue",
        }
    }
}

/// Expectation mismatch raised by the assertion library. Recorded in the
/// outcome; does not stop the script.
#[derive(Debug, Clone, PartialEq)]
pub struct AssertionError {
    pub kind: AssertionKind,
    pub expected: JsValue,
    pub observed: Completion,
    pub message: Option<String>,
}

impl fmt::Display for AssertionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: ", self.kind.binding_name())?;
        match (self.kind, &self.observed) {
            (AssertionKind::SameValue, observed) => write!(
                f,
                "expected SameValue({}, {})",
                observed.value(),
                self.expected
            )?,
            (AssertionKind::ThrowsValue, Completion::Normal(value)) => write!(
                f,
                "expected thunk to throw {} but it returned {value}",
                self.expected
            )?,
            (AssertionKind::ThrowsValue, Completion::Thrown(value)) => write!(
                f,
                "expected thunk to throw {} but it threw {value}",
                self.expected
            )?,
        }
        if let Some(message) = &self.message {
            write!(f, " ({message})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AssertionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_error_codes_are_stable() {
        let err = LoadError::IncludeOutsideRoot {
            fixture: PathBuf::from("a.js"),
            name: "../x.js".to_string(),
        };
        assert_eq!(err.code(), FE_HARNESS_INCLUDE);
        assert!(err.to_string().contains("escapes the include root"));
    }

    #[test]
    fn interrupted_engine_maps_to_timeout_code() {
        let err = EngineError::Interrupted {
            engine_id: "shell:node".to_string(),
            elapsed_ms: 10,
        };
        assert_eq!(err.code(), FE_HARNESS_TIMEOUT);
    }

    #[test]
    fn assertion_error_display_names_both_values() {
        let err = AssertionError {
            kind: AssertionKind::SameValue,
            expected: JsValue::number(-0.0),
            observed: Completion::Normal(JsValue::number(0.0)),
            message: Some("zero sign".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "assert.sameValue failed: expected SameValue(0, -0) (zero sign)"
        );
    }

    #[test]
    fn throws_value_display_distinguishes_return_and_throw() {
        let returned = AssertionError {
            kind: AssertionKind::ThrowsValue,
            expected: JsValue::number(42.0),
            observed: Completion::Normal(JsValue::Undefined),
            message: None,
        };
        assert!(returned.to_string().contains("it returned undefined"));

        let thrown = AssertionError {
            observed: Completion::Thrown(JsValue::number(17.0)),
            ..returned
        };
        assert!(thrown.to_string().contains("it threw 17"));
    }
}
