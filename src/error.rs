//! Error taxonomy for the rendering bridge.
//!
//! Everything here is deterministic given the same inputs, so nothing is
//! retried automatically. Compile and runtime failures are fatal to the
//! single render that triggered them; the cache never serves stale code in
//! their place.

use std::path::PathBuf;

use thiserror::Error;

use crate::compiler::CompileTarget;

/// A failure reported by the external component compiler, normalized to a
/// stable shape (message plus source location when the compiler provides
/// one).
#[derive(Debug, Clone, Error)]
#[error("{target} compile of `{identity}` failed: {message}{}", location_suffix(.line, .column))]
pub struct CompileError {
    pub identity: String,
    pub target: CompileTarget,
    pub message: String,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

fn location_suffix(line: &Option<u32>, column: &Option<u32>) -> String {
    match (line, column) {
        (Some(l), Some(c)) => format!(" (line {l}, column {c})"),
        (Some(l), None) => format!(" (line {l})"),
        _ => String::new(),
    }
}

/// A script error raised while executing an artifact in the sandbox.
/// Carries the V8 stack when one is available; production output hides it.
#[derive(Debug, Clone, Error)]
#[error("sandbox execution failed: {message}")]
pub struct RuntimeError {
    pub message: String,
    pub stack: Option<String>,
}

/// Everything that can end a render.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("component source not found: {path}")]
    SourceNotFound { path: PathBuf },

    #[error("could not read component source {path}: {source}")]
    SourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// The generated code expected a context accessor the emulation layer
    /// does not install. This is an emulation/compiler version mismatch and
    /// is never papered over with a stub.
    #[error("generated code expects context accessor `{accessor}`, which the sandbox does not install")]
    MissingAccessor { accessor: String },

    /// Controller data was rejected at the context-separation boundary.
    #[error("render data rejected: {reason}")]
    DataRejected { reason: String },
}

impl RenderError {
    /// HTTP status this error maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            RenderError::SourceNotFound { .. } => 404,
            _ => 500,
        }
    }

    /// Full diagnostic text, for development mode and logs.
    pub fn diagnostic(&self) -> String {
        match self {
            RenderError::Runtime(err) => match &err.stack {
                Some(stack) => format!("{err}\n{stack}"),
                None => err.to_string(),
            },
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_error_includes_location() {
        let err = CompileError {
            identity: "home/index.svelte".into(),
            target: CompileTarget::Server,
            message: "unexpected token".into(),
            line: Some(4),
            column: Some(12),
        };
        let text = err.to_string();
        assert!(text.contains("home/index.svelte"));
        assert!(text.contains("line 4"));
        assert!(text.contains("column 12"));
    }

    #[test]
    fn test_runtime_diagnostic_appends_stack() {
        let err = RenderError::Runtime(RuntimeError {
            message: "x is undefined".into(),
            stack: Some("at render (<artifact>:3:1)".into()),
        });
        let diag = err.diagnostic();
        assert!(diag.contains("x is undefined"));
        assert!(diag.contains("<artifact>:3:1"));
    }

    #[test]
    fn test_status_codes() {
        let missing = RenderError::SourceNotFound {
            path: PathBuf::from("nope.svelte"),
        };
        assert_eq!(missing.status_code(), 404);
        let accessor = RenderError::MissingAccessor {
            accessor: "getStores".into(),
        };
        assert_eq!(accessor.status_code(), 500);
    }
}
