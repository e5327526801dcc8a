//! Adapter over the external component compiler.
//!
//! The compiler itself is authoritative for parsing the component grammar,
//! building the reactive dependency graph, and emitting runnable code for a
//! target. This module's job is the trust boundary around it: marshal the
//! source across, translate its diagnostics into [`CompileError`], and
//! normalize its generated code into the shape the sandbox executes.
//!
//! Versioned output contract (the only thing the rest of the crate assumes
//! about generated code):
//!
//! - the artifact defines one constructor, `function Name($$payload, $$props)`
//!   for the server target or `function Name($$anchor, $$props)` for the
//!   client target;
//! - runtime imports appear as top-level `import` lines and are satisfied by
//!   the emulation layer (server) or the bundled client runtime (client), so
//!   normalization strips them;
//! - the compiler may tag the constructor with a private identity marker,
//!   `Name[$.FILENAME] = "path";`, which must be assigned on the constructor
//!   before invocation. Normalization strips the assignment and declares it
//!   as a [`MarkerRequirement`] so the prepare step can mirror it per target.
//!
//! A compiler upgrade that changes this shape is absorbed here and in
//! `server_shim.js`, not in the render pipeline.

use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::error::CompileError;

/// Which environment a compiled artifact runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompileTarget {
    /// Render-to-string on the server.
    Server,
    /// Hydrate-to-DOM in the browser.
    Client,
}

impl CompileTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            CompileTarget::Server => "server",
            CompileTarget::Client => "client",
        }
    }
}

impl std::fmt::Display for CompileTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw compiler output, before normalization.
#[derive(Debug, Clone)]
pub struct RawCompileOutput {
    pub code: String,
    pub style: String,
}

/// The identity-marker capability a generated artifact declares: `component`
/// must have `symbol` (a property on the runtime namespace) assigned to
/// `filename` before the constructor is invoked, or execution fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerRequirement {
    pub component: String,
    pub symbol: String,
    pub filename: String,
}

/// Generated code after normalization, ready for the sandbox or the
/// hydration bootstrap.
#[derive(Debug, Clone)]
pub struct NormalizedArtifact {
    pub code: String,
    pub style: String,
    pub component_name: String,
    pub marker: Option<MarkerRequirement>,
}

/// The subprocess (or test double) that actually runs the compiler.
pub trait CompilerBackend: Send + Sync {
    fn compile(
        &self,
        source: &str,
        identity: &str,
        target: CompileTarget,
        dev: bool,
    ) -> Result<RawCompileOutput, CompileError>;
}

/// Normalizes backend output; the one compile entry point for the cache.
pub struct CompilerAdapter {
    backend: Box<dyn CompilerBackend>,
}

impl CompilerAdapter {
    pub fn new(backend: Box<dyn CompilerBackend>) -> Self {
        Self { backend }
    }

    /// Compile `source` for `target`. Server and client requests are
    /// mutually independent; a failure in one target never blocks the
    /// other, so callers can degrade a page instead of dropping it.
    pub fn compile(
        &self,
        source: &str,
        identity: &str,
        target: CompileTarget,
        dev: bool,
    ) -> Result<NormalizedArtifact, CompileError> {
        let raw = self.backend.compile(source, identity, target, dev)?;
        normalize(raw, identity, target)
    }
}

static MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^\s*([A-Za-z_$][\w$]*)\[\$\.([A-Z_][A-Z0-9_]*)\]\s*=\s*['"]([^'"]+)['"];?\s*$"#)
        .expect("marker regex")
});
static IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*import\b[^\n]*$").expect("import regex"));
static EXPORT_DEFAULT_FN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"export\s+default\s+function\s+([A-Za-z_$][\w$]*)").expect("export fn regex")
});
static EXPORT_DEFAULT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*export\s+default\s+[A-Za-z_$][\w$]*;?\s*$").expect("export regex")
});
static FUNCTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"function\s+([A-Za-z_$][\w$]*)\s*\(").expect("function regex"));

/// Reduce generated code to a directly-evaluable form and extract what the
/// sandbox needs to know about it.
fn normalize(
    raw: RawCompileOutput,
    identity: &str,
    target: CompileTarget,
) -> Result<NormalizedArtifact, CompileError> {
    let mut code = raw.code;

    let marker = MARKER_RE.captures(&code).map(|caps| MarkerRequirement {
        component: caps[1].to_string(),
        symbol: caps[2].to_string(),
        filename: caps[3].to_string(),
    });
    if marker.is_some() {
        code = MARKER_RE.replace(&code, "").into_owned();
    }

    code = IMPORT_RE.replace_all(&code, "").into_owned();

    let exported_name = EXPORT_DEFAULT_FN_RE
        .captures(&code)
        .map(|caps| caps[1].to_string());
    code = EXPORT_DEFAULT_FN_RE
        .replace(&code, "function $1")
        .into_owned();
    code = EXPORT_DEFAULT_RE.replace_all(&code, "").into_owned();

    let component_name = marker
        .as_ref()
        .map(|m| m.component.clone())
        .or(exported_name)
        .or_else(|| FUNCTION_RE.captures(&code).map(|caps| caps[1].to_string()));

    let component_name = component_name.ok_or_else(|| CompileError {
        identity: identity.to_string(),
        target,
        message: "could not locate the component constructor in generated code".to_string(),
        line: None,
        column: None,
    })?;

    Ok(NormalizedArtifact {
        code,
        style: raw.style,
        component_name,
        marker,
    })
}

/// What the Node driver prints on stdout.
#[derive(Debug, Deserialize)]
struct DriverResponse {
    ok: bool,
    #[serde(default)]
    code: String,
    #[serde(default)]
    css: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    line: Option<u32>,
    #[serde(default)]
    column: Option<u32>,
}

const DRIVER_SCRIPT: &str = include_str!("compiler_driver.mjs");

/// Production backend: runs the real compiler through a Node.js driver
/// script. The driver is written next to the project so the compiler
/// package resolves from the project's own `node_modules`.
pub struct NodeBackend {
    node_command: String,
    project_root: PathBuf,
}

impl NodeBackend {
    pub fn new(node_command: impl Into<String>, project_root: impl Into<PathBuf>) -> Self {
        Self {
            node_command: node_command.into(),
            project_root: project_root.into(),
        }
    }

    fn error(
        &self,
        identity: &str,
        target: CompileTarget,
        message: impl Into<String>,
    ) -> CompileError {
        CompileError {
            identity: identity.to_string(),
            target,
            message: message.into(),
            line: None,
            column: None,
        }
    }
}

impl CompilerBackend for NodeBackend {
    fn compile(
        &self,
        source: &str,
        identity: &str,
        target: CompileTarget,
        dev: bool,
    ) -> Result<RawCompileOutput, CompileError> {
        let input = serde_json::json!({
            "source": source,
            "filename": identity,
            "target": target.as_str(),
            "dev": dev,
        });

        let mut driver = tempfile::Builder::new()
            .prefix("isomer-compile-")
            .suffix(".mjs")
            .tempfile_in(&self.project_root)
            .map_err(|e| self.error(identity, target, format!("could not stage driver: {e}")))?;
        driver
            .write_all(DRIVER_SCRIPT.as_bytes())
            .map_err(|e| self.error(identity, target, format!("could not stage driver: {e}")))?;

        let output = Command::new(&self.node_command)
            .arg(driver.path())
            .arg(input.to_string())
            .current_dir(&self.project_root)
            .output()
            .map_err(|e| {
                self.error(
                    identity,
                    target,
                    format!("failed to run `{}`: {e}", self.node_command),
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.error(
                identity,
                target,
                format!("compiler process exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let response: DriverResponse = serde_json::from_str(stdout.trim()).map_err(|e| {
            self.error(
                identity,
                target,
                format!("unparseable compiler response ({e}): {}", stdout.trim()),
            )
        })?;

        if !response.ok {
            return Err(CompileError {
                identity: identity.to_string(),
                target,
                message: response
                    .message
                    .unwrap_or_else(|| "unknown compiler error".to_string()),
                line: response.line,
                column: response.column,
            });
        }

        Ok(RawCompileOutput {
            code: response.code,
            style: response.css,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(code: &str) -> RawCompileOutput {
        RawCompileOutput {
            code: code.to_string(),
            style: String::new(),
        }
    }

    #[test]
    fn test_normalize_extracts_marker_requirement() {
        let code = "import * as $ from \"svelte/internal/server\";\n\
                    Counter[$.FILENAME] = \"home/index.svelte\";\n\
                    function Counter($$payload, $$props) {}\n\
                    export default Counter;\n";
        let artifact = normalize(raw(code), "home/index.svelte", CompileTarget::Server).unwrap();

        assert_eq!(artifact.component_name, "Counter");
        let marker = artifact.marker.expect("marker requirement");
        assert_eq!(marker.component, "Counter");
        assert_eq!(marker.symbol, "FILENAME");
        assert_eq!(marker.filename, "home/index.svelte");
        assert!(!artifact.code.contains("FILENAME"));
        assert!(!artifact.code.contains("import"));
        assert!(!artifact.code.contains("export default"));
    }

    #[test]
    fn test_normalize_export_default_function_form() {
        let code = "import \"svelte/internal/disclose-version\";\n\
                    export default function Widget($$anchor, $$props) {}\n";
        let artifact = normalize(raw(code), "widget.svelte", CompileTarget::Client).unwrap();

        assert_eq!(artifact.component_name, "Widget");
        assert!(artifact.marker.is_none());
        assert!(artifact.code.contains("function Widget"));
        assert!(!artifact.code.contains("export default"));
    }

    #[test]
    fn test_normalize_rejects_unrecognized_shape() {
        let err = normalize(raw("const x = 1;"), "x.svelte", CompileTarget::Server).unwrap_err();
        assert!(err.message.contains("constructor"));
    }

    #[test]
    fn test_adapter_targets_fail_independently() {
        struct OneTargetBackend;
        impl CompilerBackend for OneTargetBackend {
            fn compile(
                &self,
                _source: &str,
                identity: &str,
                target: CompileTarget,
                _dev: bool,
            ) -> Result<RawCompileOutput, CompileError> {
                match target {
                    CompileTarget::Server => Ok(RawCompileOutput {
                        code: "function App($$payload, $$props) {}".into(),
                        style: String::new(),
                    }),
                    CompileTarget::Client => Err(CompileError {
                        identity: identity.to_string(),
                        target,
                        message: "client emit unsupported".into(),
                        line: None,
                        column: None,
                    }),
                }
            }
        }

        let adapter = CompilerAdapter::new(Box::new(OneTargetBackend));
        assert!(adapter
            .compile("src", "app.svelte", CompileTarget::Server, false)
            .is_ok());
        assert!(adapter
            .compile("src", "app.svelte", CompileTarget::Client, false)
            .is_err());
    }
}
