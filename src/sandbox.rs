//! Execution sandbox - runs a server artifact in an isolated V8 isolate.
//!
//! One session per render, never reused: a session is consumed by
//! [`SandboxSession::render`] and every native resource is released when it
//! drops, on success and failure paths alike. The isolate sees exactly the
//! surface `server_shim.js` installs - the render primitives, a captured
//! console, and the two context accessors - plus the artifact itself. No
//! filesystem, no network, no module loading.

use std::sync::mpsc;
use std::time::Duration;

use deno_core::{op2, v8, JsRuntime, OpState, RuntimeOptions};
use serde::Deserialize;
use serde_json::Value;

use crate::cache::CompiledArtifact;
use crate::compiler::CompileTarget;
use crate::context::RenderContext;
use crate::error::{RenderError, RuntimeError};
use crate::escape::json_for_script;

/// Console output captured from the isolate. Re-emitted through `tracing`
/// by the pipeline rather than printed from inside the sandbox.
#[derive(Debug, Default, Clone)]
pub struct ConsoleCapture {
    pub messages: Vec<ConsoleMessage>,
}

#[derive(Debug, Clone)]
pub struct ConsoleMessage {
    pub level: String,
    pub text: String,
}

/// Per-request data exposed to the accessor ops. The two values stay
/// separate all the way into the isolate.
struct ContextBridge {
    component_data: Value,
    document_metadata: Value,
}

#[op2(fast)]
fn op_console(state: &mut OpState, #[string] level: &str, #[string] text: &str) {
    if let Some(capture) = state.try_borrow_mut::<ConsoleCapture>() {
        capture.messages.push(ConsoleMessage {
            level: level.to_string(),
            text: text.to_string(),
        });
    }
}

#[op2]
#[serde]
fn op_component_data(state: &mut OpState) -> serde_json::Value {
    state
        .try_borrow::<ContextBridge>()
        .map(|bridge| bridge.component_data.clone())
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()))
}

#[op2]
#[serde]
fn op_document_metadata(state: &mut OpState) -> serde_json::Value {
    state
        .try_borrow::<ContextBridge>()
        .map(|bridge| bridge.document_metadata.clone())
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()))
}

deno_core::extension!(
    isomer_runtime,
    ops = [op_console, op_component_data, op_document_metadata],
    esm_entry_point = "ext:isomer_runtime/server_shim.js",
    esm = ["ext:isomer_runtime/server_shim.js" = "src/server_shim.js"],
);

/// Resource limits for one render.
#[derive(Debug, Clone)]
pub struct SandboxOptions {
    /// Maximum V8 heap in bytes (None = unlimited).
    pub max_heap_size: Option<usize>,
    /// Wall-clock bound for one render in milliseconds (None = unlimited).
    /// A render that exceeds it is terminated and the session discarded.
    pub timeout_ms: Option<u64>,
}

impl Default for SandboxOptions {
    fn default() -> Self {
        Self {
            max_heap_size: Some(64 * 1024 * 1024),
            timeout_ms: Some(5_000),
        }
    }
}

/// Markup fragments extracted from a completed render.
#[derive(Debug)]
pub struct ServerFragments {
    pub body_html: String,
    pub head_html: String,
    pub console: ConsoleCapture,
}

#[derive(Debug, Deserialize)]
struct ShimResult {
    html: String,
    head: String,
}

/// One isolated execution context, bound 1:1 to a single render.
pub struct SandboxSession {
    runtime: JsRuntime,
    timeout_ms: Option<u64>,
}

impl SandboxSession {
    /// Build a fresh isolate primed with the emulation layer and this
    /// render's context.
    pub fn create(options: &SandboxOptions, ctx: &RenderContext) -> Self {
        let create_params = options
            .max_heap_size
            .map(|max_bytes| v8::Isolate::create_params().heap_limits(0, max_bytes));

        let mut runtime = JsRuntime::new(RuntimeOptions {
            extensions: vec![isomer_runtime::init_ops_and_esm()],
            create_params,
            ..Default::default()
        });

        if options.max_heap_size.is_some() {
            // Don't raise the limit - hand V8 back the current one so the
            // render dies with an OOM error instead of aborting the process.
            runtime.add_near_heap_limit_callback(|current, initial| {
                tracing::warn!(
                    current_mb = current / (1024 * 1024),
                    initial_mb = initial / (1024 * 1024),
                    "sandbox near heap limit"
                );
                current
            });
        }

        runtime.op_state().borrow_mut().put(ConsoleCapture::default());
        runtime.op_state().borrow_mut().put(ContextBridge {
            component_data: ctx.component_data().clone(),
            document_metadata: ctx.document_metadata().clone(),
        });

        Self {
            runtime,
            timeout_ms: options.timeout_ms,
        }
    }

    /// Execute a server artifact and extract its fragments. Consumes the
    /// session: teardown happens by drop whether the render succeeded or
    /// not.
    pub fn render(mut self, artifact: &CompiledArtifact) -> Result<ServerFragments, RenderError> {
        if artifact.target != CompileTarget::Server {
            return Err(RuntimeError {
                message: format!(
                    "sandbox can only execute server artifacts, got `{}` for {}",
                    artifact.target, artifact.identity
                ),
                stack: None,
            }
            .into());
        }

        let script = prepare_artifact(artifact);

        let raw = match self.timeout_ms {
            Some(ms) => {
                let isolate_handle = self.runtime.v8_isolate().thread_safe_handle();
                let (done_tx, done_rx) = mpsc::channel::<()>();
                let watchdog = std::thread::spawn(move || {
                    if done_rx.recv_timeout(Duration::from_millis(ms)).is_err() {
                        isolate_handle.terminate_execution();
                    }
                });

                let result = self.execute(script);
                let _ = done_tx.send(());
                let _ = watchdog.join();

                match result {
                    Err(RenderError::Runtime(err)) if is_termination(&err.message) => {
                        Err(RuntimeError {
                            message: format!("render timed out after {ms}ms"),
                            stack: None,
                        }
                        .into())
                    }
                    other => other,
                }
            }
            None => self.execute(script),
        }?;

        let fragments: ShimResult = serde_json::from_str(&raw).map_err(|e| RuntimeError {
            message: format!("malformed render result: {e}"),
            stack: None,
        })?;

        let console = self
            .runtime
            .op_state()
            .borrow()
            .borrow::<ConsoleCapture>()
            .clone();

        Ok(ServerFragments {
            body_html: fragments.html,
            head_html: fragments.head,
            console,
        })
    }

    fn execute(&mut self, script: String) -> Result<String, RenderError> {
        let global = self
            .runtime
            .execute_script("<render>", script)
            .map_err(|e| map_js_error(e.into()))?;

        let scope = &mut self.runtime.handle_scope();
        let local = v8::Local::new(scope, global);
        if local.is_string() {
            Ok(local.to_rust_string_lossy(scope))
        } else {
            Err(RuntimeError {
                message: "render script must return a string".to_string(),
                stack: None,
            }
            .into())
        }
    }
}

/// The one place that knows how an artifact becomes an executable script:
/// definition, identity-marker assignment (the capability the adapter
/// declared), render invocation, and the accessor-mismatch probe.
fn prepare_artifact(artifact: &CompiledArtifact) -> String {
    let marker_assignment = artifact
        .marker
        .as_ref()
        .map(|m| {
            format!(
                "{}[$.{}] = {};",
                m.component,
                m.symbol,
                json_for_script(&Value::String(m.filename.clone()))
            )
        })
        .unwrap_or_default();

    format!(
        r#"(() => {{
"use strict";
try {{
{code}
{marker_assignment}
const result = $.render({name}, {{ props: getContext(), context: new Map() }});
return JSON.stringify(result);
}} catch (err) {{
if (err instanceof ReferenceError) {{
  const probe = /^(get[A-Z][A-Za-z0-9_]*) is not defined/.exec(err.message);
  if (probe) throw new Error("missing-accessor:" + probe[1]);
}}
throw err;
}}
}})()"#,
        code = artifact.code,
        name = artifact.component_name,
    )
}

fn is_termination(message: &str) -> bool {
    message.contains("terminated")
}

fn map_js_error(err: anyhow::Error) -> RenderError {
    if let Some(js) = err.downcast_ref::<deno_core::error::JsError>() {
        if let Some(accessor) = missing_accessor_in(&js.exception_message) {
            return RenderError::MissingAccessor { accessor };
        }
        return RuntimeError {
            message: js.exception_message.clone(),
            stack: js.stack.clone(),
        }
        .into();
    }
    RuntimeError {
        message: err.to_string(),
        stack: None,
    }
    .into()
}

fn missing_accessor_in(message: &str) -> Option<String> {
    let (_, rest) = message.split_once("missing-accessor:")?;
    let name: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    (!name.is_empty()).then_some(name)
}
