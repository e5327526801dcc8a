//! Builds the client bootstrap: a self-contained module script that
//! re-executes the real client artifact against the server-rendered DOM,
//! with the same initial data the server render saw.
//!
//! The client code is embedded as a template literal, so it passes through
//! `script_embed_escape` - and through nothing else - exactly once, here.
//! Data is embedded as `<`-hardened JSON. The bootstrap installs the same
//! two-accessor context surface the sandbox installs, which is what keeps
//! component code agnostic to where it runs.

use crate::cache::CompiledArtifact;
use crate::context::RenderContext;
use crate::escape::{json_for_script, script_embed_escape};

/// Where the bootstrap finds the client runtime and the mount point.
#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    /// Module specifier of the client reactive runtime, served as a static
    /// asset.
    pub runtime_module: String,
    /// Id of the element wrapping the server-rendered markup.
    pub mount_id: String,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            runtime_module: "/assets/isomer-runtime.js".to_string(),
            mount_id: "isomer-app".to_string(),
        }
    }
}

/// Generate the hydration script for a client artifact.
pub fn build_bootstrap(
    artifact: &CompiledArtifact,
    ctx: &RenderContext,
    options: &BootstrapOptions,
) -> String {
    let embedded_code = script_embed_escape(&artifact.code);
    let props_json = json_for_script(ctx.component_data());
    let doc_json = json_for_script(ctx.document_metadata());
    let runtime_module = json_for_script(&serde_json::Value::String(options.runtime_module.clone()));
    let mount_id = json_for_script(&serde_json::Value::String(options.mount_id.clone()));

    // The marker assignment mirrors the server-side prepare step: the
    // adapter declared the capability, the bootstrap honors it on the
    // client constructor.
    let marker_assignment = artifact
        .marker
        .as_ref()
        .map(|m| {
            format!(
                "{}[$.{}] = {};\n",
                m.component,
                m.symbol,
                json_for_script(&serde_json::Value::String(m.filename.clone()))
            )
        })
        .unwrap_or_default();

    format!(
        r#"import * as $ from {runtime_module};

const props = {props_json};
const doc = {doc_json};
globalThis.getContext = function getContext() {{ return props; }};
globalThis.getDoc = function getDoc() {{ return doc; }};

const source = `{embedded_code}`;
const define = new Function("$", source + "\n;return {component_name};");
const {component_name} = define($);
{marker_assignment}$.hydrate({component_name}, {{
  target: document.getElementById({mount_id}),
  props,
}});
"#,
        component_name = artifact.component_name,
    )
}

/// Emitted in place of the bootstrap when the client target failed to
/// compile: the page stays server-rendered and non-interactive.
pub fn degraded_bootstrap(reason: &str) -> String {
    format!(
        "console.error({});\n",
        json_for_script(&serde_json::Value::String(format!(
            "hydration disabled: {reason}"
        )))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Fingerprint;
    use crate::compiler::{CompileTarget, MarkerRequirement};
    use serde_json::json;

    fn client_artifact(code: &str, marker: Option<MarkerRequirement>) -> CompiledArtifact {
        CompiledArtifact {
            identity: "home/index.svelte".to_string(),
            target: CompileTarget::Client,
            fingerprint: Fingerprint::of(code),
            code: code.to_string(),
            style: String::new(),
            component_name: "App".to_string(),
            marker,
        }
    }

    fn ctx() -> RenderContext {
        RenderContext::partition(Some(json!({"count": 0})), Some(json!({"title": "Home"}))).unwrap()
    }

    #[test]
    fn test_embeds_initial_data_and_code() {
        let artifact = client_artifact("function App($$anchor, $$props) { /* client */ }", None);
        let script = build_bootstrap(&artifact, &ctx(), &BootstrapOptions::default());

        assert!(script.contains(r#"{"count":0}"#));
        assert!(script.contains("function App($$anchor, $$props)"));
        assert!(script.contains("$.hydrate(App"));
        assert!(script.contains(r#"import * as $ from "/assets/isomer-runtime.js";"#));
    }

    #[test]
    fn test_client_code_is_template_escaped() {
        let artifact = client_artifact(
            "function App($$anchor, $$props) { const t = `count ${$$props.count}` + \"\\\\\"; }",
            None,
        );
        let script = build_bootstrap(&artifact, &ctx(), &BootstrapOptions::default());

        // The hazardous sequences appear only in escaped form inside the
        // template literal.
        assert!(script.contains("\\${"));
        assert!(script.contains("\\`"));
        assert!(script.contains("\\\\"));
    }

    #[test]
    fn test_marker_mirrored_for_client_target() {
        let artifact = client_artifact(
            "function App($$anchor, $$props) {}",
            Some(MarkerRequirement {
                component: "App".to_string(),
                symbol: "FILENAME".to_string(),
                filename: "home/index.svelte".to_string(),
            }),
        );
        let script = build_bootstrap(&artifact, &ctx(), &BootstrapOptions::default());
        assert!(script.contains(r#"App[$.FILENAME] = "home/index.svelte";"#));
    }

    #[test]
    fn test_accessor_surface_matches_server_side() {
        let artifact = client_artifact("function App($$anchor, $$props) {}", None);
        let script = build_bootstrap(&artifact, &ctx(), &BootstrapOptions::default());
        // The bootstrap must install the exact accessor surface the sandbox
        // installs, or components stop being runtime-agnostic.
        for accessor in crate::context::INSTALLED_ACCESSORS {
            assert!(
                script.contains(&format!("globalThis.{accessor}")),
                "bootstrap does not install {accessor}"
            );
        }
        assert!(script.contains(r#"{"title":"Home"}"#));
    }

    #[test]
    fn test_degraded_bootstrap_is_inert() {
        let script = degraded_bootstrap("client compile failed");
        assert!(script.starts_with("console.error("));
        assert!(script.contains("hydration disabled"));
    }
}
