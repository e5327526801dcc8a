//! Per-request orchestration: source → artifacts → sandbox → document.
//!
//! One call to [`Renderer::render`] is one render is one request. The only
//! state shared between concurrent renders is the artifact cache; the
//! sandbox session, context, and result are all request-local and dropped
//! with the response.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use crate::assets::AssetStore;
use crate::cache::ArtifactCache;
use crate::compiler::{CompileTarget, CompilerAdapter};
use crate::context::RenderContext;
use crate::error::RenderError;
use crate::escape::html_attr_escape;
use crate::head::DocumentMetadata;
use crate::hydrate::{build_bootstrap, degraded_bootstrap, BootstrapOptions};
use crate::sandbox::{SandboxOptions, SandboxSession};

/// Everything about a renderer that isn't a collaborator object.
#[derive(Debug, Clone)]
pub struct RendererOptions {
    /// Fallback document title when metadata doesn't supply one.
    pub app_name: String,
    /// Development mode: full diagnostics in error pages, dev-mode compiles.
    pub dev: bool,
    pub sandbox: SandboxOptions,
    pub bootstrap: BootstrapOptions,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            app_name: "Isomer App".to_string(),
            dev: false,
            sandbox: SandboxOptions::default(),
            bootstrap: BootstrapOptions::default(),
        }
    }
}

/// One render's output, discarded after the response is sent.
#[derive(Debug)]
pub struct RenderResult {
    pub body_html: String,
    pub style_css: String,
    pub hydration_script: String,
    pub head_html: String,
    pub document_title: String,
    /// Where the extracted component CSS was registered, when there is any.
    pub css_href: Option<String>,
}

pub struct Renderer {
    cache: ArtifactCache,
    adapter: CompilerAdapter,
    templates_dir: PathBuf,
    assets: Arc<AssetStore>,
    options: RendererOptions,
}

impl Renderer {
    pub fn new(
        adapter: CompilerAdapter,
        templates_dir: impl Into<PathBuf>,
        assets: Arc<AssetStore>,
        options: RendererOptions,
    ) -> Self {
        Self {
            cache: ArtifactCache::new(),
            adapter,
            templates_dir: templates_dir.into(),
            assets,
            options,
        }
    }

    pub fn dev(&self) -> bool {
        self.options.dev
    }

    /// Render one component with the controller-supplied mappings.
    pub fn render(
        &self,
        identity: &str,
        component_data: Option<Value>,
        document_metadata: Option<Value>,
    ) -> Result<RenderResult, RenderError> {
        let source = self.read_source(identity)?;
        let ctx = RenderContext::partition(component_data, document_metadata)?;

        let server_artifact = self.cache.get_or_compile(
            identity,
            CompileTarget::Server,
            &source,
            &self.adapter,
            self.options.dev,
        )?;

        // Client compilation is independent of the server target: its
        // failure costs interactivity, not the page.
        let client_artifact = self.cache.get_or_compile(
            identity,
            CompileTarget::Client,
            &source,
            &self.adapter,
            self.options.dev,
        );

        let session = SandboxSession::create(&self.options.sandbox, &ctx);
        let fragments = session.render(&server_artifact)?;

        for message in &fragments.console.messages {
            match message.level.as_str() {
                "error" => tracing::error!(component = identity, "[sandbox] {}", message.text),
                "warn" => tracing::warn!(component = identity, "[sandbox] {}", message.text),
                _ => tracing::debug!(component = identity, "[sandbox] {}", message.text),
            }
        }

        let hydration_script = match client_artifact {
            Ok(artifact) => build_bootstrap(&artifact, &ctx, &self.options.bootstrap),
            Err(err) => {
                tracing::warn!(component = identity, error = %err, "client target failed, serving non-interactive page");
                degraded_bootstrap(&err.to_string())
            }
        };

        let metadata = DocumentMetadata::from_value(ctx.document_metadata());
        let mut head_html = metadata.head_html();
        if !fragments.head_html.is_empty() {
            if head_html.is_empty() {
                head_html.push('\n');
            }
            head_html.push_str("    ");
            head_html.push_str(&fragments.head_html);
            head_html.push('\n');
        }

        let css_href = if server_artifact.style.is_empty() {
            None
        } else {
            Some(
                self.assets
                    .store_component_css(&component_stem(identity), &server_artifact.style),
            )
        };

        Ok(RenderResult {
            body_html: fragments.body_html,
            style_css: server_artifact.style.clone(),
            hydration_script,
            head_html,
            document_title: metadata
                .title
                .unwrap_or_else(|| self.options.app_name.clone()),
            css_href,
        })
    }

    /// Assemble the full HTML document for a render result.
    pub fn render_document(&self, result: &RenderResult) -> String {
        let css_link = result
            .css_href
            .as_deref()
            .map(|href| format!("    <link rel=\"stylesheet\" href=\"{}\">\n", html_attr_escape(href)))
            .unwrap_or_default();

        format!(
            "<!DOCTYPE html>\n\
             <html>\n\
             <head>\n\
             \x20   <meta charset=\"utf-8\">\n\
             \x20   <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
             \x20   <title>{title}</title>\n\
             {css_link}{head}\
             </head>\n\
             <body>\n\
             \x20   <div id=\"{mount_id}\">{body}</div>\n\
             \x20   <script type=\"module\">\n\
             {hydration}\
             \x20   </script>\n\
             </body>\n\
             </html>\n",
            title = html_attr_escape(&result.document_title),
            css_link = css_link,
            head = result.head_html,
            mount_id = html_attr_escape(&self.options.bootstrap.mount_id),
            body = result.body_html,
            hydration = result.hydration_script,
        )
    }

    /// The user-visible document for a failed render. Development mode
    /// shows the full diagnostic; production shows a generic page and the
    /// details go to the log. Neither path embeds request data.
    pub fn error_document(&self, err: &RenderError) -> String {
        let body = if self.options.dev {
            format!(
                "    <h1>Render failed</h1>\n    <pre>{}</pre>\n",
                html_attr_escape(&err.diagnostic())
            )
        } else {
            "    <h1>Something went wrong</h1>\n    <p>The page could not be rendered.</p>\n"
                .to_string()
        };
        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n    <title>Error</title>\n</head>\n<body>\n{body}</body>\n</html>\n"
        )
    }

    fn read_source(&self, identity: &str) -> Result<String, RenderError> {
        let path = self.templates_dir.join(identity);
        std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RenderError::SourceNotFound { path }
            } else {
                RenderError::SourceRead { path, source: e }
            }
        })
    }
}

fn component_stem(identity: &str) -> String {
    identity
        .trim_end_matches(".svelte")
        .replace(['/', '\\'], "-")
}
