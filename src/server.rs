//! HTTP layer: asset routes plus a catch-all page handler.
//!
//! The sandbox is synchronous and its isolate is not `Send`, so every
//! render runs to completion on a blocking worker; the async layer only
//! shuttles bytes.

use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{Path as UrlPath, State},
    http::{header, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    routing::get,
};

use crate::assets::AssetStore;
use crate::compiler::{CompilerAdapter, NodeBackend};
use crate::config::{AppConfig, ConfigError};
use crate::controller::ControllerRegistry;
use crate::render::Renderer;
use crate::router::Router;

#[derive(Clone)]
pub struct AppState {
    pub renderer: Arc<Renderer>,
    pub router: Arc<Router>,
    pub controllers: Arc<ControllerRegistry>,
    pub assets: Arc<AssetStore>,
}

impl AppState {
    /// Wire a project's components together. Controllers are registered by
    /// the host before the state is built; config-driven projects pass an
    /// empty registry.
    pub fn from_config(
        config: &AppConfig,
        project_root: &Path,
        controllers: ControllerRegistry,
    ) -> Result<Self, ConfigError> {
        let assets = Arc::new(AssetStore::new(project_root.join(&config.paths.assets)));
        let adapter = CompilerAdapter::new(Box::new(NodeBackend::new(
            config.compiler.command.clone(),
            project_root,
        )));
        let renderer = Renderer::new(
            adapter,
            project_root.join(&config.paths.templates),
            Arc::clone(&assets),
            config.renderer_options(),
        );

        Ok(Self {
            renderer: Arc::new(renderer),
            router: Arc::new(config.build_router()?),
            controllers: Arc::new(controllers),
            assets,
        })
    }
}

pub fn build_app(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/assets/{*path}", get(serve_asset))
        .fallback(get(render_page))
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: AppState, addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, build_app(state)).await?;
    Ok(())
}

async fn serve_asset(State(state): State<AppState>, UrlPath(path): UrlPath<String>) -> Response {
    match state.assets.resolve(&path) {
        Some(asset) => (
            [
                (header::CONTENT_TYPE, asset.content_type),
                (header::CACHE_CONTROL, "public, max-age=3600".to_string()),
            ],
            asset.content,
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn render_page(State(state): State<AppState>, uri: Uri) -> Response {
    let path = uri.path().to_string();

    let Some(matched) = state.router.matches(&path) else {
        return (StatusCode::NOT_FOUND, Html(not_found_page())).into_response();
    };

    let (data, doc) = state.controllers.resolve(&matched);
    let renderer = Arc::clone(&state.renderer);
    let template = matched.spec.template.clone();

    let rendered = tokio::task::spawn_blocking(move || {
        match renderer.render(&template, data, doc) {
            Ok(result) => (renderer.render_document(&result), StatusCode::OK),
            Err(err) => {
                tracing::error!(route = %path, error = %err.diagnostic(), "render failed");
                let status = StatusCode::from_u16(err.status_code())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (renderer.error_document(&err), status)
            }
        }
    })
    .await;

    match rendered {
        Ok((html, status)) => (status, Html(html)).into_response(),
        Err(join_err) => {
            tracing::error!(error = %join_err, "render worker panicked");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html("<h1>Something went wrong</h1>".to_string()),
            )
                .into_response()
        }
    }
}

fn not_found_page() -> String {
    "<!DOCTYPE html>\n\
     <html>\n\
     <head>\n\
     \x20   <title>404 - Not Found</title>\n\
     </head>\n\
     <body>\n\
     \x20   <h1>404 - Page Not Found</h1>\n\
     \x20   <p>The requested page could not be found.</p>\n\
     </body>\n\
     </html>\n"
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_page_shape() {
        let page = not_found_page();
        assert!(page.contains("404"));
        assert!(page.starts_with("<!DOCTYPE html>"));
    }
}
