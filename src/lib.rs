//! # Isomer
//!
//! An isomorphic rendering bridge: one reactive component source is
//! compiled to two artifacts - server-render and client-hydrate - the
//! server artifact runs in a sandboxed V8 isolate to produce HTML, and a
//! generated bootstrap re-executes the client artifact in the browser
//! against the same initial data, so the DOM becomes interactive without a
//! flash or state mismatch.
//!
//! ## Security guarantees
//!
//! - **Isolated execution**: each render gets its own single-use V8
//!   isolate with a heap limit and a wall-clock watchdog; sessions are
//!   never pooled or shared between requests
//! - **No ambient authority**: the isolate sees only the emulation layer,
//!   a captured console, and the two context accessors - no filesystem,
//!   no network, no module loading
//! - **Separated contexts**: component data and document metadata reach
//!   their consumers through dedicated accessors and are never merged
//! - **Escaped embedding**: metadata is entity-escaped into `<head>`,
//!   artifacts and data are template-literal-escaped into the hydration
//!   script; error pages never embed raw request data
//!
//! ## Usage
//!
//! ```rust,ignore
//! use isomer::config::AppConfig;
//! use isomer::controller::ControllerRegistry;
//! use isomer::server::{serve, AppState};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let root = Path::new(".");
//!     let config = AppConfig::load(root, None)?;
//!     let state = AppState::from_config(&config, root, ControllerRegistry::new())?;
//!     serve(state, &config.listen_addr()).await
//! }
//! ```

pub mod assets;
pub mod cache;
pub mod compiler;
pub mod config;
pub mod context;
pub mod controller;
pub mod error;
pub mod escape;
pub mod head;
pub mod hydrate;
pub mod render;
pub mod router;
pub mod sandbox;
pub mod server;

pub use cache::{ArtifactCache, CompiledArtifact, Fingerprint};
pub use compiler::{CompileTarget, CompilerAdapter, CompilerBackend, NodeBackend};
pub use context::RenderContext;
pub use error::{CompileError, RenderError, RuntimeError};
pub use render::{RenderResult, Renderer, RendererOptions};
pub use sandbox::{SandboxOptions, SandboxSession, ServerFragments};
