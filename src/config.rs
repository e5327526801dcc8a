//! Project configuration: typed settings with layered precedence
//! (`isomer.yml` → `ISOMER_*` environment variables).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use crate::hydrate::BootstrapOptions;
use crate::render::RendererOptions;
use crate::router::{Router, RouteSpec};
use crate::sandbox::SandboxOptions;

const CONFIG_FILE: &str = "isomer.yml";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid route `{path}`: {reason}")]
    InvalidRoute { path: String, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application name, used as the fallback document title.
    pub name: String,
    /// Development mode: inline diagnostics, dev-mode compiles.
    pub dev: bool,
    pub server: ServerSettings,
    pub paths: PathsSettings,
    pub compiler: CompilerSettings,
    pub sandbox: SandboxSettings,
    /// Shorthand for the `/` route, `controller.action`.
    pub root: Option<String>,
    pub routes: BTreeMap<String, RouteTarget>,
    /// RESTful resources, each expanded to index/new/show/edit routes.
    pub resources: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "Isomer App".to_string(),
            dev: false,
            server: ServerSettings::default(),
            paths: PathsSettings::default(),
            compiler: CompilerSettings::default(),
            sandbox: SandboxSettings::default(),
            root: None,
            routes: BTreeMap::new(),
            resources: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsSettings {
    pub templates: PathBuf,
    pub assets: PathBuf,
}

impl Default for PathsSettings {
    fn default() -> Self {
        Self {
            templates: PathBuf::from("app/templates"),
            assets: PathBuf::from("app/assets"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompilerSettings {
    /// Node executable that runs the compiler driver.
    pub command: String,
    /// Module specifier of the client runtime bundle.
    pub runtime_module: String,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            command: "node".to_string(),
            runtime_module: "/assets/isomer-runtime.js".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SandboxSettings {
    pub heap_limit_mb: Option<usize>,
    pub timeout_ms: Option<u64>,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            heap_limit_mb: Some(64),
            timeout_ms: Some(5_000),
        }
    }
}

/// A route either names `controller.action` or spells the parts out.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RouteTarget {
    Shorthand(String),
    Full {
        controller: String,
        action: String,
        #[serde(default)]
        template: Option<String>,
    },
}

impl AppConfig {
    /// Load settings for a project. An explicit file must exist; the
    /// conventional `isomer.yml` is optional and defaults apply without it.
    pub fn load(project_root: &Path, explicit_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        builder = match explicit_file {
            Some(path) => builder.add_source(File::from(path.to_path_buf())),
            None => builder.add_source(File::from(project_root.join(CONFIG_FILE)).required(false)),
        };
        builder = builder.add_source(Environment::with_prefix("ISOMER").separator("__"));
        Ok(builder.build()?.try_deserialize()?)
    }

    /// Build the route table. A project with no routes at all gets the
    /// conventional `home.index` root.
    pub fn build_router(&self) -> Result<Router, ConfigError> {
        let mut router = Router::new();

        if let Some(root) = &self.root {
            let spec = RouteSpec::from_shorthand(root).ok_or_else(|| ConfigError::InvalidRoute {
                path: "/".to_string(),
                reason: format!("`{root}` is not of the form controller.action"),
            })?;
            router.add_route("/", spec);
        }

        for (path, target) in &self.routes {
            let spec = match target {
                RouteTarget::Shorthand(s) => {
                    RouteSpec::from_shorthand(s).ok_or_else(|| ConfigError::InvalidRoute {
                        path: path.clone(),
                        reason: format!("`{s}` is not of the form controller.action"),
                    })?
                }
                RouteTarget::Full {
                    controller,
                    action,
                    template,
                } => RouteSpec {
                    controller: controller.clone(),
                    action: action.clone(),
                    template: template
                        .clone()
                        .unwrap_or_else(|| format!("{controller}/{action}.svelte")),
                },
            };
            router.add_route(path, spec);
        }

        for resource in &self.resources {
            router.add_resource(resource);
        }

        if router.is_empty() {
            router.add_route(
                "/",
                RouteSpec {
                    controller: "home".to_string(),
                    action: "index".to_string(),
                    template: "home/index.svelte".to_string(),
                },
            );
        }

        Ok(router)
    }

    pub fn sandbox_options(&self) -> SandboxOptions {
        SandboxOptions {
            max_heap_size: self.sandbox.heap_limit_mb.map(|mb| mb * 1024 * 1024),
            timeout_ms: self.sandbox.timeout_ms,
        }
    }

    pub fn renderer_options(&self) -> RendererOptions {
        RendererOptions {
            app_name: self.name.clone(),
            dev: self.dev,
            sandbox: self.sandbox_options(),
            bootstrap: BootstrapOptions {
                runtime_module: self.compiler.runtime_module.clone(),
                ..Default::default()
            },
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_without_config_file() {
        let dir = tempdir().unwrap();
        let cfg = AppConfig::load(dir.path(), None).unwrap();
        assert_eq!(cfg.name, "Isomer App");
        assert!(!cfg.dev);
        assert_eq!(cfg.listen_addr(), "127.0.0.1:3000");
    }

    #[test]
    fn test_loads_yaml_config() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("isomer.yml"),
            "name: Demo\n\
             dev: true\n\
             server:\n\
             \x20 port: 4400\n\
             root: home.index\n\
             routes:\n\
             \x20 /posts/:id: posts.show\n\
             resources:\n\
             \x20 - todos\n",
        )
        .unwrap();

        let cfg = AppConfig::load(dir.path(), None).unwrap();
        assert_eq!(cfg.name, "Demo");
        assert!(cfg.dev);
        assert_eq!(cfg.server.port, 4400);

        let router = cfg.build_router().unwrap();
        assert_eq!(router.matches("/").unwrap().spec.template, "home/index.svelte");
        assert_eq!(router.matches("/posts/9").unwrap().spec.action, "show");
        assert_eq!(router.matches("/todos/new").unwrap().spec.action, "new");
    }

    #[test]
    fn test_invalid_shorthand_is_an_error() {
        let cfg = AppConfig {
            root: Some("malformed".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            cfg.build_router(),
            Err(ConfigError::InvalidRoute { .. })
        ));
    }

    #[test]
    fn test_empty_route_table_gets_conventional_root() {
        let cfg = AppConfig::default();
        let router = cfg.build_router().unwrap();
        assert_eq!(router.matches("/").unwrap().spec.controller, "home");
    }
}
