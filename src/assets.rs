//! Static asset serving: files from the project's assets directory plus
//! generated assets (extracted component CSS, the client runtime bundle)
//! kept in memory and registered under the same URL space.

use std::path::PathBuf;

use dashmap::DashMap;

/// An asset ready to serve.
#[derive(Debug, Clone)]
pub struct Asset {
    pub content: Vec<u8>,
    pub content_type: String,
}

/// Generated assets shadow the static directory: lookups check the
/// in-memory store first, then fall back to disk.
pub struct AssetStore {
    static_dir: PathBuf,
    generated: DashMap<String, Asset>,
}

impl AssetStore {
    pub fn new(static_dir: impl Into<PathBuf>) -> Self {
        Self {
            static_dir: static_dir.into(),
            generated: DashMap::new(),
        }
    }

    /// Register a generated asset under `path` (relative to `/assets/`).
    pub fn store_generated(&self, path: impl Into<String>, content: Vec<u8>, content_type: impl Into<String>) {
        self.generated.insert(
            normalize(&path.into()),
            Asset {
                content,
                content_type: content_type.into(),
            },
        );
    }

    /// Extracted component CSS, addressable as `css/<stem>.css`.
    pub fn store_component_css(&self, stem: &str, css: &str) -> String {
        let path = format!("css/{stem}.css");
        self.store_generated(path.clone(), css.as_bytes().to_vec(), "text/css");
        format!("/assets/{path}")
    }

    /// Resolve an asset by its `/assets/`-relative path. Directory
    /// traversal and directory listings are rejected, not errors.
    pub fn resolve(&self, path: &str) -> Option<Asset> {
        let candidate = normalize(path);
        if candidate.is_empty() || candidate.ends_with('/') || candidate.contains("..") {
            return None;
        }

        if let Some(asset) = self.generated.get(&candidate) {
            return Some(asset.clone());
        }

        let full = self.static_dir.join(&candidate);
        let content = std::fs::read(&full).ok()?;
        let content_type = mime_guess::from_path(&full)
            .first_or_octet_stream()
            .to_string();
        Some(Asset {
            content,
            content_type,
        })
    }
}

fn normalize(path: &str) -> String {
    path.trim_start_matches('/').to_string()
}
