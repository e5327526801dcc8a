//! Route table: request path → controller invocation.
//!
//! Routes come from the project config (exact paths, `:param` captures,
//! and RESTful resource expansion). Matching is segment-wise; exact routes
//! win over parameterized ones.

use std::collections::HashMap;

/// Where a matched route dispatches to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSpec {
    pub controller: String,
    pub action: String,
    /// Component identity, relative to the templates directory.
    pub template: String,
}

impl RouteSpec {
    /// Parse the `controller.action` shorthand, deriving the conventional
    /// template path.
    pub fn from_shorthand(spec: &str) -> Option<Self> {
        let (controller, action) = spec.split_once('.')?;
        if controller.is_empty() || action.is_empty() {
            return None;
        }
        Some(Self {
            controller: controller.to_string(),
            action: action.to_string(),
            template: format!("{controller}/{action}.svelte"),
        })
    }
}

/// A matched route plus its captured path parameters.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub spec: RouteSpec,
    pub params: HashMap<String, String>,
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Param(String),
}

#[derive(Debug, Default)]
pub struct Router {
    exact: HashMap<String, RouteSpec>,
    patterns: Vec<(Vec<Segment>, RouteSpec)>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_route(&mut self, path: &str, spec: RouteSpec) {
        let path = normalize(path);
        if path.contains(':') {
            let segments = path
                .split('/')
                .filter(|s| !s.is_empty())
                .map(|s| match s.strip_prefix(':') {
                    Some(name) => Segment::Param(name.to_string()),
                    None => Segment::Literal(s.to_string()),
                })
                .collect();
            self.patterns.push((segments, spec));
        } else {
            self.exact.insert(path, spec);
        }
    }

    /// Expand a RESTful resource into its four page routes.
    pub fn add_resource(&mut self, resource: &str) {
        let route = |action: &str| RouteSpec {
            controller: resource.to_string(),
            action: action.to_string(),
            template: format!("{resource}/{action}.svelte"),
        };
        self.add_route(&format!("/{resource}"), route("index"));
        self.add_route(&format!("/{resource}/new"), route("new"));
        self.add_route(&format!("/{resource}/:id"), route("show"));
        self.add_route(&format!("/{resource}/:id/edit"), route("edit"));
    }

    pub fn matches(&self, path: &str) -> Option<RouteMatch> {
        let path = normalize(path);

        if let Some(spec) = self.exact.get(&path) {
            return Some(RouteMatch {
                spec: spec.clone(),
                params: HashMap::new(),
            });
        }

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        'patterns: for (pattern, spec) in &self.patterns {
            if pattern.len() != segments.len() {
                continue;
            }
            let mut params = HashMap::new();
            for (expected, actual) in pattern.iter().zip(&segments) {
                match expected {
                    Segment::Literal(lit) if lit == actual => {}
                    Segment::Literal(_) => continue 'patterns,
                    Segment::Param(name) => {
                        params.insert(name.clone(), (*actual).to_string());
                    }
                }
            }
            return Some(RouteMatch {
                spec: spec.clone(),
                params,
            });
        }

        None
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.patterns.is_empty()
    }
}

fn normalize(path: &str) -> String {
    if path != "/" && path.ends_with('/') {
        path.trim_end_matches('/').to_string()
    } else {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(controller: &str, action: &str) -> RouteSpec {
        RouteSpec {
            controller: controller.to_string(),
            action: action.to_string(),
            template: format!("{controller}/{action}.svelte"),
        }
    }

    #[test]
    fn test_shorthand_parsing() {
        let parsed = RouteSpec::from_shorthand("home.index").unwrap();
        assert_eq!(parsed.controller, "home");
        assert_eq!(parsed.action, "index");
        assert_eq!(parsed.template, "home/index.svelte");
        assert!(RouteSpec::from_shorthand("noaction").is_none());
    }

    #[test]
    fn test_exact_match_and_trailing_slash() {
        let mut router = Router::new();
        router.add_route("/", spec("home", "index"));
        router.add_route("/about", spec("pages", "about"));

        assert_eq!(router.matches("/").unwrap().spec.controller, "home");
        assert_eq!(router.matches("/about/").unwrap().spec.action, "about");
        assert!(router.matches("/missing").is_none());
    }

    #[test]
    fn test_param_capture() {
        let mut router = Router::new();
        router.add_route("/posts/:id", spec("posts", "show"));

        let matched = router.matches("/posts/42").unwrap();
        assert_eq!(matched.spec.action, "show");
        assert_eq!(matched.params.get("id").map(String::as_str), Some("42"));
        assert!(router.matches("/posts").is_none());
        assert!(router.matches("/posts/42/extra").is_none());
    }

    #[test]
    fn test_resource_expansion_prefers_static_segments() {
        let mut router = Router::new();
        router.add_resource("todos");

        assert_eq!(router.matches("/todos").unwrap().spec.action, "index");
        // "new" must not be captured as an :id
        assert_eq!(router.matches("/todos/new").unwrap().spec.action, "new");
        let show = router.matches("/todos/7").unwrap();
        assert_eq!(show.spec.action, "show");
        assert_eq!(show.params.get("id").map(String::as_str), Some("7"));
        assert_eq!(router.matches("/todos/7/edit").unwrap().spec.action, "edit");
    }
}
