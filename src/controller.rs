//! Controller interface: the external collaborator that supplies a
//! render's two mappings. No behavior beyond that is in scope - a
//! controller produces component data and document metadata, and the
//! bridge takes it from there.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::router::RouteMatch;

/// Captured `:param` values for the matched route.
pub type RouteParams = HashMap<String, String>;

/// One controller per route name. Either mapping may be absent; absence
/// means an empty mapping downstream, never an error.
pub trait Controller: Send + Sync {
    fn component_data(&self, _params: &RouteParams) -> Option<Value> {
        None
    }

    fn document_metadata(&self, _params: &RouteParams) -> Option<Value> {
        None
    }
}

/// Fixed mappings, for config-driven routes and tests.
pub struct StaticController {
    data: Option<Value>,
    doc: Option<Value>,
}

impl StaticController {
    pub fn new(data: Option<Value>, doc: Option<Value>) -> Self {
        Self { data, doc }
    }
}

impl Controller for StaticController {
    fn component_data(&self, _params: &RouteParams) -> Option<Value> {
        self.data.clone()
    }

    fn document_metadata(&self, _params: &RouteParams) -> Option<Value> {
        self.doc.clone()
    }
}

/// Name → controller. A route whose controller is unregistered renders
/// with empty mappings.
#[derive(Default)]
pub struct ControllerRegistry {
    controllers: HashMap<String, Arc<dyn Controller>>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, controller: Arc<dyn Controller>) {
        self.controllers.insert(name.into(), controller);
    }

    /// The two mappings for a matched route.
    pub fn resolve(&self, matched: &RouteMatch) -> (Option<Value>, Option<Value>) {
        match self.controllers.get(&matched.spec.controller) {
            Some(controller) => (
                controller.component_data(&matched.params),
                controller.document_metadata(&matched.params),
            ),
            None => (None, None),
        }
    }
}
