//! Context separation: the two mappings a controller supplies per request,
//! each reaching its own consumer and nothing else.
//!
//! Component data flows into the component's reactive props (the
//! `getContext` accessor); document metadata is retrieved explicitly (the
//! `getDoc` accessor). They are never merged into a structure either
//! consumer can see whole, and the same two-accessor surface is installed
//! for the client artifact at hydration time, so component code is agnostic
//! to where it runs.
//!
//! Both mappings are guarded here, at the boundary, before they reach the
//! sandbox or the serializer: keys that would pollute `Object.prototype`
//! are rejected, as is pathological nesting depth.

use serde_json::{Map, Value};

use crate::error::RenderError;

/// Accessor names this emulation version installs in the sandbox and the
/// hydration bootstrap. The list is the versioned contract surface; a
/// compiler generation that expects more accessors fails the render with
/// `MissingAccessor` rather than getting a silent stub.
pub const INSTALLED_ACCESSORS: &[&str] = &["getContext", "getDoc"];

/// Maximum nesting for either mapping.
const MAX_DEPTH: usize = 32;

/// Keys that rewrite `Object.prototype` once the data lands in a script
/// context.
const FORBIDDEN_KEYS: &[&str] = &["__proto__", "constructor", "prototype"];

/// The partitioned per-request data. Construction is the only way in, so
/// every context the sandbox or bootstrap sees has passed the guard.
#[derive(Debug, Clone)]
pub struct RenderContext {
    component_data: Value,
    document_metadata: Value,
}

impl RenderContext {
    /// Partition controller output. Absent mappings become empty objects,
    /// never errors.
    pub fn partition(
        component_data: Option<Value>,
        document_metadata: Option<Value>,
    ) -> Result<Self, RenderError> {
        let component_data = to_object(component_data, "component data")?;
        let document_metadata = to_object(document_metadata, "document metadata")?;
        guard(&component_data, "component data", 0)?;
        guard(&document_metadata, "document metadata", 0)?;
        Ok(Self {
            component_data,
            document_metadata,
        })
    }

    /// What the props accessor yields. Never contains metadata.
    pub fn component_data(&self) -> &Value {
        &self.component_data
    }

    /// What the metadata accessor yields. Never contains component data.
    pub fn document_metadata(&self) -> &Value {
        &self.document_metadata
    }
}

fn to_object(value: Option<Value>, which: &str) -> Result<Value, RenderError> {
    match value {
        None | Some(Value::Null) => Ok(Value::Object(Map::new())),
        Some(obj @ Value::Object(_)) => Ok(obj),
        Some(other) => Err(RenderError::DataRejected {
            reason: format!("{which} must be a key/value mapping, got {}", kind_of(&other)),
        }),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn guard(value: &Value, which: &str, depth: usize) -> Result<(), RenderError> {
    if depth > MAX_DEPTH {
        return Err(RenderError::DataRejected {
            reason: format!("{which} nests deeper than {MAX_DEPTH} levels"),
        });
    }

    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                if FORBIDDEN_KEYS.contains(&key.as_str()) {
                    return Err(RenderError::DataRejected {
                        reason: format!("{which} contains forbidden key `{key}`"),
                    });
                }
                guard(nested, which, depth + 1)?;
            }
            Ok(())
        }
        Value::Array(items) => {
            for item in items {
                guard(item, which, depth + 1)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absent_mappings_become_empty_objects() {
        let ctx = RenderContext::partition(None, None).unwrap();
        assert_eq!(ctx.component_data(), &json!({}));
        assert_eq!(ctx.document_metadata(), &json!({}));
    }

    #[test]
    fn test_mappings_stay_partitioned() {
        let ctx = RenderContext::partition(
            Some(json!({"count": 0})),
            Some(json!({"title": "Home"})),
        )
        .unwrap();
        assert_eq!(ctx.component_data(), &json!({"count": 0}));
        assert_eq!(ctx.document_metadata(), &json!({"title": "Home"}));
        assert!(ctx.component_data().get("title").is_none());
        assert!(ctx.document_metadata().get("count").is_none());
    }

    #[test]
    fn test_rejects_prototype_pollution_keys() {
        let err = RenderContext::partition(
            Some(json!({"nested": {"__proto__": {"polluted": true}}})),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, RenderError::DataRejected { .. }));
        assert!(err.to_string().contains("__proto__"));
    }

    #[test]
    fn test_rejects_pollution_inside_arrays() {
        let err = RenderContext::partition(
            Some(json!({"items": [{"ok": 1}, {"constructor": {}}]})),
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("constructor"));
    }

    #[test]
    fn test_rejects_excessive_depth() {
        let mut value = json!({"leaf": true});
        for _ in 0..40 {
            value = json!({ "nested": value });
        }
        let err = RenderContext::partition(Some(value), None).unwrap_err();
        assert!(err.to_string().contains("deeper"));
    }

    #[test]
    fn test_rejects_non_mapping_data() {
        let err = RenderContext::partition(Some(json!([1, 2, 3])), None).unwrap_err();
        assert!(err.to_string().contains("mapping"));
    }
}
