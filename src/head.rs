//! Renders document metadata into `<head>` fragments.
//!
//! Recognized fields: `title` (string), `head.meta` (ordered list of
//! attribute mappings), `head.script` (script descriptors: an `analytics`
//! measurement id and a `custom` list of inline snippets). Unrecognized
//! fields are ignored, not errors. Every emitted value passes through the
//! escaping layer exactly once, here.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::escape::{html_attr_escape, sanitize_inline_js};

/// Typed view over the metadata mapping. Deserialization is lenient:
/// unknown fields fall away, and a mapping that doesn't fit the recognized
/// shape falls back to the empty view rather than failing the render.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub head: HeadSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HeadSection {
    #[serde(default)]
    pub meta: Vec<Map<String, Value>>,
    #[serde(default)]
    pub script: ScriptDescriptors,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScriptDescriptors {
    #[serde(default)]
    pub analytics: Option<String>,
    #[serde(default)]
    pub custom: Vec<String>,
}

impl DocumentMetadata {
    /// Read the recognized fields out of a guarded metadata mapping.
    pub fn from_value(value: &Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    /// The `<head>` fragment derived from this metadata. The document title
    /// is rendered separately (exactly once) by the document assembler.
    pub fn head_html(&self) -> String {
        let mut parts: Vec<String> = Vec::new();

        for attrs in &self.head.meta {
            if attrs.is_empty() {
                continue;
            }
            let rendered: Vec<String> = attrs
                .iter()
                .map(|(key, value)| {
                    format!(
                        "{}=\"{}\"",
                        html_attr_escape(key),
                        html_attr_escape(&attr_text(value))
                    )
                })
                .collect();
            parts.push(format!("    <meta {}>", rendered.join(" ")));
        }

        if let Some(id) = &self.head.script.analytics {
            let safe_id = html_attr_escape(id);
            parts.push(format!(
                "    <script async src=\"https://www.googletagmanager.com/gtag/js?id={safe_id}\"></script>"
            ));
            parts.push("    <script>".to_string());
            parts.push("        window.dataLayer = window.dataLayer || [];".to_string());
            parts.push("        function gtag(){dataLayer.push(arguments);}".to_string());
            parts.push("        gtag(\"js\", new Date());".to_string());
            parts.push(format!("        gtag(\"config\", \"{safe_id}\");"));
            parts.push("    </script>".to_string());
        }

        let custom: Vec<&String> = self
            .head
            .script
            .custom
            .iter()
            .filter(|snippet| !snippet.trim().is_empty())
            .collect();
        if !custom.is_empty() {
            parts.push("    <script>".to_string());
            for snippet in custom {
                parts.push(format!("        {}", sanitize_inline_js(snippet.trim())));
            }
            parts.push("    </script>".to_string());
        }

        if parts.is_empty() {
            String::new()
        } else {
            format!("\n{}\n", parts.join("\n"))
        }
    }
}

/// Attribute values may be any scalar; strings render bare, everything else
/// through its JSON form.
fn attr_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
