//! Escaping for the two contexts where untrusted text crosses into output:
//! HTML attribute/text content, and JS template literals embedded in a
//! `<script>` element.
//!
//! Neither function is idempotent. Escaping already-escaped text
//! double-escapes it, so callers escape exactly once, at the point of
//! embedding.

/// Escape text for use inside an HTML attribute value or text node.
///
/// `&` is rewritten first so entities produced by the later steps are not
/// re-mangled.
pub fn html_attr_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Escape arbitrary code or data for embedding inside a backtick template
/// literal that itself lives in an inline `<script>` element.
///
/// The first three steps run in a fixed order: backslash, then backtick,
/// then the interpolation delimiter. Escaping backslashes any later would
/// corrupt the escape sequences the earlier steps inserted. The final
/// rewrite neutralizes `</script`, which would terminate the surrounding
/// script element no matter what the JS string context is; `\/` evaluates
/// to `/` in a template literal, so the embedded text round-trips.
pub fn script_embed_escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('`', "\\`")
        .replace("${", "\\${")
        .replace("</script", "<\\/script")
}

/// Serialize a JSON value as a script-safe literal.
///
/// JSON is a subset of JS expression syntax, but a `</script` inside a
/// string value would still break out of an inline script element. `<`
/// only occurs inside JSON strings, so rewriting it to its unicode escape
/// is loss-free.
pub fn json_for_script(value: &serde_json::Value) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "null".to_string())
        .replace('<', "\\u003c")
}

/// Patterns that are never legitimate in metadata-supplied inline scripts.
const BLOCKED_JS_PATTERNS: &[&str] = &[
    "eval(",
    "Function(",
    "document.write(",
    "document.cookie",
    "innerHTML",
    "outerHTML",
    "localStorage",
    "sessionStorage",
];

/// Neutralize dangerous constructs in an inline script supplied through
/// document metadata. Matches are replaced with a comment rather than
/// dropped so the output stays syntactically inert and diagnosable.
pub fn sanitize_inline_js(js: &str) -> String {
    let mut sanitized = js.to_string();
    for pattern in BLOCKED_JS_PATTERNS {
        let lower = sanitized.to_lowercase();
        let pattern_lower = pattern.to_lowercase();
        if lower.contains(&pattern_lower) {
            let label = pattern.trim_end_matches('(');
            sanitized = sanitized.replace(pattern, &format!("/* blocked: {label} */"));
        }
    }
    sanitized
}
