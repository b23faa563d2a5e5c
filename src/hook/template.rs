//! `{{ name }}` placeholder rendering against a scenario's user context.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Deserialize;
use serde_json::Value;
use tracing::trace;

#[allow(clippy::expect_used)]
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_$][\w$.\-]*)\s*\}\}").expect("placeholder regex is valid") // Static pattern, safe to panic
});

/// Per-virtual-user state of a running scenario.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UserContext {
    /// Variables available to templates.
    #[serde(default)]
    pub vars: HashMap<String, Value>,
}

impl UserContext {
    /// Creates a context with no variables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a variable, replacing any previous value.
    #[must_use]
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Replaces every `{{ name }}` placeholder in `template` with the
    /// variable's value. Unknown placeholders are left as written.
    #[must_use]
    pub fn render(&self, template: &str) -> String {
        PLACEHOLDER
            .replace_all(template, |caps: &Captures<'_>| {
                let name = &caps[1];
                match self.vars.get(name) {
                    Some(Value::String(s)) => s.clone(),
                    Some(value) => value.to_string(),
                    None => {
                        trace!(name, "unknown template variable");
                        caps[0].to_string()
                    }
                }
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_replaces_known_variables() {
        let ctx = UserContext::new()
            .with_var("host", "cdn.example.com")
            .with_var("workers", 8);
        assert_eq!(
            ctx.render("https://{{ host }}/vod/{{host}}.m3u8"),
            "https://cdn.example.com/vod/cdn.example.com.m3u8"
        );
        assert_eq!(ctx.render("{{ workers }}"), "8");
    }

    #[test]
    fn test_render_leaves_unknown_placeholders() {
        let ctx = UserContext::new();
        assert_eq!(ctx.render("a/{{ missing }}/b"), "a/{{ missing }}/b");
        assert_eq!(ctx.render("no placeholders"), "no placeholders");
    }
}
