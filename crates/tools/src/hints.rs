//! Display-hint templates.
//!
//! Templates substitute `{dotted.path}` placeholders against the typed,
//! decoded tool value. Rendered hints ride on `tool_start` stream events
//! and agent-tool prompts. Unresolved placeholders render empty rather
//! than erroring: hints are presentation, not contract.

use regex::Regex;
use serde_json::Value;

use arbor_domain::{Error, Result};

#[derive(Debug, Clone)]
pub struct HintTemplate {
    raw: String,
    placeholders: Regex,
}

impl HintTemplate {
    pub fn compile(raw: &str) -> Result<Self> {
        let placeholders = Regex::new(r"\{([A-Za-z0-9_.]+)\}")
            .map_err(|e| Error::execution(format!("invalid hint template: {e}")))?;
        Ok(Self {
            raw: raw.to_owned(),
            placeholders,
        })
    }

    pub fn source(&self) -> &str {
        &self.raw
    }

    pub fn render(&self, value: &Value) -> String {
        self.placeholders
            .replace_all(&self.raw, |caps: &regex::Captures<'_>| {
                lookup_path(value, &caps[1])
                    .map(render_scalar)
                    .unwrap_or_default()
            })
            .into_owned()
    }
}

fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, key| current.get(key))
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
