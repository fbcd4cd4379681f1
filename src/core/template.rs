//! Template resolution for `<%= key %>` placeholders

use crate::core::error::{PipelineError, Result};
use crate::core::store::{scalar_to_string, ConfigStore};
use regex::Regex;
use serde_yaml::{Mapping, Value};
use std::sync::OnceLock;

/// Maximum nesting of placeholder expansion
pub const MAX_EXPANSION_DEPTH: usize = 10;

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<%=\s*([A-Za-z0-9_.\-]+)\s*%>").expect("placeholder regex is valid"))
}

/// Expands placeholders against a snapshot of a [`ConfigStore`].
///
/// A key's value may itself contain placeholders; those are expanded
/// recursively up to [`MAX_EXPANSION_DEPTH`].
pub struct TemplateResolver<'a> {
    store: &'a ConfigStore,
}

impl<'a> TemplateResolver<'a> {
    pub fn new(store: &'a ConfigStore) -> Self {
        Self { store }
    }

    /// Resolve every placeholder in `template`
    pub fn resolve(&self, template: &str) -> Result<String> {
        let mut chain = Vec::new();
        self.expand(template, template, 0, &mut chain)
    }

    /// Resolve a list of templates
    pub fn resolve_all(&self, templates: &[String]) -> Result<Vec<String>> {
        templates.iter().map(|t| self.resolve(t)).collect()
    }

    /// Resolve the value stored at `key`
    pub fn resolve_key(&self, key: &str) -> Result<String> {
        let template = format!("<%= {} %>", key);
        self.resolve(&template)
    }

    /// Resolve every string inside a value, keeping its shape
    pub fn resolve_value(&self, value: &Value) -> Result<Value> {
        Ok(match value {
            Value::String(s) => Value::String(self.resolve(s)?),
            Value::Sequence(items) => Value::Sequence(
                items
                    .iter()
                    .map(|item| self.resolve_value(item))
                    .collect::<Result<_>>()?,
            ),
            Value::Mapping(mapping) => {
                let mut resolved = Mapping::new();
                for (key, item) in mapping {
                    resolved.insert(key.clone(), self.resolve_value(item)?);
                }
                Value::Mapping(resolved)
            }
            other => other.clone(),
        })
    }

    /// Whether the string contains any placeholder
    pub fn has_placeholders(text: &str) -> bool {
        placeholder_regex().is_match(text)
    }

    fn expand(
        &self,
        text: &str,
        origin: &str,
        depth: usize,
        chain: &mut Vec<String>,
    ) -> Result<String> {
        if !Self::has_placeholders(text) {
            return Ok(text.to_string());
        }

        if depth >= MAX_EXPANSION_DEPTH {
            return Err(PipelineError::ExpansionDepthExceeded {
                template: origin.to_string(),
                depth: MAX_EXPANSION_DEPTH,
                chain: chain.join(" -> "),
            });
        }

        let mut output = String::with_capacity(text.len());
        let mut last = 0;

        for captures in placeholder_regex().captures_iter(text) {
            let Some(whole) = captures.get(0) else { continue };
            let key = &captures[1];

            output.push_str(&text[last..whole.start()]);

            let raw = self.lookup(key, origin)?;
            chain.push(key.to_string());
            let expanded = self.expand(&raw, origin, depth + 1, chain)?;
            chain.pop();

            output.push_str(&expanded);
            last = whole.end();
        }
        output.push_str(&text[last..]);

        Ok(output)
    }

    /// Walk every placeholder reachable from `template` without building the
    /// result. Missing keys are passed over so later placeholders are still
    /// checked against the depth bound.
    pub fn check_expansion(&self, template: &str) -> Result<()> {
        let mut chain = Vec::new();
        self.walk(template, template, 0, &mut chain)
    }

    fn walk(&self, text: &str, origin: &str, depth: usize, chain: &mut Vec<String>) -> Result<()> {
        if !Self::has_placeholders(text) {
            return Ok(());
        }

        if depth >= MAX_EXPANSION_DEPTH {
            return Err(PipelineError::ExpansionDepthExceeded {
                template: origin.to_string(),
                depth: MAX_EXPANSION_DEPTH,
                chain: chain.join(" -> "),
            });
        }

        for captures in placeholder_regex().captures_iter(text) {
            let key = &captures[1];
            let raw = match self.lookup(key, origin) {
                Ok(raw) => raw,
                Err(PipelineError::MissingConfigKey { .. }) => continue,
                Err(e) => return Err(e),
            };
            chain.push(key.to_string());
            self.walk(&raw, origin, depth + 1, chain)?;
            chain.pop();
        }
        Ok(())
    }

    fn lookup(&self, key: &str, origin: &str) -> Result<String> {
        let value = self
            .store
            .get(key)
            .ok_or_else(|| PipelineError::MissingConfigKey {
                key: key.to_string(),
                template: origin.to_string(),
            })?;

        scalar_to_string(value).ok_or_else(|| {
            PipelineError::InvalidConfig(format!(
                "'{}' refers to a mapping or list and cannot be substituted into '{}'",
                key, origin
            ))
        })
    }
}

/// Check that every string value in the store expands without hitting the
/// depth bound. Keys that are missing are ignored here since they may be
/// supplied later by a confirmation answer.
pub fn check_termination(store: &ConfigStore) -> Result<()> {
    let resolver = TemplateResolver::new(store);
    for (_key, raw) in store.string_leaves() {
        resolver.check_expansion(&raw)?;
    }
    Ok(())
}
