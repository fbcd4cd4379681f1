//! Configuration store - dotted-key access over a nested YAML tree

use crate::core::error::{PipelineError, Result};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeSet;
use tracing::info;

/// Read-mostly key/value source of truth for templated values.
///
/// Keys are dotted paths into a nested mapping (`environments.local.host`).
/// After startup the only mutation is [`ConfigStore::set_answer`], which
/// records a confirmation answer exactly once per key.
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    root: Mapping,
    answered: BTreeSet<String>,
}

impl ConfigStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store from a nested mapping
    pub fn from_mapping(root: Mapping) -> Self {
        Self {
            root,
            answered: BTreeSet::new(),
        }
    }

    /// Look up a dotted key
    pub fn get(&self, key: &str) -> Option<&Value> {
        let mut segments = key.split('.');
        let first = segments.next()?;
        let mut current = self.root.get(first)?;
        for segment in segments {
            current = current.as_mapping()?.get(segment)?;
        }
        Some(current)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Look up a dotted key and render it as a string (scalars only)
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).and_then(scalar_to_string)
    }

    /// Look up a boolean flag. Strings such as "yes" or "true" count as true.
    pub fn get_flag(&self, key: &str) -> bool {
        match self.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => matches!(s.to_lowercase().as_str(), "y" | "yes" | "true"),
            _ => false,
        }
    }

    /// Insert a value at a dotted key, creating intermediate mappings.
    ///
    /// Used while the store is being populated at startup.
    pub fn set(&mut self, key: &str, value: Value) {
        let segments: Vec<&str> = key.split('.').collect();
        insert_path(&mut self.root, &segments, value);
    }

    /// Record a confirmation answer.
    ///
    /// Each key may be answered once per run; later templates see the value.
    pub fn set_answer(&mut self, key: &str, value: Value, secret: bool) -> Result<()> {
        if !self.answered.insert(key.to_string()) {
            return Err(PipelineError::InvalidInput {
                key: key.to_string(),
                reason: "already answered in this run".to_string(),
            });
        }

        if secret {
            info!("Captured answer for '{}' (hidden)", key);
        } else {
            info!("Captured answer for '{}': {}", key, scalar_to_string(&value).unwrap_or_default());
        }

        self.set(key, value);
        Ok(())
    }

    /// Whether a key was captured through a confirmation answer
    pub fn is_answered(&self, key: &str) -> bool {
        self.answered.contains(key)
    }

    /// Deep-merge another mapping on top of this store
    pub fn merge(&mut self, overlay: &Mapping) {
        merge_mapping(&mut self.root, overlay);
    }

    /// The full nested tree
    pub fn as_mapping(&self) -> &Mapping {
        &self.root
    }

    /// Every string leaf as (dotted key, raw value), sorted by key
    pub fn string_leaves(&self) -> Vec<(String, String)> {
        let mut leaves = Vec::new();
        collect_string_leaves(&self.root, "", &mut leaves);
        leaves.sort();
        leaves
    }
}

/// Render a scalar YAML value as a string
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

fn insert_path(mapping: &mut Mapping, segments: &[&str], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    let key = Value::String(head.to_string());

    if rest.is_empty() {
        mapping.insert(key, value);
        return;
    }

    let child = mapping
        .entry(key)
        .or_insert_with(|| Value::Mapping(Mapping::new()));
    if !child.is_mapping() {
        *child = Value::Mapping(Mapping::new());
    }
    if let Value::Mapping(child) = child {
        insert_path(child, rest, value);
    }
}

pub(crate) fn merge_mapping(base: &mut Mapping, overlay: &Mapping) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(Value::Mapping(existing)), Value::Mapping(incoming)) => {
                merge_mapping(existing, incoming);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

fn collect_string_leaves(mapping: &Mapping, prefix: &str, out: &mut Vec<(String, String)>) {
    for (key, value) in mapping {
        let Some(key) = key.as_str() else { continue };
        let path = if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            Value::String(s) => out.push((path, s.clone())),
            Value::Mapping(child) => collect_string_leaves(child, &path, out),
            Value::Sequence(items) => {
                for (i, item) in items.iter().enumerate() {
                    if let Value::String(s) = item {
                        out.push((format!("{}.{}", path, i), s.clone()));
                    }
                }
            }
            _ => {}
        }
    }
}
