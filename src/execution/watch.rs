//! File watching by polling modification times

use crate::core::error::Result;
use crate::core::task::WatchRule;
use crate::local::fs::expand_patterns;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// Modification time and size of every watched file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    files: BTreeMap<PathBuf, (Option<SystemTime>, u64)>,
}

impl Snapshot {
    /// Capture the files matching `patterns` under `base`
    pub fn capture(base: &Path, patterns: &[String]) -> Result<Self> {
        let mut files = BTreeMap::new();
        for path in expand_patterns(base, patterns)? {
            if let Ok(meta) = std::fs::metadata(&path) {
                files.insert(path, (meta.modified().ok(), meta.len()));
            }
        }
        Ok(Self { files })
    }

    /// Files added, removed or modified since `earlier`
    pub fn changed_since(&self, earlier: &Snapshot) -> Vec<PathBuf> {
        let mut changed: Vec<PathBuf> = self
            .files
            .iter()
            .filter(|(path, stamp)| earlier.files.get(*path) != Some(*stamp))
            .map(|(path, _)| path.clone())
            .collect();
        changed.extend(
            earlier
                .files
                .keys()
                .filter(|path| !self.files.contains_key(*path))
                .cloned(),
        );
        changed.sort();
        changed
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Tracks each rule's files between polls
pub struct Watcher {
    base: PathBuf,
    rules: Vec<(WatchRule, Snapshot)>,
}

impl Watcher {
    /// Take the initial snapshot of every rule
    pub fn new(base: impl Into<PathBuf>, rules: &[WatchRule]) -> Result<Self> {
        let base = base.into();
        let rules = rules
            .iter()
            .map(|rule| Ok((rule.clone(), Snapshot::capture(&base, &rule.patterns)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { base, rules })
    }

    /// Rules whose files changed since the previous poll
    pub fn poll(&mut self) -> Result<Vec<WatchRule>> {
        let mut triggered = Vec::new();
        for (rule, snapshot) in &mut self.rules {
            let current = Snapshot::capture(&self.base, &rule.patterns)?;
            let changed = current.changed_since(snapshot);
            if !changed.is_empty() {
                debug!("Watch rule {} saw {} change(s)", rule.name, changed.len());
                triggered.push(rule.clone());
            }
            *snapshot = current;
        }
        Ok(triggered)
    }

    /// Number of files currently watched across all rules
    pub fn watched_files(&self) -> usize {
        self.rules.iter().map(|(_, s)| s.len()).sum()
    }
}
