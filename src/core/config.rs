//! Pipeline configuration from layered YAML

use crate::core::error::{PipelineError, Result};
use crate::core::store::{merge_mapping, ConfigStore};
use crate::core::template::check_termination;
use crate::core::version::ReleaseVersion;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Configuration shipped with the binary
pub const DEFAULT_CONFIG: &str = include_str!("defaults.yaml");

/// Project identity; values here override the manifest
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Path to a `package.json`-style manifest with `name` and `version`
    #[serde(default)]
    pub manifest: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub version: Option<String>,
}

/// Typed runtime settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Timeout for local build actions
    pub command_timeout_secs: u64,

    /// Timeout for each remote copy or command
    pub remote_timeout_secs: u64,

    /// Timeout for each SQL script
    pub sql_timeout_secs: u64,

    /// How many times an empty required answer is asked again
    pub prompt_retries: u32,

    /// Poll interval for the watch loop
    pub watch_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            command_timeout_secs: 1800,
            remote_timeout_secs: 300,
            sql_timeout_secs: 300,
            prompt_retries: 0,
            watch_interval_ms: 500,
        }
    }
}

/// Top-level configuration after all layers are merged
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub project: ProjectConfig,

    #[serde(default)]
    pub settings: Settings,

    /// Free-form values that populate the config store
    #[serde(default)]
    pub variables: Mapping,
}

/// Project manifest (`package.json`)
#[derive(Debug, Clone, Deserialize)]
struct Manifest {
    name: String,
    version: String,
}

/// Builds a [`PipelineConfig`] from the embedded defaults plus overlays
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    merged: Mapping,
    overrides: Vec<(String, String)>,
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Start from the embedded defaults
    pub fn new() -> Result<Self> {
        let merged = parse_mapping(DEFAULT_CONFIG, "built-in defaults")?;
        Ok(Self {
            merged,
            overrides: Vec::new(),
            base_dir: PathBuf::from("."),
        })
    }

    /// Start from an empty configuration (no defaults)
    pub fn empty() -> Self {
        Self {
            merged: Mapping::new(),
            overrides: Vec::new(),
            base_dir: PathBuf::from("."),
        }
    }

    /// Directory that relative manifest paths are resolved against
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    /// Merge a YAML document on top of the current layers
    pub fn layer_yaml(mut self, yaml: &str) -> Result<Self> {
        let overlay = parse_mapping(yaml, "configuration overlay")?;
        merge_mapping(&mut self.merged, &overlay);
        Ok(self)
    }

    /// Merge a YAML file on top of the current layers
    pub fn layer_file<P: AsRef<Path>>(self, path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::io(format!("Failed to read {}", path.display()), e))?;
        info!("Loaded configuration layer {}", path.display());
        self.layer_yaml(&content)
    }

    /// Merge a YAML file if it exists
    pub fn layer_file_if_exists<P: AsRef<Path>>(self, path: P) -> Result<Self> {
        if path.as_ref().exists() {
            self.layer_file(path)
        } else {
            debug!("No configuration at {}", path.as_ref().display());
            Ok(self)
        }
    }

    /// Override a single variable (`key=value` from the command line)
    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.push((key.into(), value.into()));
        self
    }

    /// Produce the merged configuration
    pub fn load(self) -> Result<LoadedConfig> {
        let config: PipelineConfig = serde_yaml::from_value(Value::Mapping(self.merged))
            .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
        Ok(LoadedConfig {
            config,
            overrides: self.overrides,
            base_dir: self.base_dir,
        })
    }
}

/// Merged configuration that has not been turned into a store yet
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: PipelineConfig,
    overrides: Vec<(String, String)>,
    base_dir: PathBuf,
}

impl LoadedConfig {
    pub fn settings(&self) -> &Settings {
        &self.config.settings
    }

    /// Build the config store: variables, overrides, then the values derived
    /// from the project name and version.
    ///
    /// Fails before any task can run when the version is malformed or a
    /// value expands without terminating.
    pub fn into_store(self) -> Result<ConfigStore> {
        let (name, version) = self.project_identity()?;
        let release = ReleaseVersion::parse(&version)?;

        let mut store = ConfigStore::from_mapping(self.config.variables);
        for (key, value) in &self.overrides {
            store.set(key, Value::String(value.clone()));
        }

        store.set("pkg.name", Value::String(name.clone()));
        store.set("pkg.version", Value::String(release.to_string()));
        store.set("app_name", Value::String(capitalize(&name)));
        store.set("app_version", Value::String(release.version()));
        store.set("app_release", Value::String(release.release()));

        check_termination(&store)?;

        info!("Configured {} {} (release {})", name, release.version(), release.release());
        Ok(store)
    }

    fn project_identity(&self) -> Result<(String, String)> {
        let project = &self.config.project;

        let manifest = match (&project.name, &project.version, &project.manifest) {
            (Some(_), Some(_), _) | (_, _, None) => None,
            (_, _, Some(path)) => Some(self.read_manifest(path)?),
        };

        let name = project
            .name
            .clone()
            .or_else(|| manifest.as_ref().map(|m| m.name.clone()))
            .ok_or_else(|| PipelineError::InvalidConfig("project name is not set".to_string()))?;
        let version = project
            .version
            .clone()
            .or_else(|| manifest.as_ref().map(|m| m.version.clone()))
            .ok_or_else(|| PipelineError::InvalidConfig("project version is not set".to_string()))?;

        if name.trim().is_empty() {
            return Err(PipelineError::InvalidConfig("project name is empty".to_string()));
        }

        Ok((name, version))
    }

    fn read_manifest(&self, path: &str) -> Result<Manifest> {
        let path = self.base_dir.join(path);
        let content = std::fs::read_to_string(&path)
            .map_err(|e| PipelineError::io(format!("Failed to read manifest {}", path.display()), e))?;
        serde_json::from_str(&content).map_err(|e| {
            PipelineError::InvalidConfig(format!("manifest {} is invalid: {}", path.display(), e))
        })
    }
}

fn parse_mapping(yaml: &str, origin: &str) -> Result<Mapping> {
    let value: Value = serde_yaml::from_str(yaml)
        .map_err(|e| PipelineError::InvalidConfig(format!("{}: {}", origin, e)))?;
    match value {
        Value::Mapping(mapping) => Ok(mapping),
        Value::Null => Ok(Mapping::new()),
        _ => Err(PipelineError::InvalidConfig(format!(
            "{}: expected a mapping at the top level",
            origin
        ))),
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
