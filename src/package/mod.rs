//! RPM package building
//!
//! Files are staged into a directory that mirrors the install layout, an RPM
//! spec is rendered around the staged tree and `rpmbuild` produces the binary
//! package under `{destination}/RPMS/{arch}`.

use crate::core::error::{PipelineError, Result};
use crate::core::store::{scalar_to_string, ConfigStore};
use crate::core::template::TemplateResolver;
use crate::local::{fs, CommandRunner, Invocation};
use serde::{Deserialize, Deserializer};
use serde_yaml::Value;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Config key holding the package description
pub const PACKAGE_KEY: &str = "package";

/// A set of files to include: glob patterns under `cwd`, installed to `dest`
#[derive(Debug, Clone, Deserialize)]
pub struct FileMapping {
    pub cwd: String,
    #[serde(deserialize_with = "one_or_many")]
    pub src: Vec<String>,
    pub dest: String,
    #[serde(default, deserialize_with = "optional_scalar")]
    pub mode: Option<String>,
}

/// Package metadata and contents, fully resolved
#[derive(Debug, Clone, Deserialize)]
pub struct PackageSpec {
    pub name: String,
    pub version: String,
    pub release: String,
    #[serde(default = "default_arch")]
    pub arch: String,
    pub summary: String,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub url: String,
    pub destination: String,
    #[serde(default)]
    pub post_install: Vec<String>,
    #[serde(default)]
    pub files: Vec<FileMapping>,
}

fn default_arch() -> String {
    "x86_64".to_string()
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

fn optional_scalar<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(scalar_to_string))
}

impl PackageSpec {
    /// Read the `package` section with every template resolved
    pub fn from_store(store: &ConfigStore) -> Result<Self> {
        let raw = store.get(PACKAGE_KEY).ok_or_else(|| PipelineError::MissingConfigKey {
            key: PACKAGE_KEY.to_string(),
            template: PACKAGE_KEY.to_string(),
        })?;

        let resolved = TemplateResolver::new(store).resolve_value(raw)?;
        serde_yaml::from_value(resolved)
            .map_err(|e| PipelineError::InvalidConfig(format!("package: {}", e)))
    }

    /// Anchor a relative destination and mapping directories at `base`
    pub fn rooted_at(mut self, base: &Path) -> Self {
        self.destination = base.join(&self.destination).to_string_lossy().into_owned();
        for mapping in &mut self.files {
            mapping.cwd = base.join(&mapping.cwd).to_string_lossy().into_owned();
        }
        self
    }

    /// `{name}-{version}-{release}.{arch}.rpm`
    pub fn file_name(&self) -> String {
        format!("{}-{}-{}.{}.rpm", self.name, self.version, self.release, self.arch)
    }

    /// Where rpmbuild leaves the finished package
    pub fn artifact_path(&self) -> PathBuf {
        Path::new(&self.destination)
            .join("RPMS")
            .join(&self.arch)
            .join(self.file_name())
    }

    fn stage_dir(&self) -> PathBuf {
        Path::new(&self.destination).join("stage")
    }
}

/// A file in the package: where it installs and its permissions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedFile {
    pub install_path: String,
    pub mode: Option<String>,
}

/// Copy every mapped file into `stage`, laid out at its install path.
///
/// A mapping whose `cwd` does not exist contributes nothing.
pub fn stage_files(spec: &PackageSpec, stage: &Path) -> Result<Vec<PackagedFile>> {
    let mut packaged = Vec::new();

    for mapping in &spec.files {
        let cwd = Path::new(&mapping.cwd);
        if !cwd.is_dir() {
            debug!("Skipping {}: not a directory", cwd.display());
            continue;
        }

        let dest = mapping.dest.trim_end_matches('/');
        let staged_dest = stage.join(dest.trim_start_matches('/'));

        for file in fs::expand_patterns(cwd, &mapping.src)? {
            let relative = file.strip_prefix(cwd).unwrap_or(&file);
            let target = staged_dest.join(relative);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| PipelineError::io(format!("Failed to create {}", parent.display()), e))?;
            }
            std::fs::copy(&file, &target).map_err(|e| {
                PipelineError::io(format!("Failed to stage {}", file.display()), e)
            })?;

            packaged.push(PackagedFile {
                install_path: format!("{}/{}", dest, relative.to_string_lossy()),
                mode: mapping.mode.clone(),
            });
        }
    }

    packaged.sort_by(|a, b| a.install_path.cmp(&b.install_path));
    packaged.dedup_by(|a, b| a.install_path == b.install_path);
    Ok(packaged)
}

/// Render the RPM spec file
pub fn render_spec(spec: &PackageSpec, stage: &Path, files: &[PackagedFile]) -> String {
    let mut out = String::new();

    let header = [
        ("Name", &spec.name),
        ("Version", &spec.version),
        ("Release", &spec.release),
        ("Summary", &spec.summary),
        ("License", &spec.license),
        ("Group", &spec.group),
        ("Vendor", &spec.vendor),
        ("URL", &spec.url),
        ("BuildArch", &spec.arch),
    ];
    for (tag, value) in header {
        if !value.is_empty() {
            let _ = writeln!(out, "{}: {}", tag, value);
        }
    }
    out.push_str("AutoReqProv: no\n\n");

    let _ = writeln!(out, "%description\n{}\n", spec.summary);

    out.push_str("%install\nmkdir -p %{buildroot}\n");
    let _ = writeln!(out, "cp -a \"{}/.\" %{{buildroot}}/\n", stage.display());

    if !spec.post_install.is_empty() {
        out.push_str("%post\n");
        for line in &spec.post_install {
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
    }

    out.push_str("%files\n%defattr(-,root,root)\n");
    for file in files {
        match &file.mode {
            Some(mode) => {
                let _ = writeln!(out, "%attr({}, root, root) \"{}\"", mode, file.install_path);
            }
            None => {
                let _ = writeln!(out, "\"{}\"", file.install_path);
            }
        }
    }

    out
}

/// Stages files, renders the spec and runs `rpmbuild`
pub struct PackageBuilder {
    runner: Arc<dyn CommandRunner>,
    timeout_secs: u64,
}

impl PackageBuilder {
    pub fn new(runner: Arc<dyn CommandRunner>, timeout_secs: u64) -> Self {
        Self { runner, timeout_secs }
    }

    /// Build the package and return the artifact path
    pub async fn build(&self, spec: &PackageSpec) -> Result<PathBuf> {
        let topdir = PathBuf::from(&spec.destination);
        let stage = spec.stage_dir();

        fs::clean(&[stage.clone()])?;
        let layout: Vec<PathBuf> = ["BUILD", "RPMS", "SOURCES", "SPECS", "SRPMS"]
            .iter()
            .map(|d| topdir.join(d))
            .chain(std::iter::once(stage.clone()))
            .collect();
        fs::create_dirs(&layout)?;

        let files = stage_files(spec, &stage)?;
        info!("Staged {} file(s) for {}", files.len(), spec.file_name());

        let spec_path = topdir.join("SPECS").join(format!("{}.spec", spec.name));
        std::fs::write(&spec_path, render_spec(spec, &stage, &files))
            .map_err(|e| PipelineError::io(format!("Failed to write {}", spec_path.display()), e))?;

        let invocation = Invocation::new("rpmbuild", self.timeout_secs)
            .arg("-bb")
            .arg("--define")
            .arg(format!("_topdir {}", topdir.display()))
            .arg(spec_path.to_string_lossy());

        let command = invocation.command_line();
        let output = self.runner.run(&invocation).await.map_err(|e| PipelineError::CommandFailed {
            command: command.clone(),
            exit_code: None,
            stderr: e.to_string(),
        })?;
        if !output.is_success() {
            return Err(PipelineError::CommandFailed {
                command,
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }

        let artifact = spec.artifact_path();
        info!("Built {}", artifact.display());
        Ok(artifact)
    }
}
