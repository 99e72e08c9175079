//! `kbuild.toml` project file.
//!
//! ```toml
//! [build]
//! arch = "armel"
//! mach = "viper"
//! jobs = 4
//! keep_going = false
//!
//! [variables]
//! KERNELDIR = "*"
//! KERNELDIR_viper_armel = "/opt/arcom/src/linux-viper"
//!
//! [[module]]
//! name = "ncar_a2d"
//! sources = ["linux/ncar_a2d/ncar_a2d.c"]
//! targets = ["linux/ncar_a2d/ncar_a2d.ko"]
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use super::BuildConfiguration;
use crate::kernel::ModuleBuildTarget;
use crate::setup::{configure, DEFAULT_MACH};
use crate::toolchain::TargetArch;

pub const PROJECT_FILENAME: &str = "kbuild.toml";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProjectToml {
    build: BuildToml,
    #[serde(default)]
    variables: BTreeMap<String, String>,
    #[serde(default, rename = "module")]
    modules: Vec<ModuleToml>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BuildToml {
    arch: String,
    mach: Option<String>,
    jobs: Option<usize>,
    keep_going: Option<bool>,
}

/// One `[[module]]` entry as written in the file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModuleToml {
    name: String,
    sources: Vec<String>,
    #[serde(default)]
    targets: Vec<String>,
    keep_going: Option<bool>,
}

/// A loaded project.
#[derive(Debug, Clone)]
pub struct Project {
    /// Directory relative module paths are resolved against.
    pub root: PathBuf,
    pub arch: TargetArch,
    pub mach: String,
    /// Parallel module builds; `0` means available parallelism.
    pub jobs: usize,
    pub keep_going: bool,
    pub variables: BTreeMap<String, String>,
    pub modules: Vec<ModuleBuildTarget>,
}

impl Project {
    /// Load a project file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading project file '{}'", path.display()))?;
        let root = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Self::parse(&content, root)
            .with_context(|| format!("parsing project file '{}'", path.display()))
    }

    /// Parse project file content; relative paths resolve against `root`.
    pub fn parse(content: &str, root: &Path) -> Result<Self> {
        let parsed: ProjectToml = toml::from_str(content)?;

        let arch: TargetArch = parsed.build.arch.parse()?;
        let mach = match parsed.build.mach.as_deref().map(str::trim) {
            None => DEFAULT_MACH.to_string(),
            Some("") => bail!("build.mach must not be empty"),
            Some(mach) => mach.to_string(),
        };

        let mut seen = HashSet::new();
        let mut modules = Vec::with_capacity(parsed.modules.len());
        for module in parsed.modules {
            let name = module.name.trim().to_string();
            if name.is_empty() {
                bail!("module with empty name");
            }
            if !seen.insert(name.clone()) {
                bail!("duplicate module '{}'", name);
            }
            if module.sources.is_empty() {
                bail!("module '{}' has no sources", name);
            }
            let mut target = ModuleBuildTarget::new(
                name,
                module.targets.iter().map(|t| resolve_path(root, t)),
                module.sources.iter().map(|s| resolve_path(root, s)),
            );
            target.keep_going = module.keep_going;
            modules.push(target);
        }

        Ok(Self {
            root: root.to_path_buf(),
            arch,
            mach,
            jobs: parsed.build.jobs.unwrap_or(0),
            keep_going: parsed.build.keep_going.unwrap_or(false),
            variables: parsed.variables,
            modules,
        })
    }

    /// Build the configuration for this project.
    ///
    /// File variables come first, then `KEY=VALUE` overrides, then the tool
    /// setup chain for the project's arch and mach.
    pub fn configuration<S: AsRef<str>>(&self, overrides: &[S]) -> Result<BuildConfiguration> {
        let mut config: BuildConfiguration = self
            .variables
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        config.apply_overrides(overrides)?;
        configure(&mut config, self.arch, &self.mach);
        Ok(config)
    }

    /// Modules named in `names`, or all modules when `names` is empty.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<ModuleBuildTarget>> {
        if names.is_empty() {
            return Ok(self.modules.clone());
        }
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.modules
                    .iter()
                    .find(|m| m.name == name)
                    .cloned()
                    .with_context(|| format!("no module named '{}' in project", name))
            })
            .collect()
    }
}

fn resolve_path(root: &Path, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    }
}
