//! Build configuration registry and project file loading.
//!
//! - [`BuildConfiguration`] - the key/value registry every tool setup
//!   function reads and writes
//! - [`project`] - the `kbuild.toml` project file

pub mod project;

use anyhow::{bail, Result};
use std::collections::BTreeMap;

pub use project::Project;

/// Generic kernel directory key.
pub const KERNELDIR: &str = "KERNELDIR";
/// Kernel module build command.
pub const KMAKE: &str = "KMAKE";
/// Extra C flags handed to the kernel build verbatim.
pub const KCFLAGS: &str = "KCFLAGS";
/// Target architecture name as given by the user (e.g. `armel`).
pub const ARCH: &str = "ARCH";
/// Target machine identifier (e.g. `viper`).
pub const MACH: &str = "MACH";
/// `ARCH=` value for the kernel build system (e.g. `arm`).
pub const KERNEL_ARCH: &str = "KERNEL_ARCH";
/// Toolchain executable prefix (e.g. `arm-linux-`).
pub const CROSS_COMPILE: &str = "CROSS_COMPILE";
/// Host OS tag used in variant directory names.
pub const VARIANT_OS: &str = "VARIANT_OS";

/// Settings for one build invocation.
///
/// Tool setup functions take this by reference and mutate it in turn;
/// there is no process-wide copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildConfiguration {
    vars: BTreeMap<String, String>,
}

impl BuildConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Value of `key` if it is set to something other than the empty string.
    pub fn get_nonempty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|value| !value.is_empty())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Set `key` only if it has no value yet.
    pub fn set_default(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.entry(key.into()).or_insert_with(|| value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.vars.remove(key)
    }

    /// Apply `KEY=VALUE` overrides, as given on the command line.
    pub fn apply_overrides<S: AsRef<str>>(&mut self, overrides: &[S]) -> Result<()> {
        for raw in overrides {
            let (key, value) = parse_assignment(raw.as_ref())?;
            self.set(key, value);
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for BuildConfiguration {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Split `KEY=VALUE`. The value may be empty; the key may not.
pub fn parse_assignment(raw: &str) -> Result<(&str, &str)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("invalid variable assignment '{}': expected KEY=VALUE", raw);
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("invalid variable assignment '{}': empty key", raw);
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        bail!("invalid variable name '{}'", key);
    }
    Ok((key, value))
}
