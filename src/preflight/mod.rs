//! Preflight checks for module builds.
//!
//! Works out which host programs a configured build will shell out to and
//! fails before the first module starts if any of them is missing. A
//! configuration without a kernel directory runs nothing, so it needs nothing.
//!
//! # Example
//!
//! ```rust
//! use kmod_build::config::{BuildConfiguration, KERNELDIR, KMAKE};
//! use kmod_build::preflight::{check_build_host, required_tools};
//!
//! let config: BuildConfiguration = [(KERNELDIR, ""), (KMAKE, "make modules")]
//!     .into_iter()
//!     .collect();
//! assert!(required_tools(&config).is_empty());
//! assert!(check_build_host(&config).is_ok());
//! ```

use anyhow::{bail, Result};
use std::fmt;

use crate::config::{BuildConfiguration, CROSS_COMPILE, KERNELDIR, KMAKE};
use crate::process::exists;

/// Programs a kernel module build needs when no project is loaded.
pub const BASE_TOOLS: &[&str] = &["sh", "make"];

/// Words that `sh` runs itself; they are never looked up on `PATH`.
const SHELL_BUILTINS: &[&str] = &[
    ".", ":", "[", "cd", "echo", "eval", "exec", "exit", "export", "false", "kill", "printf",
    "set", "test", "true", "umask",
];

/// A host program and the setting that asks for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTool {
    pub program: String,
    pub wanted_by: String,
}

impl HostTool {
    fn new(program: impl Into<String>, wanted_by: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            wanted_by: wanted_by.into(),
        }
    }
}

impl fmt::Display for HostTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (needed by {})", self.program, self.wanted_by)
    }
}

/// Leading program of a `KMAKE` command line.
///
/// Leading `NAME=value` assignments are passed over. Returns `None` for an
/// empty command or one that starts with a shell builtin.
pub fn kmake_program(kmake: &str) -> Option<&str> {
    let word = kmake.split_whitespace().find(|word| !is_assignment(word))?;
    if SHELL_BUILTINS.contains(&word) {
        return None;
    }
    Some(word)
}

fn is_assignment(word: &str) -> bool {
    match word.split_once('=') {
        Some((name, _)) => {
            !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}

/// Host programs the builds described by `config` will run.
///
/// Empty when no kernel directory is configured, since every module is then
/// skipped without running anything.
pub fn required_tools(config: &BuildConfiguration) -> Vec<HostTool> {
    if config.get_nonempty(KERNELDIR).is_none() {
        return Vec::new();
    }

    let mut tools = vec![HostTool::new("sh", "module builds")];
    if let Some(program) = config.get_nonempty(KMAKE).and_then(kmake_program) {
        tools.push(HostTool::new(program, KMAKE));
    }
    if let Some(prefix) = config.get_nonempty(CROSS_COMPILE) {
        tools.push(HostTool::new(
            format!("{}gcc", prefix),
            format!("{}={}", CROSS_COMPILE, prefix),
        ));
    }
    tools
}

/// Fail with every missing program listed.
pub fn check_tools(tools: &[HostTool]) -> Result<()> {
    let missing: Vec<_> = tools.iter().filter(|tool| !exists(&tool.program)).collect();

    if !missing.is_empty() {
        let msg = missing
            .iter()
            .map(|tool| format!("  {}", tool))
            .collect::<Vec<_>>()
            .join("\n");
        bail!("Missing host tools:\n{}", msg);
    }

    Ok(())
}

/// Check the host against what `config` will run.
pub fn check_build_host(config: &BuildConfiguration) -> Result<()> {
    check_tools(&required_tools(config))
}
