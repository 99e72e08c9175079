//! Kernel module builds through the external kernel build system.
//!
//! # Usage
//!
//! ```rust,no_run
//! use kmod_build::config::BuildConfiguration;
//! use kmod_build::kernel::{build_module, ModuleBuildTarget, ModuleOutcome};
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut config = BuildConfiguration::new();
//! config.set("KERNELDIR", "/opt/arcom/src/linux");
//! config.set("KMAKE", "make KERNELDIR=/opt/arcom/src/linux ARCH=arm");
//!
//! let target = ModuleBuildTarget::new("lams", ["linux/lams/lamsx.ko"], ["linux/lams/lamsx.c"]);
//! match build_module(&config, &target)? {
//!     ModuleOutcome::Skipped => println!("no kernel headers configured"),
//!     ModuleOutcome::Succeeded => println!("built"),
//!     ModuleOutcome::Failed { command, .. } => println!("failed: {}", command),
//! }
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use std::fmt;

use tracing::{error, info, warn};

use super::target::ModuleBuildTarget;
use crate::config::{BuildConfiguration, CROSS_COMPILE, KCFLAGS, KERNELDIR, KERNEL_ARCH, KMAKE};
use crate::process;

/// Terminal state of one module build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleOutcome {
    /// No kernel directory configured; nothing was run.
    Skipped,
    Succeeded,
    /// The build command exited non-zero. `code` is `None` when the
    /// command was killed by a signal.
    Failed { command: String, code: Option<i32> },
}

impl ModuleOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ModuleOutcome::Failed { .. })
    }
}

impl fmt::Display for ModuleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleOutcome::Skipped => write!(f, "skipped"),
            ModuleOutcome::Succeeded => write!(f, "ok"),
            ModuleOutcome::Failed {
                code: Some(code), ..
            } => write!(f, "failed (exit {})", code),
            ModuleOutcome::Failed { code: None, .. } => write!(f, "failed (signal)"),
        }
    }
}

/// Whether `config` names a kernel directory to build against.
///
/// When it does not, [`build_module`] skips without running anything.
pub fn kernel_dir_configured(config: &BuildConfiguration) -> bool {
    config.get_nonempty(KERNELDIR).is_some()
}

/// Build one kernel module.
///
/// Runs `KMAKE` through `sh -c` in the directory of the first source. The
/// directory change happens in the child only.
///
/// # Errors
///
/// Returns an error if the target has no usable source directory, if
/// `KMAKE` is missing while `KERNELDIR` is set, or if the shell cannot be
/// spawned. A command that runs and exits non-zero is
/// [`ModuleOutcome::Failed`], not an error.
pub fn build_module(
    config: &BuildConfiguration,
    target: &ModuleBuildTarget,
) -> Result<ModuleOutcome> {
    let source_dir = target.source_dir()?;

    if !kernel_dir_configured(config) {
        warn!(
            module = %target.name,
            "{} not configured, skipping build of {}",
            KERNELDIR,
            target.describe()
        );
        return Ok(ModuleOutcome::Skipped);
    }

    let command = config
        .get_nonempty(KMAKE)
        .with_context(|| format!("{} is set but {} is not configured", KERNELDIR, KMAKE))?;

    info!(module = %target.name, dir = %source_dir.display(), "{}", command);

    let status = process::shell(command)
        .current_dir(source_dir)
        .allow_fail()
        .run_interactive()
        .with_context(|| format!("building kernel module '{}'", target.name))?;

    if status.success() {
        info!(module = %target.name, "built {}", target.describe());
        return Ok(ModuleOutcome::Succeeded);
    }

    error!(module = %target.name, %status, "kernel module build failed: {}", command);
    Ok(ModuleOutcome::Failed {
        command: command.to_string(),
        code: status.code(),
    })
}

/// Compose the kernel build command from configuration.
///
/// Produces `make KERNELDIR=<dir> [KCFLAGS="<flags>"] [ARCH=<arch>]
/// [CROSS_COMPILE=<prefix>]`, or `None` when no kernel directory is set.
pub fn compose_kmake(config: &BuildConfiguration) -> Option<String> {
    let kerneldir = config.get_nonempty(KERNELDIR)?;

    let mut command = format!("make {}={}", KERNELDIR, kerneldir);
    if let Some(flags) = config.get_nonempty(KCFLAGS) {
        command.push_str(&format!(" {}=\"{}\"", KCFLAGS, flags.replace('"', "\\\"")));
    }
    if let Some(arch) = config.get_nonempty(KERNEL_ARCH) {
        command.push_str(&format!(" ARCH={}", arch));
    }
    if let Some(prefix) = config.get_nonempty(CROSS_COMPILE) {
        command.push_str(&format!(" {}={}", CROSS_COMPILE, prefix));
    }
    Some(command)
}

/// Store the composed `KMAKE` unless one is configured explicitly.
pub fn setup_kmake(config: &mut BuildConfiguration) {
    if config.get_nonempty(KMAKE).is_some() {
        return;
    }
    if let Some(command) = compose_kmake(config) {
        config.set(KMAKE, command);
    }
}
