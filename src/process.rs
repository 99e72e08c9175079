//! Thin wrapper around `std::process::Command` for running external tools.
//!
//! Every external program the builder touches goes through [`Cmd`]. The
//! working directory of a command is always applied to the spawned child,
//! never to the calling process, so parallel builds cannot observe each
//! other's directories.
//!
//! # Example
//!
//! ```rust,no_run
//! use kmod_build::process::shell;
//!
//! # fn main() -> anyhow::Result<()> {
//! shell("make KERNELDIR=/usr/src/linux ARCH=arm")
//!     .current_dir("linux/lams")
//!     .run_interactive()?;
//! # Ok(())
//! # }
//! ```

use anyhow::{bail, Context, Result};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};

/// Builder for an external command.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
    dir: Option<PathBuf>,
    allow_fail: bool,
}

impl Cmd {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            dir: None,
            allow_fail: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Run the child in `dir`. The caller's own working directory is untouched.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Return the exit status instead of an error on non-zero exit.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    /// Human-readable rendering for diagnostics.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|s| s.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Run with inherited stdout/stderr so the user sees build progress.
    ///
    /// A non-zero exit is an error unless [`Cmd::allow_fail`] was set.
    pub fn run_interactive(self) -> Result<ExitStatus> {
        let status = self
            .command()
            .stdin(Stdio::null())
            .status()
            .with_context(|| format!("failed to spawn '{}'", self.display()))?;

        if !status.success() && !self.allow_fail {
            bail!("command failed: {} ({})", self.display(), status);
        }

        Ok(status)
    }
}

/// A `sh -c <script>` command.
pub fn shell(script: &str) -> Cmd {
    Cmd::new("sh").arg("-c").arg(script)
}

/// Locate a program on `PATH` (or check an explicit path).
pub fn which(program: &str) -> Option<String> {
    ::which::which(program)
        .ok()
        .map(|path| path.display().to_string())
}

pub fn exists(program: &str) -> bool {
    which(program).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_nonzero_exit_is_error_by_default() {
        let err = shell("exit 3").run_interactive().unwrap_err();
        let msg = format!("{:#}", err);
        assert!(msg.contains("command failed"));
        assert!(msg.contains("exit 3"));
    }

    #[test]
    fn test_allow_fail_returns_status() {
        let status = shell("exit 2").allow_fail().run_interactive().unwrap();
        assert!(!status.success());
        assert_eq!(status.code(), Some(2));
    }

    #[test]
    fn test_current_dir_applies_to_child_only() {
        let dir = tempfile::tempdir().unwrap();
        let before = std::env::current_dir().unwrap();

        shell("pwd > where")
            .current_dir(dir.path())
            .run_interactive()
            .unwrap();

        let recorded = fs::read_to_string(dir.path().join("where")).unwrap();
        let reported = fs::canonicalize(recorded.trim()).unwrap();
        assert_eq!(reported, fs::canonicalize(dir.path()).unwrap());
        assert_eq!(std::env::current_dir().unwrap(), before);
    }

    #[test]
    fn test_display() {
        assert_eq!(shell("make modules").display(), "sh -c make modules");
    }

    #[test]
    fn test_exists() {
        assert!(exists("sh"));
        assert!(!exists("definitely_not_a_real_command_12345"));
    }
}
