use anyhow::{bail, Result};
use std::fmt;
use std::path::{Path, PathBuf};

/// One kernel module to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleBuildTarget {
    /// Name for logging and selection on the command line.
    pub name: String,
    /// Artifacts the build is expected to produce (e.g. `foo.ko`).
    pub targets: Vec<PathBuf>,
    /// Module sources. The first one's directory is the kernel build's
    /// working directory.
    pub sources: Vec<PathBuf>,
    /// Per-module keep-going override; `None` follows the global option.
    pub keep_going: Option<bool>,
}

impl ModuleBuildTarget {
    pub fn new(
        name: impl Into<String>,
        targets: impl IntoIterator<Item = impl Into<PathBuf>>,
        sources: impl IntoIterator<Item = impl Into<PathBuf>>,
    ) -> Self {
        Self {
            name: name.into(),
            targets: targets.into_iter().map(Into::into).collect(),
            sources: sources.into_iter().map(Into::into).collect(),
            keep_going: None,
        }
    }

    pub fn with_keep_going(mut self, keep_going: bool) -> Self {
        self.keep_going = Some(keep_going);
        self
    }

    /// Directory containing the first source.
    pub fn source_dir(&self) -> Result<&Path> {
        let Some(first) = self.sources.first() else {
            bail!("module '{}' has no sources", self.name);
        };
        match first.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => Ok(dir),
            _ => bail!(
                "module '{}': cannot determine source directory of '{}'",
                self.name,
                first.display()
            ),
        }
    }

    /// Target paths joined for diagnostics, falling back to the name.
    pub fn describe(&self) -> String {
        if self.targets.is_empty() {
            return self.name.clone();
        }
        self.targets
            .iter()
            .map(|t| t.display().to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for ModuleBuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_dir_is_parent_of_first_source() {
        let target = ModuleBuildTarget::new(
            "lams",
            ["/src/linux/lams/lamsx.ko"],
            ["/src/linux/lams/lamsx.c", "/src/linux/util/nidas_util.c"],
        );
        assert_eq!(target.source_dir().unwrap(), Path::new("/src/linux/lams"));
    }

    #[test]
    fn test_source_dir_requires_sources() {
        let target = ModuleBuildTarget::new("empty", ["x.ko"], Vec::<PathBuf>::new());
        assert!(target.source_dir().is_err());
    }

    #[test]
    fn test_source_dir_rejects_bare_filename() {
        let target = ModuleBuildTarget::new("bare", ["x.ko"], ["x.c"]);
        assert!(target.source_dir().is_err());
    }

    #[test]
    fn test_describe() {
        let target = ModuleBuildTarget::new("a2d", ["a.ko", "b.ko"], ["d/a.c"]);
        assert_eq!(target.describe(), "a.ko b.ko");
        let unnamed = ModuleBuildTarget::new("a2d", Vec::<PathBuf>::new(), ["d/a.c"]);
        assert_eq!(unnamed.describe(), "a2d");
    }
}
