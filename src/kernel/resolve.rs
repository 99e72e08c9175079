//! Kernel directory resolution.
//!
//! A machine-specific `KERNELDIR_<mach>_<arch>` wins over the generic
//! `KERNELDIR`. Nothing here fails: an unresolved directory is reported as
//! `None` and the module builder decides what that means.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::{BuildConfiguration, KERNELDIR};

/// `KERNELDIR` value meaning "use the kernel tree found at build time".
pub const KERNELDIR_AUTO: &str = "*";

const MODULES_ROOT: &str = "/lib/modules";
const OSRELEASE: &str = "/proc/sys/kernel/osrelease";

/// Lookup key for a machine/arch specific kernel directory.
pub fn kerneldir_key(mach: &str, arch: &str) -> String {
    format!("{}_{}_{}", KERNELDIR, mach, arch)
}

/// Resolve the kernel directory for `arch`/`mach`.
pub fn resolve<'a>(config: &'a BuildConfiguration, arch: &str, mach: &str) -> Option<&'a str> {
    let key = kerneldir_key(mach, arch);
    if let Some(dir) = config.get_nonempty(&key) {
        debug!(%key, dir, "using machine-specific kernel directory");
        return Some(dir);
    }
    let generic = config.get(KERNELDIR);
    debug!(%key, generic = ?generic, "no machine-specific kernel directory");
    generic
}

/// Resolve and store the result back into `KERNELDIR`.
///
/// When nothing resolves, `KERNELDIR` is removed so the builder skips.
pub fn apply_kernel_dir(config: &mut BuildConfiguration, arch: &str, mach: &str) -> Option<String> {
    match resolve(config, arch, mach).map(str::to_owned) {
        Some(dir) => {
            config.set(KERNELDIR, dir.clone());
            Some(dir)
        }
        None => {
            config.remove(KERNELDIR);
            None
        }
    }
}

/// Expand the [`KERNELDIR_AUTO`] sentinel.
///
/// Native builds use the running kernel's `build` tree when it exists.
/// Cross builds cannot use the host kernel, so the sentinel becomes empty.
/// Any other value is returned untouched.
pub fn discover_kernel_dir(value: &str, native: bool) -> String {
    let release = fs::read_to_string(OSRELEASE).ok();
    discover_in(
        value,
        native,
        Path::new(MODULES_ROOT),
        release.as_deref().map(str::trim),
    )
}

fn discover_in(value: &str, native: bool, modules_root: &Path, release: Option<&str>) -> String {
    if value != KERNELDIR_AUTO {
        return value.to_string();
    }
    if !native {
        debug!("kernel directory auto-discovery is native only");
        return String::new();
    }
    match release.map(|release| running_build_dir(modules_root, release)) {
        Some(dir) if dir.is_dir() => dir.display().to_string(),
        _ => {
            debug!("no kernel build tree found for the running kernel");
            String::new()
        }
    }
}

fn running_build_dir(modules_root: &Path, release: &str) -> PathBuf {
    modules_root.join(release).join("build")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(entries: &[(&str, &str)]) -> BuildConfiguration {
        entries.iter().copied().collect()
    }

    #[test]
    fn test_kerneldir_key() {
        assert_eq!(kerneldir_key("viper", "arm"), "KERNELDIR_viper_arm");
    }

    #[test]
    fn test_machine_specific_wins() {
        let config = config(&[
            ("KERNELDIR", "/usr/src/linux"),
            ("KERNELDIR_viper_arm", "/opt/arcom/linux-viper"),
        ]);
        assert_eq!(
            resolve(&config, "arm", "viper"),
            Some("/opt/arcom/linux-viper")
        );
    }

    #[test]
    fn test_falls_back_to_generic_unchanged() {
        let config = config(&[
            ("KERNELDIR", KERNELDIR_AUTO),
            ("KERNELDIR_titan_armbe", "/opt/titan/linux"),
        ]);
        assert_eq!(resolve(&config, "arm", "viper"), Some(KERNELDIR_AUTO));
        assert_eq!(resolve(&config, "armbe", "vulcan"), Some(KERNELDIR_AUTO));
    }

    #[test]
    fn test_empty_override_falls_back() {
        let config = config(&[("KERNELDIR", "/generic"), ("KERNELDIR_viper_arm", "")]);
        assert_eq!(resolve(&config, "arm", "viper"), Some("/generic"));
    }

    #[test]
    fn test_nothing_configured() {
        let config = BuildConfiguration::new();
        assert_eq!(resolve(&config, "x86", "default"), None);
    }

    #[test]
    fn test_apply_kernel_dir() {
        let mut cfg = config(&[("KERNELDIR_viper_arm", "/opt/viper")]);
        assert_eq!(
            apply_kernel_dir(&mut cfg, "arm", "viper").as_deref(),
            Some("/opt/viper")
        );
        assert_eq!(cfg.get(KERNELDIR), Some("/opt/viper"));

        let mut cfg = config(&[("KERNELDIR_viper_arm", "/opt/viper")]);
        assert_eq!(apply_kernel_dir(&mut cfg, "armel", "viper"), None);
        assert!(!cfg.contains(KERNELDIR));
    }

    #[test]
    fn test_discover_passes_explicit_values_through() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            discover_in("/opt/linux", true, dir.path(), None),
            "/opt/linux"
        );
        assert_eq!(discover_in("", true, dir.path(), None), "");
    }

    #[test]
    fn test_discover_running_kernel() {
        let dir = tempfile::tempdir().unwrap();
        let build = dir.path().join("6.1.0-test/build");
        fs::create_dir_all(&build).unwrap();

        let found = discover_in(KERNELDIR_AUTO, true, dir.path(), Some("6.1.0-test"));
        assert_eq!(found, build.display().to_string());

        assert_eq!(
            discover_in(KERNELDIR_AUTO, true, dir.path(), Some("5.4.0-missing")),
            ""
        );
        assert_eq!(
            discover_in(KERNELDIR_AUTO, false, dir.path(), Some("6.1.0-test")),
            ""
        );
    }
}
