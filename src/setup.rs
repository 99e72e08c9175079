//! Tool setup chain.
//!
//! Each step reads what earlier steps (or the user) put in the
//! configuration and adds its own keys: toolchain identity, then the kernel
//! directory, then the `KMAKE` command built from both.

use tracing::debug;

use crate::config::{BuildConfiguration, KERNELDIR, MACH};
use crate::kernel::{apply_kernel_dir, discover_kernel_dir, setup_kmake, KERNELDIR_AUTO};
use crate::toolchain::{setup_toolchain, TargetArch};

/// Machine identifier used when none is configured.
pub const DEFAULT_MACH: &str = "default";

/// Run all tool setup steps for `arch`/`mach` on `config`.
pub fn configure(config: &mut BuildConfiguration, arch: TargetArch, mach: &str) {
    config.set(MACH, mach);
    setup_toolchain(config, arch);

    if let Some(dir) = apply_kernel_dir(config, arch.name(), mach) {
        if dir == KERNELDIR_AUTO {
            let found = discover_kernel_dir(&dir, arch.is_native());
            debug!(arch = %arch, found = %found, "expanded {}", KERNELDIR_AUTO);
            config.set(KERNELDIR, found);
        }
    }

    setup_kmake(config);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CROSS_COMPILE, KMAKE};

    #[test]
    fn test_configure_cross_target() {
        let mut config: BuildConfiguration = [
            ("KERNELDIR", "/usr/src/linux"),
            ("KERNELDIR_viper_arm", "/opt/arcom/src/linux-viper"),
            ("KCFLAGS", "-Werror"),
        ]
        .into_iter()
        .collect();

        configure(&mut config, TargetArch::Arm, "viper");

        assert_eq!(config.get(KERNELDIR), Some("/opt/arcom/src/linux-viper"));
        assert_eq!(config.get(CROSS_COMPILE), Some("arm-linux-"));
        assert_eq!(config.get(MACH), Some("viper"));
        let kmake = concat!(
            "make KERNELDIR=/opt/arcom/src/linux-viper KCFLAGS=\"-Werror\" ",
            "ARCH=arm CROSS_COMPILE=arm-linux-"
        );
        assert_eq!(config.get(KMAKE), Some(kmake));
    }

    #[test]
    fn test_auto_kerneldir_is_empty_for_cross_targets() {
        let mut config: BuildConfiguration = [("KERNELDIR", KERNELDIR_AUTO)].into_iter().collect();
        configure(&mut config, TargetArch::Armbe, DEFAULT_MACH);

        assert_eq!(config.get(KERNELDIR), Some(""));
        assert_eq!(config.get(KMAKE), None);
    }

    #[test]
    fn test_unconfigured_kerneldir_leaves_no_kmake() {
        let mut config = BuildConfiguration::new();
        configure(&mut config, TargetArch::X86_64, DEFAULT_MACH);
        assert!(!config.contains(KERNELDIR));
        assert!(!config.contains(KMAKE));
    }
}
