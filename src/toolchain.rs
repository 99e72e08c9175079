//! Target architectures and their cross toolchains.
//!
//! Only the toolchain *identity* lives here: which `ARCH=` the kernel build
//! wants and which executable prefix the cross compiler uses. Compiler flags
//! are opaque configuration (`KCFLAGS`) and are never chosen here.

use anyhow::{bail, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::{BuildConfiguration, ARCH, CROSS_COMPILE, KERNEL_ARCH, VARIANT_OS};

/// A build target architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetArch {
    /// Native build for the machine running the builder.
    Host,
    X86,
    X86_64,
    /// Little-endian ARM, old ABI (Arcom Viper/Titan class boards).
    Arm,
    /// Little-endian ARM EABI, soft float.
    Armel,
    /// Little-endian ARM EABI, hard float.
    Armhf,
    /// Big-endian ARM (Vulcan class boards).
    Armbe,
}

impl TargetArch {
    pub const ALL: &'static [TargetArch] = &[
        TargetArch::Host,
        TargetArch::X86,
        TargetArch::X86_64,
        TargetArch::Arm,
        TargetArch::Armel,
        TargetArch::Armhf,
        TargetArch::Armbe,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TargetArch::Host => "host",
            TargetArch::X86 => "x86",
            TargetArch::X86_64 => "x86_64",
            TargetArch::Arm => "arm",
            TargetArch::Armel => "armel",
            TargetArch::Armhf => "armhf",
            TargetArch::Armbe => "armbe",
        }
    }

    pub fn is_native(self) -> bool {
        self.cross_compile_prefix().is_empty()
    }

    /// Value passed as `ARCH=` to the kernel build system.
    pub fn kernel_arch(self) -> &'static str {
        match self {
            TargetArch::Host => host_kernel_arch(),
            TargetArch::X86 | TargetArch::X86_64 => "x86",
            TargetArch::Arm | TargetArch::Armel | TargetArch::Armhf | TargetArch::Armbe => "arm",
        }
    }

    /// Toolchain executable prefix, empty for native builds.
    pub fn cross_compile_prefix(self) -> &'static str {
        match self {
            TargetArch::Host | TargetArch::X86 | TargetArch::X86_64 => "",
            TargetArch::Arm => "arm-linux-",
            TargetArch::Armel => "arm-linux-gnueabi-",
            TargetArch::Armhf => "arm-linux-gnueabihf-",
            TargetArch::Armbe => "armbe-linux-",
        }
    }
}

impl fmt::Display for TargetArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TargetArch {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        match wanted.as_str() {
            "native" => return Ok(TargetArch::Host),
            "amd64" => return Ok(TargetArch::X86_64),
            "i386" | "i686" => return Ok(TargetArch::X86),
            _ => {}
        }
        if let Some(arch) = TargetArch::ALL.iter().find(|arch| arch.name() == wanted) {
            return Ok(*arch);
        }
        let supported = TargetArch::ALL
            .iter()
            .map(|arch| arch.name())
            .collect::<Vec<_>>()
            .join(", ");
        bail!("unsupported arch '{}' (expected one of: {})", s, supported)
    }
}

fn host_kernel_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86" | "x86_64" => "x86",
        "arm" => "arm",
        "aarch64" => "arm64",
        "powerpc" | "powerpc64" => "powerpc",
        other => other,
    }
}

/// Store the toolchain identity for `arch` in `config`.
///
/// Values already present (from the project file or the command line) are
/// left alone.
pub fn setup_toolchain(config: &mut BuildConfiguration, arch: TargetArch) {
    config.set_default(ARCH, arch.name());
    config.set_default(KERNEL_ARCH, arch.kernel_arch());
    config.set_default(CROSS_COMPILE, arch.cross_compile_prefix());
}

/// Output directory for one target: `<build_root>/build_<arch>[_<os>]`.
pub fn variant_dir(build_root: &Path, arch: TargetArch, os_tag: Option<&str>) -> PathBuf {
    let name = match os_tag.map(str::trim).filter(|tag| !tag.is_empty()) {
        Some(tag) => format!("build_{}_{}", arch.name(), tag),
        None => format!("build_{}", arch.name()),
    };
    build_root.join(name)
}

/// [`variant_dir`] with the OS tag taken from `VARIANT_OS`.
pub fn config_variant_dir(
    config: &BuildConfiguration,
    build_root: &Path,
    arch: TargetArch,
) -> PathBuf {
    variant_dir(build_root, arch, config.get(VARIANT_OS))
}
