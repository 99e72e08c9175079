//! Kernel module build orchestration for embedded Linux targets.
//!
//! Builds out-of-tree kernel modules for ARM boards and native x86 hosts by
//! driving the kernel's own build system:
//!
//! - **Configuration** - an explicit [`BuildConfiguration`] registry, loaded
//!   from a `kbuild.toml` project file plus command line overrides
//! - **Tool setup** - toolchain identity, kernel directory resolution and
//!   `KMAKE` composition ([`setup::configure`])
//! - **Module builds** - `KMAKE` run per module in the module's source
//!   directory ([`kernel::build_module`])
//! - **Scheduling** - parallel builds with halt or keep-going on failure
//!   ([`scheduler::run_builds`])
//!
//! # Architecture
//!
//! ```text
//! kbuild.toml + KEY=VALUE overrides
//!     │
//!     ▼
//! BuildConfiguration ── toolchain::setup_toolchain   (ARCH, KERNEL_ARCH, CROSS_COMPILE)
//!     │              ── kernel::apply_kernel_dir     (KERNELDIR_<mach>_<arch> → KERNELDIR)
//!     │              ── kernel::setup_kmake          (KMAKE)
//!     ▼
//! scheduler::run_builds ── kernel::build_module × N  (sh -c "$KMAKE" in each source dir)
//!     │
//!     ▼
//! BuildReport
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use kmod_build::config::Project;
//! use kmod_build::scheduler::{run_builds, BuildOptions};
//! use std::path::Path;
//!
//! # fn main() -> anyhow::Result<()> {
//! let project = Project::load(Path::new("kbuild.toml"))?;
//! let config = project.configuration(&["KCFLAGS=-Werror"])?;
//! let options = BuildOptions { jobs: project.jobs, keep_going: project.keep_going };
//! let report = run_builds(&config, &project.modules, &options);
//! report.check()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod kernel;
pub mod preflight;
pub mod process;
pub mod report;
pub mod scheduler;
pub mod setup;
pub mod toolchain;

pub use config::{BuildConfiguration, Project};
pub use kernel::{build_module, ModuleBuildTarget, ModuleOutcome};
pub use scheduler::{run_builds, BuildOptions, BuildReport, TargetState};
pub use toolchain::TargetArch;
