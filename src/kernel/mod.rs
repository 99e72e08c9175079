//! Kernel module building.
//!
//! - [`resolve`] - kernel header tree lookup per machine and architecture
//! - [`kmake`] - the `KMAKE` module builder
//! - [`target`] - module build targets

pub mod kmake;
pub mod resolve;
pub mod target;

pub use kmake::{build_module, compose_kmake, kernel_dir_configured, setup_kmake, ModuleOutcome};
pub use resolve::{apply_kernel_dir, discover_kernel_dir, kerneldir_key, resolve, KERNELDIR_AUTO};
pub use target::ModuleBuildTarget;
