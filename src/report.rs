//! JSON build report written after a `build` run.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::{BuildConfiguration, ARCH, KERNELDIR, KMAKE, MACH};
use crate::scheduler::BuildReport;

#[derive(Debug, Serialize)]
struct ReportFile<'a> {
    arch: Option<&'a str>,
    mach: Option<&'a str>,
    kerneldir: Option<&'a str>,
    kmake: Option<&'a str>,
    finished_at_unix: u64,
    success: bool,
    #[serde(flatten)]
    report: &'a BuildReport,
}

/// Write `report` to `path`, replacing any existing file.
pub fn write_report(path: &Path, config: &BuildConfiguration, report: &BuildReport) -> Result<()> {
    let finished_at_unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let file = ReportFile {
        arch: config.get(ARCH),
        mach: config.get(MACH),
        kerneldir: config.get(KERNELDIR),
        kmake: config.get(KMAKE),
        finished_at_unix,
        success: report.is_success(),
        report,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating report directory '{}'", parent.display()))?;
    }

    let bytes = serde_json::to_vec_pretty(&file)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).with_context(|| format!("writing '{}'", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("moving build report into place at '{}'", path.display()))?;
    Ok(())
}
