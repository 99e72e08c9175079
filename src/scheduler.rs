//! Parallel module build scheduler.
//!
//! Runs module builds on a pool of scoped worker threads, one external
//! process per module. Workers share the configuration read-only; the only
//! shared mutable state is the job queue and the halt flag.
//!
//! After a failure the scheduler either halts (no new modules are started;
//! running ones are waited for) or keeps going, depending on the failed
//! module's effective keep-going policy.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::config::BuildConfiguration;
use crate::kernel::{build_module, kernel_dir_configured, ModuleBuildTarget, ModuleOutcome};

/// Scheduler options.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Maximum parallel module builds (0 = available parallelism).
    pub jobs: usize,
    /// Keep building siblings after a failure.
    pub keep_going: bool,
}

impl BuildOptions {
    fn worker_count(&self, total: usize) -> usize {
        let wanted = if self.jobs == 0 {
            thread::available_parallelism()
                .map(std::num::NonZero::get)
                .unwrap_or(1)
        } else {
            self.jobs
        };
        wanted.clamp(1, total.max(1))
    }

    fn keep_going_for(&self, target: &ModuleBuildTarget) -> bool {
        target.keep_going.unwrap_or(self.keep_going)
    }
}

/// Per-module state.
///
/// `Pending -> Skipped`, or `Pending -> Running -> Succeeded | Failed`.
/// A module without a kernel directory never reads as `Running`. `Error`
/// covers modules whose build could not be attempted at all: no source
/// directory, no `KMAKE`, or a shell that cannot be spawned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TargetState {
    Pending,
    Running,
    Skipped,
    Succeeded,
    Failed { command: String, code: Option<i32> },
    Error { message: String },
}

impl TargetState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TargetState::Pending | TargetState::Running)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TargetState::Failed { .. } | TargetState::Error { .. })
    }
}

impl From<ModuleOutcome> for TargetState {
    fn from(outcome: ModuleOutcome) -> Self {
        match outcome {
            ModuleOutcome::Skipped => TargetState::Skipped,
            ModuleOutcome::Succeeded => TargetState::Succeeded,
            ModuleOutcome::Failed { command, code } => TargetState::Failed { command, code },
        }
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetState::Pending => write!(f, "not run"),
            TargetState::Running => write!(f, "running"),
            TargetState::Skipped => write!(f, "skipped"),
            TargetState::Succeeded => write!(f, "ok"),
            TargetState::Failed {
                command,
                code: Some(code),
            } => write!(f, "failed (exit {}): {}", code, command),
            TargetState::Failed {
                command,
                code: None,
            } => write!(f, "failed (signal): {}", command),
            TargetState::Error { message } => write!(f, "error: {}", message),
        }
    }
}

/// Result for one module.
#[derive(Debug, Clone, Serialize)]
pub struct TargetReport {
    pub name: String,
    #[serde(flatten)]
    pub state: TargetState,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Option<Duration>,
}

fn serialize_millis<S: serde::Serializer>(
    value: &Option<Duration>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match value {
        Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
        None => serializer.serialize_none(),
    }
}

/// Results for a whole build, in the order modules were given.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub modules: Vec<TargetReport>,
    /// Dispatch stopped early because of a failure.
    pub halted: bool,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_elapsed")]
    pub elapsed: Duration,
}

fn serialize_elapsed<S: serde::Serializer>(
    value: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_millis() as u64)
}

impl BuildReport {
    pub fn count(&self, pred: impl Fn(&TargetState) -> bool) -> usize {
        self.modules.iter().filter(|m| pred(&m.state)).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &TargetReport> {
        self.modules.iter().filter(|m| m.state.is_failure())
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Turn recorded failures into an error.
    pub fn check(&self) -> Result<()> {
        let failures: Vec<_> = self.failures().collect();
        if failures.is_empty() {
            return Ok(());
        }
        let detail = failures
            .iter()
            .map(|m| format!("  {}: {}", m.name, m.state))
            .collect::<Vec<_>>()
            .join("\n");
        if self.halted {
            let not_run = self.count(|s| *s == TargetState::Pending);
            bail!(
                "build halted after failure ({} module(s) not run):\n{}",
                not_run,
                detail
            );
        }
        bail!("{} module(s) failed:\n{}", failures.len(), detail)
    }
}

enum WorkerEvent {
    Started { idx: usize },
    Finished {
        idx: usize,
        state: TargetState,
        duration: Duration,
    },
}

/// Build module `idx` and report its progress on `tx`.
///
/// `Started` is only sent when the build will run a command.
fn run_one(
    config: &BuildConfiguration,
    targets: &[ModuleBuildTarget],
    idx: usize,
    tx: &mpsc::Sender<WorkerEvent>,
) -> TargetState {
    let target = &targets[idx];
    if kernel_dir_configured(config) {
        let _ = tx.send(WorkerEvent::Started { idx });
    }

    let began = Instant::now();
    let state = match build_module(config, target) {
        Ok(outcome) => TargetState::from(outcome),
        Err(e) => {
            error!(module = %target.name, "{:#}", e);
            TargetState::Error {
                message: format!("{:#}", e),
            }
        }
    };
    let _ = tx.send(WorkerEvent::Finished {
        idx,
        state: state.clone(),
        duration: began.elapsed(),
    });
    state
}

/// Build `targets` against `config`.
///
/// Never returns early: every dispatched module is waited for and every
/// module appears in the report.
pub fn run_builds(
    config: &BuildConfiguration,
    targets: &[ModuleBuildTarget],
    options: &BuildOptions,
) -> BuildReport {
    let start = Instant::now();
    let mut states = vec![TargetState::Pending; targets.len()];
    let mut durations = vec![None; targets.len()];

    let queue: Mutex<VecDeque<usize>> = Mutex::new((0..targets.len()).collect());
    let halt = AtomicBool::new(false);
    let workers = options.worker_count(targets.len());
    debug!(modules = targets.len(), workers, "starting module builds");

    thread::scope(|scope| {
        let (tx, rx) = mpsc::channel::<WorkerEvent>();

        for _ in 0..workers {
            let tx = tx.clone();
            let queue = &queue;
            let halt = &halt;
            scope.spawn(move || loop {
                if halt.load(Ordering::SeqCst) {
                    break;
                }
                let next = match queue.lock() {
                    Ok(mut q) => q.pop_front(),
                    Err(_) => None,
                };
                let Some(idx) = next else {
                    break;
                };
                let state = run_one(config, targets, idx, &tx);
                if state.is_failure() && !options.keep_going_for(&targets[idx]) {
                    halt.store(true, Ordering::SeqCst);
                }
            });
        }
        drop(tx);

        for event in rx {
            match event {
                WorkerEvent::Started { idx } => states[idx] = TargetState::Running,
                WorkerEvent::Finished {
                    idx,
                    state,
                    duration,
                } => {
                    states[idx] = state;
                    durations[idx] = Some(duration);
                }
            }
        }
    });

    let halted =
        halt.load(Ordering::SeqCst) && states.iter().any(|s| *s == TargetState::Pending);
    if halted {
        info!("build halted, remaining modules not started");
    }

    BuildReport {
        modules: targets
            .iter()
            .zip(states)
            .zip(durations)
            .map(|((target, state), duration)| TargetReport {
                name: target.name.clone(),
                state,
                duration,
            })
            .collect(),
        halted,
        elapsed: start.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KERNELDIR, KMAKE};
    use std::fs;
    use std::path::Path;

    fn config(kmake: &str) -> BuildConfiguration {
        [(KERNELDIR, "/opt/linux"), (KMAKE, kmake)].into_iter().collect()
    }

    fn module(root: &Path, name: &str) -> ModuleBuildTarget {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        let ko = dir.join(format!("{name}.ko"));
        let source = dir.join(format!("{name}.c"));
        ModuleBuildTarget::new(name, [ko], [source])
    }

    fn options(jobs: usize, keep_going: bool) -> BuildOptions {
        BuildOptions { jobs, keep_going }
    }

    fn events_for(config: &BuildConfiguration, target: ModuleBuildTarget) -> Vec<WorkerEvent> {
        let (tx, rx) = mpsc::channel();
        run_one(config, &[target], 0, &tx);
        drop(tx);
        rx.into_iter().collect()
    }

    #[test]
    fn test_all_succeed() {
        let root = tempfile::tempdir().unwrap();
        let targets = vec![module(root.path(), "a"), module(root.path(), "b")];
        let report = run_builds(&config("true"), &targets, &options(2, false));

        assert!(report.is_success());
        assert!(!report.halted);
        assert!(report.modules.iter().all(|m| m.state.is_terminal()));
        assert_eq!(report.count(|s| *s == TargetState::Succeeded), 2);
        assert!(report.check().is_ok());
        assert!(report.modules.iter().all(|m| m.duration.is_some()));
    }

    #[test]
    fn test_skipped_without_kerneldir() {
        let root = tempfile::tempdir().unwrap();
        let targets = vec![module(root.path(), "a")];
        let config: BuildConfiguration = [(KMAKE, "exit 1")].into_iter().collect();
        let report = run_builds(&config, &targets, &BuildOptions::default());

        assert_eq!(report.modules[0].state, TargetState::Skipped);
        assert!(report.check().is_ok());
    }

    #[test]
    fn test_skip_is_never_reported_running() {
        let root = tempfile::tempdir().unwrap();
        let config: BuildConfiguration = [(KMAKE, "true")].into_iter().collect();

        let events = events_for(&config, module(root.path(), "a"));
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            WorkerEvent::Finished { idx: 0, state: TargetState::Skipped, .. }
        ));
    }

    #[test]
    fn test_build_reports_started_then_finished() {
        let root = tempfile::tempdir().unwrap();

        let events = events_for(&config("true"), module(root.path(), "a"));
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], WorkerEvent::Started { idx: 0 }));
        assert!(matches!(
            &events[1],
            WorkerEvent::Finished { state: TargetState::Succeeded, .. }
        ));
    }

    #[test]
    fn test_default_mode_halts_dispatch() {
        let root = tempfile::tempdir().unwrap();
        let targets: Vec<_> = ["a", "b", "c"].iter().map(|n| module(root.path(), n)).collect();
        let report = run_builds(&config("exit 1"), &targets, &options(1, false));

        assert!(report.halted);
        assert!(report.modules[0].state.is_failure());
        assert_eq!(report.modules[1].state, TargetState::Pending);
        assert_eq!(report.modules[2].state, TargetState::Pending);
        let err = report.check().unwrap_err().to_string();
        assert!(err.contains("halted"));
        assert!(err.contains("exit 1"));
    }

    #[test]
    fn test_keep_going_runs_siblings() {
        let root = tempfile::tempdir().unwrap();
        let targets: Vec<_> = ["a", "b", "c"].iter().map(|n| module(root.path(), n)).collect();
        let kmake = "touch built; test \"$(basename \"$(pwd)\")\" != a";
        let report = run_builds(&config(kmake), &targets, &options(1, true));

        assert!(!report.halted);
        assert!(report.modules[0].state.is_failure());
        assert_eq!(report.modules[1].state, TargetState::Succeeded);
        assert_eq!(report.modules[2].state, TargetState::Succeeded);
        for name in ["a", "b", "c"] {
            assert!(root.path().join(name).join("built").exists());
        }
        let err = report.check().unwrap_err().to_string();
        assert!(err.contains("1 module(s) failed"));
    }

    #[test]
    fn test_module_override_keeps_going() {
        let root = tempfile::tempdir().unwrap();
        let targets = vec![
            module(root.path(), "a").with_keep_going(true),
            module(root.path(), "b"),
        ];
        let report = run_builds(&config("exit 1"), &targets, &options(1, false));

        assert!(report.modules[0].state.is_failure());
        assert!(report.modules[1].state.is_failure());
        assert!(!report.halted);
    }

    #[test]
    fn test_parallel_builds_use_own_directories() {
        let root = tempfile::tempdir().unwrap();
        let names = ["m0", "m1", "m2", "m3", "m4", "m5"];
        let targets: Vec<_> = names.iter().map(|n| module(root.path(), n)).collect();
        let kmake = "sleep 0.1; pwd > where";
        let report = run_builds(&config(kmake), &targets, &options(3, false));
        assert!(report.is_success());

        for name in names {
            let dir = root.path().join(name);
            let recorded = fs::read_to_string(dir.join("where")).unwrap();
            assert_eq!(
                fs::canonicalize(recorded.trim()).unwrap(),
                fs::canonicalize(&dir).unwrap()
            );
        }
    }

    #[test]
    fn test_build_error_is_recorded() {
        let targets = vec![ModuleBuildTarget::new("bad", ["bad.ko"], Vec::<String>::new())];
        let report = run_builds(&config("true"), &targets, &BuildOptions::default());
        assert!(matches!(report.modules[0].state, TargetState::Error { .. }));
    }

    #[test]
    fn test_empty_target_list() {
        let report = run_builds(&config("true"), &[], &BuildOptions::default());
        assert!(report.modules.is_empty());
        assert!(report.is_success());
    }

    #[test]
    fn test_report_serializes() {
        let report = BuildReport {
            modules: vec![TargetReport {
                name: "a".into(),
                state: TargetState::Failed {
                    command: "make".into(),
                    code: Some(2),
                },
                duration: Some(Duration::from_millis(1500)),
            }],
            halted: false,
            elapsed: Duration::from_secs(2),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["modules"][0]["state"], "failed");
        assert_eq!(json["modules"][0]["code"], 2);
        assert_eq!(json["modules"][0]["duration_ms"], 1500);
        assert_eq!(json["elapsed_ms"], 2000);
    }
}
