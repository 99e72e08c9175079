//! kmod-build CLI
//!
//! # Usage
//!
//! ```bash
//! # Build every module in ./kbuild.toml
//! kmod-build build
//!
//! # Build two modules, four at a time, continuing past failures
//! kmod-build build -j4 --keep-going ncar_a2d lams
//!
//! # Point a machine at a different kernel tree for one run
//! kmod-build build --var KERNELDIR_viper_armel=/opt/linux-4.4
//!
//! # Show what the kernel directory and KMAKE resolve to
//! kmod-build resolve --arch armbe --mach vulcan
//!
//! # Check the host tools the project's builds will run
//! kmod-build check
//! ```

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use kmod_build::config::project::PROJECT_FILENAME;
use kmod_build::config::{BuildConfiguration, Project, KERNELDIR, KMAKE};
use kmod_build::scheduler::{run_builds, BuildOptions, TargetState};
use kmod_build::setup::{configure, DEFAULT_MACH};
use kmod_build::toolchain::config_variant_dir;
use kmod_build::preflight::{self, HostTool};
use kmod_build::{report, TargetArch};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kmod-build")]
#[command(
    author,
    version,
    about = "Kernel module builder for embedded Linux targets",
    long_about = None
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ProjectArgs {
    /// Project file
    #[arg(short = 'f', long = "file", default_value = PROJECT_FILENAME)]
    file: PathBuf,

    /// Override a configuration variable (KEY=VALUE, repeatable)
    #[arg(long = "var", value_name = "KEY=VALUE")]
    vars: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build kernel modules
    Build {
        #[command(flatten)]
        project: ProjectArgs,

        /// Parallel module builds (default: project setting, then CPU count)
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Keep building other modules after a failure
        #[arg(short, long)]
        keep_going: bool,

        /// Write a JSON build report to this path
        #[arg(long)]
        report: Option<PathBuf>,

        /// Modules to build (default: all)
        modules: Vec<String>,
    },

    /// Print the resolved kernel directory and KMAKE command
    Resolve {
        #[command(flatten)]
        project: ProjectArgs,

        /// Target architecture (default: project setting)
        #[arg(long)]
        arch: Option<String>,

        /// Target machine (default: project setting, then "default")
        #[arg(long)]
        mach: Option<String>,
    },

    /// Check that the host tools a build will run are installed
    Check {
        #[command(flatten)]
        project: ProjectArgs,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Build {
            project,
            jobs,
            keep_going,
            report,
            modules,
        } => cmd_build(&project, jobs, keep_going, report.as_deref(), &modules),
        Commands::Resolve {
            project,
            arch,
            mach,
        } => cmd_resolve(&project, arch.as_deref(), mach.as_deref()),
        Commands::Check { project } => cmd_check(&project),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_build(
    args: &ProjectArgs,
    jobs: Option<usize>,
    keep_going: bool,
    report_path: Option<&Path>,
    modules: &[String],
) -> Result<()> {
    let project = Project::load(&args.file)?;
    let config = project.configuration(&args.vars)?;
    let targets = project.select(modules)?;

    preflight::check_build_host(&config)?;

    let options = BuildOptions {
        jobs: jobs.unwrap_or(project.jobs),
        keep_going: keep_going || project.keep_going,
    };

    println!(
        "=== Building {} module(s) for {} ({}) ===",
        targets.len(),
        project.arch,
        project.mach
    );
    let report = run_builds(&config, &targets, &options);

    println!();
    for module in &report.modules {
        let marker = match &module.state {
            TargetState::Succeeded => "[OK]  ",
            TargetState::Skipped => "[SKIP]",
            TargetState::Pending | TargetState::Running => "[----]",
            TargetState::Failed { .. } | TargetState::Error { .. } => "[FAIL]",
        };
        println!("  {} {}: {}", marker, module.name, module.state);
    }
    println!(
        "  {} ok, {} skipped, {} failed in {:.1}s",
        report.count(|s| *s == TargetState::Succeeded),
        report.count(|s| *s == TargetState::Skipped),
        report.count(TargetState::is_failure),
        report.elapsed.as_secs_f64()
    );

    if let Some(path) = report_path {
        report::write_report(path, &config, &report)?;
        println!("  Report written to {}", path.display());
    }

    report.check()
}

fn cmd_resolve(args: &ProjectArgs, arch: Option<&str>, mach: Option<&str>) -> Result<()> {
    let project = if args.file.exists() {
        Some(Project::load(&args.file)?)
    } else {
        None
    };

    let arch: TargetArch = match (arch, &project) {
        (Some(arch), _) => arch.parse()?,
        (None, Some(project)) => project.arch,
        (None, None) => bail!(
            "no --arch given and project file '{}' not found",
            args.file.display()
        ),
    };
    let mach = mach
        .map(str::to_string)
        .or_else(|| project.as_ref().map(|p| p.mach.clone()))
        .unwrap_or_else(|| DEFAULT_MACH.to_string());

    let mut config: BuildConfiguration = project
        .iter()
        .flat_map(|p| p.variables.iter())
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    config
        .apply_overrides(&args.vars)
        .context("applying --var overrides")?;
    configure(&mut config, arch, &mach);

    let root = project
        .as_ref()
        .map(|p| p.root.clone())
        .unwrap_or_else(|| PathBuf::from("."));

    println!("arch      {}", arch);
    println!("mach      {}", mach);
    println!(
        "{:<9} {}",
        KERNELDIR,
        config.get_nonempty(KERNELDIR).unwrap_or("(not configured)")
    );
    println!(
        "{:<9} {}",
        KMAKE,
        config.get_nonempty(KMAKE).unwrap_or("(not configured)")
    );
    println!(
        "variant   {}",
        config_variant_dir(&config, &root, arch).display()
    );
    Ok(())
}

fn cmd_check(args: &ProjectArgs) -> Result<()> {
    let tools = if args.file.exists() {
        let config = Project::load(&args.file)?.configuration(&args.vars)?;
        if config.get_nonempty(KERNELDIR).is_none() {
            println!("  No kernel directory configured: modules will be skipped");
        }
        preflight::required_tools(&config)
    } else {
        preflight::BASE_TOOLS
            .iter()
            .map(|program| HostTool {
                program: program.to_string(),
                wanted_by: "module builds".to_string(),
            })
            .collect()
    };

    preflight::check_tools(&tools)?;
    for tool in &tools {
        if let Some(path) = kmod_build::process::which(&tool.program) {
            println!("  [OK] {} ({})", tool, path);
        }
    }
    Ok(())
}
