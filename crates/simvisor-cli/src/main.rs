//! simvisor CLI: run a teaching kernel under QEMU.
//!
//! Flags follow the classic `pintos` utility; arguments after `--` are passed
//! to the kernel.

// CLI-specific lint allowances (CLI binary, not library)
#![allow(missing_docs)]
#![allow(clippy::print_stdout)] // CLI must print to stdout
#![allow(clippy::print_stderr)] // CLI must print to stderr
#![allow(clippy::exit)] // CLI uses exit codes
#![allow(clippy::fn_params_excessive_bools)] // CLI flags are naturally bools

use clap::{Args, Parser, ValueEnum};
use miette::{IntoDiagnostic, Result};
use simvisor::disk::MkdiskProvisioner;
use simvisor::model::{
    DebugMode, PartitionSource, RunConfiguration, RunConfigurationBuilder, RunReport, Simulator,
};
use simvisor::profile::{load_profile, RunProfile};
use simvisor::runner::{run, RunnerError, RunnerOptions};
use simvisor::supervisor::SupervisorOptions;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "SIMVISOR_LOG";

/// Color output mode
#[derive(Copy, Clone, Debug, Default, ValueEnum)]
enum ColorMode {
    /// Auto-detect based on terminal and `NO_COLOR` env
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum SimArg {
    Qemu,
    Bochs,
    Player,
}

impl From<SimArg> for Simulator {
    fn from(value: SimArg) -> Self {
        match value {
            SimArg::Qemu => Self::Qemu,
            SimArg::Bochs => Self::Bochs,
            SimArg::Player => Self::Player,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum DebugArg {
    None,
    Monitor,
    Gdb,
}

impl From<DebugArg> for DebugMode {
    fn from(value: DebugArg) -> Self {
        match value {
            DebugArg::None => Self::None,
            DebugArg::Monitor => Self::Monitor,
            DebugArg::Gdb => Self::Gdb,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "simvisor",
    version,
    about = "Run a teaching kernel under QEMU with failure detection"
)]
struct Cli {
    /// Control color output
    #[arg(long, value_enum, default_value = "auto")]
    color: ColorMode,

    /// Load defaults from a JSON or YAML run profile
    #[arg(long, value_name = "FILE")]
    profile: Option<PathBuf>,

    /// Write a JSON run report to FILE
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Simulator to use
    #[arg(long, value_enum, default_value = "qemu")]
    sim: SimArg,

    /// Debugger to use
    #[arg(long, value_enum, conflicts_with_all = ["monitor", "gdb"])]
    debug: Option<DebugArg>,

    /// Debug with the simulator monitor
    #[arg(long, conflicts_with = "gdb")]
    monitor: bool,

    /// Debug with gdb
    #[arg(long)]
    gdb: bool,

    /// Physical RAM in MB (default: 4)
    #[arg(short = 'm', long, value_name = "MB")]
    memory: Option<u32>,

    /// Kill the simulator after N seconds
    #[arg(short = 'T', long, value_name = "N")]
    timeout: Option<u64>,

    /// Abort quickly on test failure
    #[arg(short = 'k', long)]
    kill_on_failure: bool,

    /// No VGA display or keyboard
    #[arg(short = 'v', long)]
    no_vga: bool,

    /// No serial input or output
    #[arg(short = 's', long)]
    no_serial: bool,

    /// Display VGA in terminal (not supported by qemu)
    #[arg(short = 't', long)]
    terminal: bool,

    #[command(flatten)]
    disk: DiskArgs,

    /// Arguments passed to the kernel
    #[arg(last = true)]
    kernel_args: Vec<String>,
}

#[derive(Debug, Args)]
struct DiskArgs {
    /// Use FILE for the kernel partition
    #[arg(long, value_name = "FILE")]
    kernel: Option<PathBuf>,

    /// Use FILE for the file system partition
    #[arg(long, value_name = "FILE", conflicts_with = "filesys_size")]
    filesys: Option<PathBuf>,

    /// Use FILE for the swap partition
    #[arg(long, value_name = "FILE", conflicts_with = "swap_size")]
    swap: Option<PathBuf>,

    /// Create an empty file system partition of SIZE MB
    #[arg(long, value_name = "SIZE")]
    filesys_size: Option<u32>,

    /// Create an empty scratch partition of SIZE MB
    #[arg(long, value_name = "SIZE")]
    scratch_size: Option<u32>,

    /// Create an empty swap partition of SIZE MB
    #[arg(long, value_name = "SIZE")]
    swap_size: Option<u32>,

    /// Name the new DISK and keep it
    #[arg(long, value_name = "DISK")]
    make_disk: Option<PathBuf>,

    /// Also use existing DISK (repeatable)
    #[arg(long, value_name = "DISK")]
    disk: Vec<PathBuf>,

    /// Use FILE as the bootstrap loader
    #[arg(long, value_name = "FILE")]
    loader: Option<PathBuf>,

    /// Disk provisioning program (default: pintos-mkdisk)
    #[arg(long, value_name = "PROGRAM")]
    mkdisk: Option<String>,
}

/// Configure color output based on CLI flag and environment
fn configure_colors(mode: ColorMode) {
    let use_color = match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => {
            // Respect NO_COLOR environment variable
            if std::env::var("NO_COLOR").is_ok() {
                false
            } else {
                supports_color::on(supports_color::Stream::Stderr).is_some()
            }
        }
    };

    miette::set_hook(Box::new(move |_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .color(use_color)
                .unicode(use_color)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    configure_colors(cli.color);
    init_tracing();

    let profile = match cli.profile.as_deref() {
        Some(path) => load_profile(path)?,
        None => RunProfile::default(),
    };
    let config = build_config(&cli, &profile)?;
    let options = build_options(&cli, &profile)?;

    let interrupter = options.interrupter.clone();
    ctrlc::set_handler(move || interrupter.interrupt()).into_diagnostic()?;

    let stdout = io::stdout();
    let result = run(&config, &options, &mut stdout.lock());
    emit_result(cli.report.as_ref(), result)
}

fn build_config(cli: &Cli, profile: &RunProfile) -> Result<RunConfiguration, RunnerError> {
    let mut builder = profile
        .apply(RunConfigurationBuilder::new())
        .simulator(cli.sim.into());

    if let Some(debug) = resolve_debug(cli) {
        builder = builder.debug(debug);
    }
    if let Some(memory) = cli.memory {
        builder = builder.memory_mb(memory);
    }
    if cli.timeout.is_some() {
        builder = builder.timeout_secs(cli.timeout);
    }
    if cli.kill_on_failure {
        builder = builder.kill_on_failure(true);
    }
    if cli.no_vga {
        builder = builder.no_vga(true);
    }
    if cli.no_serial {
        builder = builder.no_serial(true);
    }
    if !cli.kernel_args.is_empty() {
        builder = builder.kernel_args(cli.kernel_args.clone());
    }

    if cli.terminal {
        builder = builder.terminal(true);
    }

    let disk = &cli.disk;
    builder
        .with_disk_layout(|layout| {
            if let Some(kernel) = &disk.kernel {
                layout.kernel = Some(kernel.clone());
            }
            if let Some(source) = partition(disk.filesys.as_ref(), disk.filesys_size) {
                layout.filesys = Some(source);
            }
            if let Some(source) = partition(disk.swap.as_ref(), disk.swap_size) {
                layout.swap = Some(source);
            }
            if disk.scratch_size.is_some() {
                layout.scratch_mb = disk.scratch_size;
            }
            layout.extra_disks.extend(disk.disk.iter().cloned());
            if let Some(loader) = &disk.loader {
                layout.loader = Some(loader.clone());
            }
            if let Some(name) = &disk.make_disk {
                layout.retain_as = Some(name.clone());
            }
        })
        .build()
}

fn resolve_debug(cli: &Cli) -> Option<DebugMode> {
    if cli.monitor {
        return Some(DebugMode::Monitor);
    }
    if cli.gdb {
        return Some(DebugMode::Gdb);
    }
    cli.debug.map(DebugMode::from)
}

fn partition(file: Option<&PathBuf>, size_mb: Option<u32>) -> Option<PartitionSource> {
    file.cloned()
        .map(PartitionSource::File)
        .or_else(|| size_mb.map(PartitionSource::SizeMb))
}

fn build_options(cli: &Cli, profile: &RunProfile) -> Result<RunnerOptions, RunnerError> {
    let mut options = RunnerOptions::default();
    let mkdisk = cli
        .disk
        .mkdisk
        .clone()
        .map(|program| vec![program])
        .or_else(|| profile.mkdisk.clone());
    if let Some(command) = mkdisk {
        options.provisioner = Box::new(MkdiskProvisioner::with_command(command)?);
    }
    options.supervisor = SupervisorOptions {
        grace_period: profile
            .grace_period_ms
            .map_or(options.supervisor.grace_period, Duration::from_millis),
        ..options.supervisor
    };
    Ok(options)
}

fn emit_result(report_path: Option<&PathBuf>, result: Result<RunReport, RunnerError>) -> Result<()> {
    match result {
        Ok(report) => {
            if let Some(path) = report_path {
                let payload = serde_json::to_vec_pretty(&report).into_diagnostic()?;
                std::fs::write(path, payload).into_diagnostic()?;
            }
            tracing::debug!(cause = %report.supervision.cause, "run completed");
            match report.exit_code() {
                0 => Ok(()),
                code => std::process::exit(code),
            }
        }
        Err(err) => {
            eprintln!("error: {err}");
            if let Some(context) = err.context.as_ref() {
                tracing::debug!(%context, "error context");
            }
            std::process::exit(exit_code_for_error(&err));
        }
    }
}

fn exit_code_for_error(err: &RunnerError) -> i32 {
    err.exit_code()
}
