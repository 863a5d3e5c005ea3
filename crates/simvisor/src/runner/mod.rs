//! Run lifecycle: provision the disk, supervise the emulator, clean up.

mod error;

pub use error::{ErrorCode, RunnerError, RunnerResult};

use crate::disk::{reserve_disk, DiskProvisioner, MkdiskProvisioner};
use crate::invocation::{build_invocation, BinaryLocator, SearchPath};
use crate::model::{DiskHandle, RunConfiguration, RunReport, Simulator};
use crate::supervisor::{ExecutionSupervisor, Interrupter, SupervisorOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

/// Collaborators and knobs for [`run`].
pub struct RunnerOptions {
    pub provisioner: Box<dyn DiskProvisioner>,
    pub locator: Box<dyn BinaryLocator>,
    pub supervisor: SupervisorOptions,
    pub interrupter: Interrupter,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            provisioner: Box::new(MkdiskProvisioner::default()),
            locator: Box::new(SearchPath),
            supervisor: SupervisorOptions::default(),
            interrupter: Interrupter::new(),
        }
    }
}

/// Run `config` end to end, writing console traffic to `out`.
///
/// An ephemeral disk is removed on every way out of this function: success,
/// detected failure, interruption, error, or panic.
///
/// # Errors
/// - `E_UNSUPPORTED_SIMULATOR`: a simulator other than QEMU was selected
/// - `E_DISK_PROVISION`: the disk could not be built; no emulator is started
/// - `E_EMULATOR_SPAWN`, `E_IO`: see [`ExecutionSupervisor::supervise`]
pub fn run<W: Write>(
    config: &RunConfiguration,
    options: &RunnerOptions,
    out: &mut W,
) -> RunnerResult<RunReport> {
    if config.simulator() != Simulator::Qemu {
        return Err(RunnerError::unsupported_simulator(config.simulator().name()));
    }

    let disk = reserve_disk(config.disk_layout())?;
    let cleanup_guard = DiskCleanupGuard::new(&disk);
    options
        .provisioner
        .provision(config.disk_layout(), &disk, config.kernel_args())?;

    let invocation = build_invocation(config, &disk, options.locator.as_ref());
    for warning in &invocation.warnings {
        tracing::debug!(warning = %warning, "invocation warning");
        writeln!(out, "warning: {warning}")
            .map_err(|err| RunnerError::io("failed to write console notice", err))?;
    }

    let supervisor =
        ExecutionSupervisor::new(config, options.supervisor, options.interrupter.clone());
    let supervision = supervisor.supervise(&invocation.spec, out)?;
    tracing::info!(
        cause = %supervision.cause,
        exit_code = ?supervision.exit_code,
        boot_markers = supervision.boot_markers,
        "run finished"
    );

    drop(cleanup_guard);
    Ok(RunReport {
        disk,
        invocation: invocation.spec,
        warnings: invocation.warnings,
        supervision,
    })
}

/// Removes an ephemeral disk when dropped. Retained disks are left alone.
struct DiskCleanupGuard {
    path: Option<PathBuf>,
}

impl DiskCleanupGuard {
    fn new(disk: &DiskHandle) -> Self {
        Self {
            path: disk.is_ephemeral().then(|| disk.path().to_path_buf()),
        }
    }
}

impl Drop for DiskCleanupGuard {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::debug!(disk = %path.display(), "removed temporary disk"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => tracing::warn!(
                disk = %path.display(),
                error = %err,
                "failed to remove temporary disk"
            ),
        }
    }
}
