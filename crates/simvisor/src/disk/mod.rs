//! Disk image provisioning.
//!
//! Building the bootable disk is delegated to an external `pintos-mkdisk`
//! style command; this module only knows its command-line contract and that
//! a non-zero exit status is fatal.

use crate::model::{DiskHandle, DiskLayout, PartitionSource};
use crate::runner::{RunnerError, RunnerResult};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Default provisioning command, looked up on `PATH`.
pub const DEFAULT_MKDISK: &str = "pintos-mkdisk";

/// Places a kernel partition is looked for when none is named.
pub const KERNEL_SEARCH_PATHS: [&str; 3] = ["kernel.bin", "build/kernel.bin", "../build/kernel.bin"];

/// Builds the disk image a run boots from.
pub trait DiskProvisioner {
    /// Create the image at `disk.path()`.
    ///
    /// # Errors
    /// `E_DISK_PROVISION` if the image could not be built.
    fn provision(
        &self,
        layout: &DiskLayout,
        disk: &DiskHandle,
        kernel_args: &[String],
    ) -> RunnerResult<()>;
}

/// Runs an external mkdisk command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MkdiskProvisioner {
    /// Program followed by any leading arguments, e.g. `["perl",
    /// "utils/pintos-mkdisk"]`.
    command: Vec<String>,
}

impl Default for MkdiskProvisioner {
    fn default() -> Self {
        Self {
            command: vec![DEFAULT_MKDISK.to_string()],
        }
    }
}

impl MkdiskProvisioner {
    /// Use `command` (program first) instead of [`DEFAULT_MKDISK`].
    ///
    /// # Errors
    /// `E_INVALID_CONFIG` if `command` is empty.
    pub fn with_command(command: Vec<String>) -> RunnerResult<Self> {
        if command.first().map_or(true, String::is_empty) {
            return Err(RunnerError::invalid_config(
                "disk provisioning command must name a program",
                None,
            ));
        }
        Ok(Self { command })
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }
}

impl DiskProvisioner for MkdiskProvisioner {
    fn provision(
        &self,
        layout: &DiskLayout,
        disk: &DiskHandle,
        kernel_args: &[String],
    ) -> RunnerResult<()> {
        let kernel = layout.kernel.clone().or_else(find_default_kernel);
        let args = mkdisk_args(layout, kernel.as_deref(), disk.path(), kernel_args);
        let (program, leading) = self
            .command
            .split_first()
            .ok_or_else(|| RunnerError::internal("empty disk provisioning command"))?;
        tracing::debug!(program, ?leading, ?args, "provisioning disk");

        let output = Command::new(program)
            .args(leading)
            .args(&args)
            .output()
            .map_err(|err| {
                RunnerError::provision(
                    format!("error running {program}: {err}"),
                    serde_json::json!({ "program": program, "source": err.to_string() }),
                )
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
            return Err(RunnerError::provision(
                format!("error creating disk: {stderr}"),
                serde_json::json!({
                    "program": program,
                    "exit_code": output.status.code(),
                    "stderr": stderr,
                }),
            ));
        }
        tracing::info!(disk = %disk.path().display(), "disk provisioned");
        Ok(())
    }
}

/// Arguments for the mkdisk command, in contract order: partitions, extra
/// disks, loader, output path, then `--` and the kernel arguments.
pub fn mkdisk_args(
    layout: &DiskLayout,
    kernel: Option<&Path>,
    output: &Path,
    kernel_args: &[String],
) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(kernel) = kernel {
        args.push("--kernel".to_string());
        args.push(kernel.display().to_string());
    }
    push_partition(&mut args, "filesys", layout.filesys.as_ref());
    push_partition(&mut args, "swap", layout.swap.as_ref());
    if let Some(size) = layout.scratch_mb {
        args.push("--scratch-size".to_string());
        args.push(size.to_string());
    }
    for extra in &layout.extra_disks {
        args.push("--disk".to_string());
        args.push(extra.display().to_string());
    }
    if let Some(loader) = &layout.loader {
        args.push("--loader".to_string());
        args.push(loader.display().to_string());
    }
    args.push(output.display().to_string());
    if !kernel_args.is_empty() {
        args.push("--".to_string());
        args.extend(kernel_args.iter().cloned());
    }
    args
}

fn push_partition(args: &mut Vec<String>, name: &str, source: Option<&PartitionSource>) {
    match source {
        Some(PartitionSource::File(path)) => {
            args.push(format!("--{name}"));
            args.push(path.display().to_string());
        }
        Some(PartitionSource::SizeMb(size)) => {
            args.push(format!("--{name}-size"));
            args.push(size.to_string());
        }
        None => {}
    }
}

fn find_default_kernel() -> Option<PathBuf> {
    KERNEL_SEARCH_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.exists())
}

/// Reserve a fresh temp-dir path for a throwaway disk.
///
/// The file is created to claim a unique name and removed again, so the
/// returned path does not exist.
///
/// # Errors
/// `E_IO` if the temp directory is unusable.
pub fn reserve_ephemeral_path() -> RunnerResult<PathBuf> {
    let file = tempfile::Builder::new()
        .prefix("simvisor-")
        .suffix(".dsk")
        .tempfile()
        .map_err(|err| RunnerError::io("failed to reserve temporary disk name", err))?;
    let path = file.path().to_path_buf();
    file.close()
        .map_err(|err| RunnerError::io("failed to release temporary disk name", err))?;
    Ok(path)
}

/// Resolve the disk for a run: the retained name if one was given (made
/// absolute), otherwise a reserved ephemeral path.
///
/// # Errors
/// `E_IO` if the working directory or temp directory cannot be read.
pub fn reserve_disk(layout: &DiskLayout) -> RunnerResult<DiskHandle> {
    match &layout.retain_as {
        Some(path) if path.is_absolute() => Ok(DiskHandle::retained(path.clone())),
        Some(path) => {
            let cwd = std::env::current_dir()
                .map_err(|err| RunnerError::io("failed to read working directory", err))?;
            Ok(DiskHandle::retained(cwd.join(path)))
        }
        None => reserve_ephemeral_path().map(DiskHandle::ephemeral),
    }
}
