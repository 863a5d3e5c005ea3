//! Run profiles: JSON or YAML files supplying defaults for a run.
//!
//! Explicit command-line flags take precedence over profile values; the CLI
//! applies the profile to a [`RunConfigurationBuilder`] first and its flags
//! on top.

use crate::model::{DebugMode, PartitionSource, RunConfigurationBuilder};
use crate::runner::{RunnerError, RunnerResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunProfile {
    #[serde(default)]
    pub memory_mb: Option<u32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub kill_on_failure: Option<bool>,
    #[serde(default)]
    pub no_vga: Option<bool>,
    #[serde(default)]
    pub no_serial: Option<bool>,
    #[serde(default)]
    pub terminal: Option<bool>,
    #[serde(default)]
    pub debug: Option<DebugMode>,
    #[serde(default)]
    pub kernel: Option<PathBuf>,
    #[serde(default)]
    pub filesys: Option<PartitionSource>,
    #[serde(default)]
    pub swap: Option<PartitionSource>,
    #[serde(default)]
    pub scratch_mb: Option<u32>,
    #[serde(default)]
    pub disks: Vec<PathBuf>,
    #[serde(default)]
    pub loader: Option<PathBuf>,
    /// Keep the built disk under this name instead of a temporary one.
    #[serde(default)]
    pub make_disk: Option<PathBuf>,
    /// Disk provisioning command, program first.
    #[serde(default)]
    pub mkdisk: Option<Vec<String>>,
    /// Pause before stopping a failed emulator, in milliseconds.
    #[serde(default)]
    pub grace_period_ms: Option<u64>,
    #[serde(default)]
    pub kernel_args: Vec<String>,
}

impl RunProfile {
    /// Seed `builder` with every value this profile sets.
    #[must_use]
    pub fn apply(&self, mut builder: RunConfigurationBuilder) -> RunConfigurationBuilder {
        if let Some(memory_mb) = self.memory_mb {
            builder = builder.memory_mb(memory_mb);
        }
        if self.timeout_secs.is_some() {
            builder = builder.timeout_secs(self.timeout_secs);
        }
        if let Some(enabled) = self.kill_on_failure {
            builder = builder.kill_on_failure(enabled);
        }
        if let Some(enabled) = self.no_vga {
            builder = builder.no_vga(enabled);
        }
        if let Some(enabled) = self.no_serial {
            builder = builder.no_serial(enabled);
        }
        if let Some(enabled) = self.terminal {
            builder = builder.terminal(enabled);
        }
        if let Some(debug) = self.debug {
            builder = builder.debug(debug);
        }
        if !self.kernel_args.is_empty() {
            builder = builder.kernel_args(self.kernel_args.clone());
        }
        builder.with_disk_layout(|layout| {
            layout.kernel = self.kernel.clone();
            layout.filesys = self.filesys.clone();
            layout.swap = self.swap.clone();
            layout.scratch_mb = self.scratch_mb;
            layout.extra_disks = self.disks.clone();
            layout.loader = self.loader.clone();
            layout.retain_as = self.make_disk.clone();
        })
    }
}

/// Load a profile; `.yaml`/`.yml` files are parsed as YAML, anything else as
/// JSON.
///
/// # Errors
/// `E_IO` if the file cannot be read, `E_INVALID_CONFIG` if it does not
/// parse.
pub fn load_profile(path: &Path) -> RunnerResult<RunProfile> {
    let data = fs::read_to_string(path)
        .map_err(|err| RunnerError::io("failed to read profile file", err))?;
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == "yaml" || ext == "yml");
    if is_yaml {
        serde_yml::from_str(&data).map_err(|err| parse_error(path, "yaml", &err))
    } else {
        serde_json::from_str(&data).map_err(|err| parse_error(path, "json", &err))
    }
}

fn parse_error(path: &Path, format: &str, err: &dyn std::fmt::Display) -> RunnerError {
    RunnerError::invalid_config(
        format!("failed to parse {format} profile"),
        serde_json::json!({
            "path": path.display().to_string(),
            "parse_error": err.to_string(),
        }),
    )
}
