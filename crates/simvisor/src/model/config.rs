use crate::runner::{RunnerError, RunnerResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default guest memory in megabytes.
pub const DEFAULT_MEMORY_MB: u32 = 4;

/// Hardware emulator backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Simulator {
    /// QEMU (the only backend that runs).
    #[default]
    Qemu,
    /// Bochs.
    Bochs,
    /// VMware Player.
    Player,
}

impl Simulator {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Qemu => "qemu",
            Self::Bochs => "bochs",
            Self::Player => "player",
        }
    }
}

/// How the emulator is exposed for debugging.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugMode {
    /// No debugger; the emulator monitor is disabled.
    #[default]
    None,
    /// Pause at startup and wait on the emulator monitor.
    Monitor,
    /// Pause at startup and open the remote (gdb) debugging port.
    Gdb,
}

/// Where a partition's contents come from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionSource {
    /// Copy an existing partition image.
    File(PathBuf),
    /// Create an empty partition of this many megabytes.
    SizeMb(u32),
}

/// Inputs handed to the disk provisioner.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskLayout {
    /// Kernel partition image. When absent the provisioner looks in the
    /// usual build locations.
    pub kernel: Option<PathBuf>,
    /// File system partition.
    pub filesys: Option<PartitionSource>,
    /// Swap partition.
    pub swap: Option<PartitionSource>,
    /// Size of an empty scratch partition.
    pub scratch_mb: Option<u32>,
    /// Additional existing disks.
    pub extra_disks: Vec<PathBuf>,
    /// Bootstrap loader override.
    pub loader: Option<PathBuf>,
    /// Keep the built disk under this name instead of a throwaway temp file.
    pub retain_as: Option<PathBuf>,
}

/// Every parameter of one emulator run.
///
/// Built once through [`RunConfigurationBuilder`] and never mutated after;
/// components receive it by shared reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunConfiguration {
    simulator: Simulator,
    debug: DebugMode,
    memory_mb: u32,
    timeout_secs: Option<u64>,
    kill_on_failure: bool,
    no_vga: bool,
    no_serial: bool,
    terminal: bool,
    disk_layout: DiskLayout,
    kernel_args: Vec<String>,
}

impl RunConfiguration {
    #[must_use]
    pub fn builder() -> RunConfigurationBuilder {
        RunConfigurationBuilder::new()
    }

    pub fn simulator(&self) -> Simulator {
        self.simulator
    }

    pub fn debug(&self) -> DebugMode {
        self.debug
    }

    pub fn memory_mb(&self) -> u32 {
        self.memory_mb
    }

    pub fn timeout_secs(&self) -> Option<u64> {
        self.timeout_secs
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn kill_on_failure(&self) -> bool {
        self.kill_on_failure
    }

    pub fn no_vga(&self) -> bool {
        self.no_vga
    }

    pub fn no_serial(&self) -> bool {
        self.no_serial
    }

    /// Whether a text-console VGA display was requested.
    pub fn terminal(&self) -> bool {
        self.terminal
    }

    pub fn disk_layout(&self) -> &DiskLayout {
        &self.disk_layout
    }

    pub fn kernel_args(&self) -> &[String] {
        &self.kernel_args
    }
}

/// Fluent builder for [`RunConfiguration`]; [`build`](Self::build) enforces
/// the invariants.
///
/// ```
/// use simvisor::model::RunConfiguration;
///
/// let config = RunConfiguration::builder()
///     .memory_mb(8)
///     .no_vga(true)
///     .timeout_secs(Some(60))
///     .kernel_args(vec!["run".into(), "alarm-multiple".into()])
///     .build()
///     .unwrap();
/// assert_eq!(config.memory_mb(), 8);
/// ```
#[derive(Clone, Debug)]
pub struct RunConfigurationBuilder {
    config: RunConfiguration,
}

impl Default for RunConfigurationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RunConfigurationBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: RunConfiguration {
                simulator: Simulator::Qemu,
                debug: DebugMode::None,
                memory_mb: DEFAULT_MEMORY_MB,
                timeout_secs: None,
                kill_on_failure: false,
                no_vga: false,
                no_serial: false,
                terminal: false,
                disk_layout: DiskLayout::default(),
                kernel_args: Vec::new(),
            },
        }
    }

    #[must_use]
    pub fn simulator(mut self, simulator: Simulator) -> Self {
        self.config.simulator = simulator;
        self
    }

    #[must_use]
    pub fn debug(mut self, debug: DebugMode) -> Self {
        self.config.debug = debug;
        self
    }

    #[must_use]
    pub fn memory_mb(mut self, memory_mb: u32) -> Self {
        self.config.memory_mb = memory_mb;
        self
    }

    #[must_use]
    pub fn timeout_secs(mut self, timeout_secs: Option<u64>) -> Self {
        self.config.timeout_secs = timeout_secs;
        self
    }

    #[must_use]
    pub fn kill_on_failure(mut self, enabled: bool) -> Self {
        self.config.kill_on_failure = enabled;
        self
    }

    #[must_use]
    pub fn no_vga(mut self, enabled: bool) -> Self {
        self.config.no_vga = enabled;
        self
    }

    #[must_use]
    pub fn no_serial(mut self, enabled: bool) -> Self {
        self.config.no_serial = enabled;
        self
    }

    #[must_use]
    pub fn terminal(mut self, enabled: bool) -> Self {
        self.config.terminal = enabled;
        self
    }

    #[must_use]
    pub fn disk_layout(mut self, layout: DiskLayout) -> Self {
        self.config.disk_layout = layout;
        self
    }

    /// Mutate the disk layout in place.
    #[must_use]
    pub fn with_disk_layout(mut self, update: impl FnOnce(&mut DiskLayout)) -> Self {
        update(&mut self.config.disk_layout);
        self
    }

    #[must_use]
    pub fn kernel_args(mut self, args: Vec<String>) -> Self {
        self.config.kernel_args = args;
        self
    }

    /// Validate and freeze the configuration.
    ///
    /// # Errors
    /// `E_INVALID_CONFIG` when memory is zero, the timeout is zero, or a
    /// partition size is zero.
    pub fn build(self) -> RunnerResult<RunConfiguration> {
        let config = self.config;
        if config.memory_mb == 0 {
            return Err(RunnerError::invalid_config(
                "memory size must be a positive number of megabytes",
                serde_json::json!({ "memory_mb": 0 }),
            ));
        }
        if config.timeout_secs == Some(0) {
            return Err(RunnerError::invalid_config(
                "timeout must be a positive number of seconds",
                serde_json::json!({ "timeout_secs": 0 }),
            ));
        }
        let layout = &config.disk_layout;
        let sizes = [
            ("filesys", partition_size(layout.filesys.as_ref())),
            ("swap", partition_size(layout.swap.as_ref())),
            ("scratch", layout.scratch_mb),
        ];
        for (partition, size) in sizes {
            if size == Some(0) {
                return Err(RunnerError::invalid_config(
                    format!("{partition} partition size must be positive"),
                    serde_json::json!({ "partition": partition, "size_mb": 0 }),
                ));
            }
        }
        Ok(config)
    }
}

fn partition_size(source: Option<&PartitionSource>) -> Option<u32> {
    match source {
        Some(PartitionSource::SizeMb(size)) => Some(*size),
        Some(PartitionSource::File(_)) | None => None,
    }
}
