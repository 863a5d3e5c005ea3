pub mod config;
pub mod disk;
pub mod run;

pub use config::{
    DebugMode, DiskLayout, PartitionSource, RunConfiguration, RunConfigurationBuilder, Simulator,
    DEFAULT_MEMORY_MB,
};
pub use disk::DiskHandle;
pub use run::{
    InvocationSpec, RunReport, SupervisionResult, TerminationCause, INTERRUPTED_EXIT_CODE,
};
