//! simvisor: boots a teaching kernel under QEMU and decides whether it passed.
//!
//! A run provisions a disk image, builds the emulator command line, watches
//! the serial console for panic, abort, test-failure and reboot markers,
//! enforces a timeout, and always removes its temporary disk.
//!
//! ```no_run
//! use simvisor::model::RunConfiguration;
//! use simvisor::runner::{run, RunnerOptions};
//!
//! # fn example() -> simvisor::runner::RunnerResult<()> {
//! let config = RunConfiguration::builder()
//!     .kill_on_failure(true)
//!     .no_vga(true)
//!     .timeout_secs(Some(60))
//!     .kernel_args(vec!["-q".into(), "run".into(), "alarm-single".into()])
//!     .build()?;
//! let report = run(&config, &RunnerOptions::default(), &mut std::io::stdout())?;
//! std::process::exit(report.exit_code());
//! # }
//! ```

#![forbid(unsafe_code)]
// Library documentation is in progress. Public API types have docs;
// internal types will be documented in future releases.
#![allow(missing_docs)]

pub mod classifier;
pub mod disk;
pub mod invocation;
pub mod model;
pub mod profile;
pub mod runner;
pub mod supervisor;

pub use crate::model::*;
