// Test module - relaxed lint rules
#![allow(clippy::indexing_slicing)]
#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(missing_docs)]

use simvisor::disk::DiskProvisioner;
use simvisor::invocation::{BinaryLocator, QEMU_I386};
use simvisor::model::{
    DiskHandle, DiskLayout, RunConfiguration, Simulator, TerminationCause,
};
use simvisor::runner::{run, ErrorCode, RunnerError, RunnerOptions, RunnerResult};
use simvisor::supervisor::{Interrupter, SupervisorOptions};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Copy)]
enum Outcome {
    Succeed,
    Fail,
    Panic,
}

/// Writes a placeholder image and remembers where it put it.
struct FakeProvisioner {
    outcome: Outcome,
    seen: Arc<Mutex<Option<PathBuf>>>,
}

impl DiskProvisioner for FakeProvisioner {
    fn provision(
        &self,
        _layout: &DiskLayout,
        disk: &DiskHandle,
        _kernel_args: &[String],
    ) -> RunnerResult<()> {
        std::fs::write(disk.path(), b"disk image").unwrap();
        *self.seen.lock().unwrap() = Some(disk.path().to_path_buf());
        match self.outcome {
            Outcome::Succeed => Ok(()),
            Outcome::Fail => Err(RunnerError::provision(
                "error creating disk: no kernel",
                None,
            )),
            Outcome::Panic => panic!("provisioner blew up"),
        }
    }
}

/// Stands `/bin/echo` in for the emulator: it prints its arguments and exits 0.
struct EchoEmulator;

impl BinaryLocator for EchoEmulator {
    fn locate(&self, program: &str) -> Option<PathBuf> {
        (program == QEMU_I386).then(|| PathBuf::from("/bin/echo"))
    }
}

fn options(outcome: Outcome) -> (RunnerOptions, Arc<Mutex<Option<PathBuf>>>) {
    let seen = Arc::new(Mutex::new(None));
    let options = RunnerOptions {
        provisioner: Box::new(FakeProvisioner {
            outcome,
            seen: Arc::clone(&seen),
        }),
        locator: Box::new(EchoEmulator),
        supervisor: SupervisorOptions {
            grace_period: Duration::from_millis(100),
            kill_grace: Duration::from_millis(500),
        },
        interrupter: Interrupter::new(),
    };
    (options, seen)
}

fn detecting() -> RunConfiguration {
    RunConfiguration::builder()
        .kill_on_failure(true)
        .build()
        .unwrap()
}

fn seen_path(seen: &Arc<Mutex<Option<PathBuf>>>) -> PathBuf {
    seen.lock().unwrap().clone().expect("provisioner was not called")
}

#[test]
fn ephemeral_disk_is_removed_after_a_clean_run() {
    let (options, seen) = options(Outcome::Succeed);
    let mut out = Vec::new();

    let report = run(&detecting(), &options, &mut out).unwrap();

    assert_eq!(report.supervision.cause, TerminationCause::NormalExit);
    assert_eq!(report.exit_code(), 0);
    assert!(report.disk.is_ephemeral());
    assert_eq!(report.disk.path(), seen_path(&seen));
    assert!(!report.disk.path().exists());

    let text = String::from_utf8(out).unwrap();
    let drive = format!("file={},if=ide", report.disk.path().display());
    assert!(text.starts_with("/bin/echo "));
    assert!(text.contains(&drive));
}

#[test]
fn ephemeral_disk_is_removed_when_provisioning_fails() {
    let (options, seen) = options(Outcome::Fail);
    let mut out = Vec::new();

    let err = run(&detecting(), &options, &mut out).unwrap_err();

    assert_eq!(err.code, ErrorCode::DiskProvision);
    assert!(err.message.contains("no kernel"));
    assert!(!seen_path(&seen).exists());
    assert!(out.is_empty(), "no emulator may start after a provisioning failure");
}

#[test]
fn ephemeral_disk_is_removed_when_provisioning_panics() {
    let (options, seen) = options(Outcome::Panic);
    let mut out = Vec::new();

    let result = panic::catch_unwind(AssertUnwindSafe(|| run(&detecting(), &options, &mut out)));

    assert!(result.is_err());
    assert!(!seen_path(&seen).exists());
}

#[test]
fn ephemeral_disk_is_removed_after_an_interrupt() {
    let (options, seen) = options(Outcome::Succeed);
    options.interrupter.interrupt();
    let mut out = Vec::new();

    let report = run(&detecting(), &options, &mut out).unwrap();

    assert_eq!(report.supervision.cause, TerminationCause::Interrupted);
    assert_eq!(report.exit_code(), 1);
    assert!(!seen_path(&seen).exists());
}

#[test]
fn retained_disk_is_kept() {
    let dir = tempfile::tempdir().unwrap();
    let keep = dir.path().join("keep.dsk");
    let config = RunConfiguration::builder()
        .kill_on_failure(true)
        .with_disk_layout(|layout| layout.retain_as = Some(keep.clone()))
        .build()
        .unwrap();
    let (options, _seen) = options(Outcome::Succeed);
    let mut out = Vec::new();

    let report = run(&config, &options, &mut out).unwrap();

    assert!(!report.disk.is_ephemeral());
    assert_eq!(report.disk.path(), keep.as_path());
    assert!(keep.exists());
}

#[test]
fn unsupported_simulator_is_rejected_before_provisioning() {
    let config = RunConfiguration::builder()
        .simulator(Simulator::Bochs)
        .build()
        .unwrap();
    let (options, seen) = options(Outcome::Succeed);
    let mut out = Vec::new();

    let err = run(&config, &options, &mut out).unwrap_err();

    assert_eq!(err.code, ErrorCode::UnsupportedSimulator);
    assert_eq!(err.message, "simulator bochs not implemented yet");
    assert!(seen.lock().unwrap().is_none());
}

#[test]
fn invocation_warnings_precede_the_command_line() {
    let config = RunConfiguration::builder()
        .kill_on_failure(true)
        .terminal(true)
        .build()
        .unwrap();
    let (options, _seen) = options(Outcome::Succeed);
    let mut out = Vec::new();

    let report = run(&config, &options, &mut out).unwrap();

    assert_eq!(report.warnings, vec!["qemu doesn't support --terminal"]);
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("warning: qemu doesn't support --terminal\n/bin/echo "));
}
