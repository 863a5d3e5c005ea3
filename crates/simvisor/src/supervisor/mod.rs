//! Runs one emulator process and decides how the run ended.
//!
//! With `kill_on_failure` set, the supervisor reads the emulator's combined
//! stdout/stderr line by line, echoes each line to its output sink, and stops
//! the emulator as soon as the [`OutputClassifier`] reports a failure. Without
//! it, the emulator shares the harness's terminal and the supervisor only
//! waits for it, bounded by the optional timeout.
//!
//! # States
//!
//! `Running` ends in exactly one of `NormalExit`, `Timeout`, a detected
//! failure (`KernelPanic`, `UserAbort`, `TestFailureMarker`, `TripleFault`),
//! or `Interrupted`.
//!
//! The timeout is checked when a line arrives, not on an idle timer: an
//! emulator that goes silent is only stopped once it prints again or exits.

mod interrupt;
mod process;

pub use interrupt::Interrupter;

use crate::classifier::OutputClassifier;
use crate::model::{InvocationSpec, RunConfiguration, SupervisionResult, TerminationCause};
use crate::runner::{RunnerError, RunnerResult};
use process::{spawn_line_reader, EmulatorProcess};
use std::io::Write;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

/// Default pause between detecting a failure and stopping the emulator.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);
/// Default wait between SIGTERM and SIGKILL.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(2);

/// Poll interval while waiting for the emulator to exit.
pub(crate) const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Timing knobs for the supervisor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SupervisorOptions {
    /// Lets trailing output flush before a failed emulator is stopped.
    pub grace_period: Duration,
    /// How long SIGTERM is given before SIGKILL.
    pub kill_grace: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }
}

/// Events consumed by the supervision loop, in arrival order.
#[derive(Debug)]
pub(crate) enum SupervisorEvent {
    /// One line of combined output, newline included when present.
    Line(String),
    /// The output stream reached end of file.
    Closed,
    /// Reading the output stream failed.
    ReadFailed(std::io::Error),
    /// The harness was interrupted.
    Interrupted,
}

/// Supervises a single emulator process for one run.
#[derive(Debug)]
pub struct ExecutionSupervisor<'a> {
    config: &'a RunConfiguration,
    options: SupervisorOptions,
    interrupter: Interrupter,
}

impl<'a> ExecutionSupervisor<'a> {
    pub fn new(
        config: &'a RunConfiguration,
        options: SupervisorOptions,
        interrupter: Interrupter,
    ) -> Self {
        Self {
            config,
            options,
            interrupter,
        }
    }

    /// Print the command line, run it, and report how it ended.
    ///
    /// Console traffic (the command line, echoed output, notices) goes to
    /// `out`.
    ///
    /// # Errors
    /// - `E_EMULATOR_SPAWN`: the emulator binary could not be started
    /// - `E_IO`: pipe, reader, or output sink failure
    pub fn supervise<W: Write>(
        &self,
        spec: &InvocationSpec,
        out: &mut W,
    ) -> RunnerResult<SupervisionResult> {
        if self.interrupter.is_raised() {
            tracing::info!("interrupted before the emulator was started");
            return Ok(SupervisionResult {
                cause: TerminationCause::Interrupted,
                exit_code: None,
                boot_markers: 0,
                terminated_by_harness: false,
                elapsed_ms: 0,
            });
        }
        write_line(out, &spec.to_string())?;
        tracing::info!(
            command = %spec,
            kill_on_failure = self.config.kill_on_failure(),
            timeout_secs = ?self.config.timeout_secs(),
            "starting emulator"
        );
        if self.config.kill_on_failure() {
            self.run_with_detection(spec, out)
        } else {
            self.run_passive(spec, out)
        }
    }

    fn run_with_detection<W: Write>(
        &self,
        spec: &InvocationSpec,
        out: &mut W,
    ) -> RunnerResult<SupervisionResult> {
        let (mut process, output) = EmulatorProcess::spawn_merged(spec)?;
        let started = Instant::now();
        let (tx, rx) = mpsc::channel();
        let _listening = self.interrupter.listen(tx.clone());
        if self.interrupter.is_raised() {
            return self.stop_on_interrupt(&mut process, started, 0);
        }
        spawn_line_reader(output, tx)?;

        let timeout = self.config.timeout();
        let mut classifier = OutputClassifier::new();
        loop {
            let event = rx
                .recv()
                .map_err(|_| RunnerError::internal("emulator output channel closed"))?;
            match event {
                SupervisorEvent::Line(line) => {
                    echo(out, &line)?;
                    if let Some(limit) = timeout {
                        if started.elapsed() > limit {
                            return self.stop_on_timeout(
                                &mut process,
                                out,
                                started,
                                classifier.boot_markers(),
                            );
                        }
                    }
                    if let Some(cause) = classifier.observe(&line) {
                        return self.stop_on_failure(
                            &mut process,
                            out,
                            &rx,
                            cause,
                            started,
                            classifier.boot_markers(),
                        );
                    }
                }
                SupervisorEvent::Closed => {
                    let exit_code = process.reap()?;
                    return Ok(self.exited(exit_code, classifier.boot_markers(), started));
                }
                SupervisorEvent::ReadFailed(err) => {
                    process.terminate(self.options.kill_grace)?;
                    return Err(RunnerError::io("failed to read emulator output", err));
                }
                SupervisorEvent::Interrupted => {
                    return self.stop_on_interrupt(
                        &mut process,
                        started,
                        classifier.boot_markers(),
                    );
                }
            }
        }
    }

    fn run_passive<W: Write>(
        &self,
        spec: &InvocationSpec,
        out: &mut W,
    ) -> RunnerResult<SupervisionResult> {
        let mut process = EmulatorProcess::spawn_inherited(spec)?;
        let started = Instant::now();
        let timeout = self.config.timeout();
        loop {
            if let Some(exit_code) = process.try_reap()? {
                return Ok(self.exited(exit_code, 0, started));
            }
            if self.interrupter.is_raised() {
                return self.stop_on_interrupt(&mut process, started, 0);
            }
            if timeout.is_some_and(|limit| started.elapsed() > limit) {
                return self.stop_on_timeout(&mut process, out, started, 0);
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }
    }

    /// Result for an emulator that exited on its own.
    ///
    /// A terminal Ctrl-C reaches the emulator and the harness together, so
    /// an exit seen after the interrupter was raised is still an interruption.
    fn exited(&self, exit_code: i32, boot_markers: u32, started: Instant) -> SupervisionResult {
        if self.interrupter.is_raised() {
            tracing::info!(exit_code, "emulator exited after an interrupt");
            return finished(
                TerminationCause::Interrupted,
                exit_code,
                boot_markers,
                false,
                started,
            );
        }
        tracing::info!(exit_code, "emulator exited");
        finished(
            TerminationCause::NormalExit,
            exit_code,
            boot_markers,
            false,
            started,
        )
    }

    fn stop_on_timeout<W: Write>(
        &self,
        process: &mut EmulatorProcess,
        out: &mut W,
        started: Instant,
        boot_markers: u32,
    ) -> RunnerResult<SupervisionResult> {
        let secs = self.config.timeout_secs().unwrap_or_default();
        tracing::info!(timeout_secs = secs, "timeout elapsed, stopping emulator");
        let exit_code = process.terminate(self.options.kill_grace)?;
        write_line(out, &format!("\nTIMEOUT after {secs} seconds"))?;
        Ok(finished(
            TerminationCause::Timeout,
            exit_code,
            boot_markers,
            true,
            started,
        ))
    }

    fn stop_on_failure<W: Write>(
        &self,
        process: &mut EmulatorProcess,
        out: &mut W,
        rx: &Receiver<SupervisorEvent>,
        cause: TerminationCause,
        started: Instant,
        boot_markers: u32,
    ) -> RunnerResult<SupervisionResult> {
        write_line(out, &format!("Simulation terminated due to {cause}."))?;
        tracing::warn!(%cause, "failure detected, stopping emulator after grace period");
        if wait_out_grace(rx, self.options.grace_period) {
            return self.stop_on_interrupt(process, started, boot_markers);
        }
        let exit_code = process.terminate(self.options.kill_grace)?;
        Ok(finished(cause, exit_code, boot_markers, true, started))
    }

    fn stop_on_interrupt(
        &self,
        process: &mut EmulatorProcess,
        started: Instant,
        boot_markers: u32,
    ) -> RunnerResult<SupervisionResult> {
        tracing::info!("interrupted, stopping emulator");
        let exit_code = process.terminate(self.options.kill_grace)?;
        Ok(finished(
            TerminationCause::Interrupted,
            exit_code,
            boot_markers,
            true,
            started,
        ))
    }
}

/// Sit out the grace period; output arriving meanwhile is discarded.
/// Returns true if an interrupt arrived.
fn wait_out_grace(rx: &Receiver<SupervisorEvent>, grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return false;
        }
        match rx.recv_timeout(remaining) {
            Ok(SupervisorEvent::Interrupted) => return true,
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return false,
        }
    }
}

fn finished(
    cause: TerminationCause,
    exit_code: i32,
    boot_markers: u32,
    terminated_by_harness: bool,
    started: Instant,
) -> SupervisionResult {
    // Elapsed time is always well under u64::MAX
    #[allow(clippy::cast_possible_truncation)]
    let elapsed_ms = started.elapsed().as_millis() as u64;
    SupervisionResult {
        cause,
        exit_code: Some(exit_code),
        boot_markers,
        terminated_by_harness,
        elapsed_ms,
    }
}

fn echo<W: Write>(out: &mut W, line: &str) -> RunnerResult<()> {
    out.write_all(line.as_bytes())
        .and_then(|()| out.flush())
        .map_err(|err| RunnerError::io("failed to echo emulator output", err))
}

fn write_line<W: Write>(out: &mut W, text: &str) -> RunnerResult<()> {
    writeln!(out, "{text}")
        .and_then(|()| out.flush())
        .map_err(|err| RunnerError::io("failed to write console notice", err))
}
