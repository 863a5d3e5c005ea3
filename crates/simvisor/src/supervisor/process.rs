//! Emulator child process: spawn, signal, reap.

use super::{SupervisorEvent, EXIT_POLL_INTERVAL};
use crate::model::InvocationSpec;
use crate::runner::{RunnerError, RunnerResult};
use nix::sys::signal::{kill, Signal};
use nix::unistd::{pipe, Pid};
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::os::unix::process::ExitStatusExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::Sender;
use std::thread;
use std::time::{Duration, Instant};

/// An emulator process that is reaped exactly once.
///
/// Dropping an unreaped process kills and reaps it, so early returns never
/// leave a zombie or a stray emulator behind.
pub(crate) struct EmulatorProcess {
    child: Child,
    pid: Pid,
    reaped: bool,
}

impl EmulatorProcess {
    /// Spawn with stdout and stderr sharing one pipe; returns the read end.
    pub(crate) fn spawn_merged(spec: &InvocationSpec) -> RunnerResult<(Self, File)> {
        let (read_end, write_end) =
            pipe().map_err(|err| RunnerError::io("failed to create output pipe", err))?;
        let stderr_end = write_end
            .try_clone()
            .map_err(|err| RunnerError::io("failed to duplicate output pipe", err))?;

        let mut command = Command::new(spec.program());
        command
            .args(spec.args())
            .stdin(Stdio::inherit())
            .stdout(Stdio::from(write_end))
            .stderr(Stdio::from(stderr_end));
        let process = Self::spawn(&mut command, spec)?;
        // The command holds our copies of the write end; EOF only arrives
        // once they are closed.
        drop(command);
        Ok((process, File::from(read_end)))
    }

    /// Spawn sharing the harness's own stdio.
    pub(crate) fn spawn_inherited(spec: &InvocationSpec) -> RunnerResult<Self> {
        let mut command = Command::new(spec.program());
        command.args(spec.args());
        Self::spawn(&mut command, spec)
    }

    fn spawn(command: &mut Command, spec: &InvocationSpec) -> RunnerResult<Self> {
        let child = command
            .spawn()
            .map_err(|err| RunnerError::spawn(spec.program(), err))?;
        let pid = i32::try_from(child.id())
            .map(Pid::from_raw)
            .map_err(|_| RunnerError::internal("child pid does not fit in pid_t"))?;
        tracing::debug!(pid = pid.as_raw(), program = spec.program(), "emulator spawned");
        Ok(Self {
            child,
            pid,
            reaped: false,
        })
    }

    /// Non-blocking exit check.
    pub(crate) fn try_reap(&mut self) -> RunnerResult<Option<i32>> {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.reaped = true;
                Ok(Some(exit_code_of(status)))
            }
            Ok(None) => Ok(None),
            Err(err) => Err(RunnerError::io("failed to poll emulator", err)),
        }
    }

    /// Blocking reap.
    pub(crate) fn reap(&mut self) -> RunnerResult<i32> {
        let status = self
            .child
            .wait()
            .map_err(|err| RunnerError::io("failed to wait for emulator", err))?;
        self.reaped = true;
        Ok(exit_code_of(status))
    }

    /// SIGTERM, then SIGKILL if still alive after `kill_grace`; always reaps.
    pub(crate) fn terminate(&mut self, kill_grace: Duration) -> RunnerResult<i32> {
        signal(self.pid, Signal::SIGTERM)?;
        if let Some(code) = self.wait_for_exit(kill_grace)? {
            return Ok(code);
        }
        tracing::debug!(pid = self.pid.as_raw(), "emulator ignored SIGTERM, killing");
        signal(self.pid, Signal::SIGKILL)?;
        self.reap()
    }

    fn wait_for_exit(&mut self, timeout: Duration) -> RunnerResult<Option<i32>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(code) = self.try_reap()? {
                return Ok(Some(code));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }
    }
}

impl Drop for EmulatorProcess {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        let _ = signal(self.pid, Signal::SIGKILL);
        let _ = self.child.wait();
    }
}

fn signal(pid: Pid, signal: Signal) -> RunnerResult<()> {
    match kill(pid, signal) {
        // ESRCH means process already gone, which is fine
        Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(err) => Err(RunnerError::io("failed to signal emulator", err)),
    }
}

/// Exit code, or `128 + signal` for a signal death.
fn exit_code_of(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}

/// Read the combined output stream line by line on a dedicated thread.
///
/// Lines are decoded lossily: serial consoles emit stray bytes.
pub(crate) fn spawn_line_reader(output: File, tx: Sender<SupervisorEvent>) -> RunnerResult<()> {
    thread::Builder::new()
        .name("emulator-output".to_string())
        .spawn(move || {
            let mut reader = BufReader::new(output);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => {
                        let _ = tx.send(SupervisorEvent::Closed);
                        return;
                    }
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf).into_owned();
                        if tx.send(SupervisorEvent::Line(line)).is_err() {
                            return;
                        }
                    }
                    Err(err) if err.kind() == ErrorKind::Interrupted => {}
                    Err(err) => {
                        let _ = tx.send(SupervisorEvent::ReadFailed(err));
                        return;
                    }
                }
            }
        })
        .map(|_| ())
        .map_err(|err| RunnerError::io("failed to start output reader", err))
}
