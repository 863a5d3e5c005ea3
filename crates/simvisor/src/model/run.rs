use crate::model::DiskHandle;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Exit code reported when the harness itself is interrupted.
pub const INTERRUPTED_EXIT_CODE: i32 = 1;

/// Emulator command line, program first. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvocationSpec {
    tokens: Vec<String>,
}

impl InvocationSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        let mut tokens = Vec::with_capacity(args.len() + 1);
        tokens.push(program.into());
        tokens.extend(args);
        Self { tokens }
    }

    pub fn program(&self) -> &str {
        self.tokens.first().map_or("", String::as_str)
    }

    pub fn args(&self) -> &[String] {
        self.tokens.get(1..).unwrap_or(&[])
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// True when `token` appears anywhere in the command line.
    pub fn contains(&self, token: &str) -> bool {
        self.tokens.iter().any(|candidate| candidate == token)
    }

    /// True when `flag` is immediately followed by `value`.
    pub fn has_pair(&self, flag: &str, value: &str) -> bool {
        self.tokens
            .windows(2)
            .any(|pair| matches!(pair, [f, v] if f == flag && v == value))
    }
}

impl fmt::Display for InvocationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tokens.join(" "))
    }
}

/// Why a supervised run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationCause {
    /// The emulator exited on its own.
    NormalExit,
    /// The configured timeout elapsed.
    Timeout,
    /// The kernel printed its panic marker.
    KernelPanic,
    /// A user process was aborted by the kernel.
    UserAbort,
    /// The kernel's test framework printed its failure marker.
    TestFailureMarker,
    /// The boot marker appeared again: the guest reset.
    TripleFault,
    /// The harness received an interrupt.
    Interrupted,
}

impl TerminationCause {
    /// Causes that stop the run early as a detected kernel failure.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(
            self,
            Self::KernelPanic | Self::UserAbort | Self::TestFailureMarker | Self::TripleFault
        )
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::NormalExit => "normal exit",
            Self::Timeout => "timeout",
            Self::KernelPanic => "kernel panic",
            Self::UserAbort => "user process abort",
            Self::TestFailureMarker => "test failure",
            Self::TripleFault => "triple fault",
            Self::Interrupted => "interruption",
        }
    }
}

impl fmt::Display for TerminationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// What the supervisor observed about one emulator process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisionResult {
    pub cause: TerminationCause,
    /// Reaped exit code; `128 + signal` when the process died from a signal.
    /// `None` when no process was started.
    pub exit_code: Option<i32>,
    /// Boot markers seen on the console.
    pub boot_markers: u32,
    /// Whether the harness had to stop the process.
    pub terminated_by_harness: bool,
    /// Wall-clock time from spawn to reap.
    pub elapsed_ms: u64,
}

impl SupervisionResult {
    /// Exit code the harness reports for this run.
    ///
    /// A harness timeout is benign (0), an interruption is
    /// [`INTERRUPTED_EXIT_CODE`], anything else propagates the emulator's own
    /// code.
    #[must_use]
    pub fn outcome_code(&self) -> i32 {
        match self.cause {
            TerminationCause::Timeout => 0,
            TerminationCause::Interrupted => INTERRUPTED_EXIT_CODE,
            _ => self.exit_code.unwrap_or(INTERRUPTED_EXIT_CODE),
        }
    }
}

/// Summary of a complete run, suitable for `--report`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub disk: DiskHandle,
    pub invocation: InvocationSpec,
    pub warnings: Vec<String>,
    pub supervision: SupervisionResult,
}

impl RunReport {
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.supervision.outcome_code()
    }
}
