//! Error model shared by every stage of a run.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub type RunnerResult<T> = Result<T, RunnerError>;

/// Stable error codes, each with a fixed process exit code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Run configuration violates an invariant.
    #[serde(rename = "E_INVALID_CONFIG")]
    InvalidConfig,
    /// A simulator other than QEMU was selected.
    #[serde(rename = "E_UNSUPPORTED_SIMULATOR")]
    UnsupportedSimulator,
    /// The external disk provisioner failed or could not be started.
    #[serde(rename = "E_DISK_PROVISION")]
    DiskProvision,
    /// The emulator binary could not be started.
    #[serde(rename = "E_EMULATOR_SPAWN")]
    EmulatorSpawn,
    /// Filesystem, pipe, or console I/O failed.
    #[serde(rename = "E_IO")]
    Io,
    /// Harness bug.
    #[serde(rename = "E_INTERNAL")]
    Internal,
}

impl ErrorCode {
    pub const ALL: [Self; 6] = [
        Self::InvalidConfig,
        Self::UnsupportedSimulator,
        Self::DiskProvision,
        Self::EmulatorSpawn,
        Self::Io,
        Self::Internal,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidConfig => "E_INVALID_CONFIG",
            Self::UnsupportedSimulator => "E_UNSUPPORTED_SIMULATOR",
            Self::DiskProvision => "E_DISK_PROVISION",
            Self::EmulatorSpawn => "E_EMULATOR_SPAWN",
            Self::Io => "E_IO",
            Self::Internal => "E_INTERNAL",
        }
    }

    /// Parse the wire form (`E_...`) of a code.
    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|candidate| candidate.as_str() == code)
    }

    /// Process exit code reported by the CLI for this error.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::UnsupportedSimulator => 1,
            Self::InvalidConfig => 2,
            Self::DiskProvision => 3,
            Self::EmulatorSpawn => 4,
            Self::Io => 5,
            Self::Internal => 6,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure of the harness itself (as opposed to a failing kernel, which is
/// an outcome and not an error).
#[derive(Debug, thiserror::Error, Diagnostic)]
#[error("{code}: {message}")]
pub struct RunnerError {
    pub code: ErrorCode,
    pub message: String,
    pub context: Option<Value>,
}

impl RunnerError {
    pub fn new(
        code: ErrorCode,
        message: impl Into<String>,
        context: impl Into<Option<Value>>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            context: context.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>, context: impl Into<Option<Value>>) -> Self {
        Self::new(ErrorCode::InvalidConfig, message, context)
    }

    pub fn unsupported_simulator(name: &str) -> Self {
        Self::new(
            ErrorCode::UnsupportedSimulator,
            format!("simulator {name} not implemented yet"),
            serde_json::json!({ "simulator": name, "supported": ["qemu"] }),
        )
    }

    pub fn provision(message: impl Into<String>, context: impl Into<Option<Value>>) -> Self {
        Self::new(ErrorCode::DiskProvision, message, context)
    }

    pub fn spawn(program: &str, err: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::EmulatorSpawn,
            format!("failed to start emulator '{program}'"),
            serde_json::json!({ "program": program, "source": err.to_string() }),
        )
    }

    pub fn io(message: impl Into<String>, err: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::Io,
            message,
            serde_json::json!({ "source": err.to_string() }),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message, None)
    }

    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.code.exit_code()
    }
}
