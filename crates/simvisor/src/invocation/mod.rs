//! Translates a [`RunConfiguration`] into a QEMU command line.
//!
//! [`build_invocation`] is pure: the only environment lookup, finding the
//! emulator binary, goes through the [`BinaryLocator`] it is handed.

use crate::model::{DebugMode, DiskHandle, InvocationSpec, RunConfiguration};
use std::path::PathBuf;

/// Emulator targeting 32-bit x86 guests natively.
pub const QEMU_I386: &str = "qemu-system-i386";
/// 64-bit emulator; needs [`QEMU_COMPAT_CPU`] to run a 32-bit guest.
pub const QEMU_X86_64: &str = "qemu-system-x86_64";
/// Last-resort name, passed through unresolved.
pub const QEMU_FALLBACK: &str = "qemu";
/// CPU model forcing 32-bit guest emulation on the 64-bit binary.
pub const QEMU_COMPAT_CPU: &str = "qemu32";

/// Resolves a program name against some search path.
pub trait BinaryLocator {
    fn locate(&self, program: &str) -> Option<PathBuf>;
}

/// Looks programs up on `PATH`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SearchPath;

impl BinaryLocator for SearchPath {
    fn locate(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }
}

/// The emulator binary chosen for a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmulatorBinary {
    pub program: String,
    /// Whether `-cpu qemu32` must be passed.
    pub needs_compat_cpu: bool,
}

/// Pick the emulator: native i386 first, then x86-64 with a CPU override,
/// then the bare fallback name (which fails at spawn if absent).
pub fn select_emulator(locator: &dyn BinaryLocator) -> EmulatorBinary {
    if let Some(path) = locator.locate(QEMU_I386) {
        return EmulatorBinary {
            program: path.display().to_string(),
            needs_compat_cpu: false,
        };
    }
    if let Some(path) = locator.locate(QEMU_X86_64) {
        return EmulatorBinary {
            program: path.display().to_string(),
            needs_compat_cpu: true,
        };
    }
    EmulatorBinary {
        program: QEMU_FALLBACK.to_string(),
        needs_compat_cpu: false,
    }
}

/// A built command line plus the non-fatal warnings raised building it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub spec: InvocationSpec,
    pub warnings: Vec<String>,
}

/// Build the QEMU invocation for `config` booting from `disk`.
pub fn build_invocation(
    config: &RunConfiguration,
    disk: &DiskHandle,
    locator: &dyn BinaryLocator,
) -> Invocation {
    let binary = select_emulator(locator);
    let mut args: Vec<String> = Vec::new();
    let mut push = |tokens: &[&str]| args.extend(tokens.iter().map(|t| (*t).to_string()));

    if binary.needs_compat_cpu {
        push(&["-cpu", QEMU_COMPAT_CPU]);
    }
    let drive = format!(
        "file={},if=ide,index=0,media=disk",
        disk.path().display()
    );
    push(&["-drive", drive.as_str()]);
    let memory = config.memory_mb().to_string();
    push(&["-m", memory.as_str()]);
    push(&["-net", "none"]);

    if config.no_vga() {
        push(&["-display", "none"]);
    }
    // Serial on stdio is the only path from the guest console to the classifier.
    if !config.no_serial() {
        push(&["-serial", "stdio"]);
    }
    match config.debug() {
        DebugMode::None => push(&["-monitor", "none"]),
        DebugMode::Monitor => push(&["-S"]),
        DebugMode::Gdb => push(&["-s", "-S"]),
    }
    // A triple fault must end the process instead of rebooting forever.
    push(&["-no-reboot"]);

    Invocation {
        spec: InvocationSpec::new(binary.program, args),
        warnings: collect_warnings(config),
    }
}

fn collect_warnings(config: &RunConfiguration) -> Vec<String> {
    let mut warnings = Vec::new();
    if config.terminal() {
        warnings.push("qemu doesn't support --terminal".to_string());
    }
    if config.no_serial() && config.kill_on_failure() {
        warnings.push(
            "serial output is disabled; failure detection only sees emulator diagnostics"
                .to_string(),
        );
    }
    warnings
}
