// Test module - relaxed lint rules
#![allow(clippy::indexing_slicing)]
#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(missing_docs)]

use simvisor::invocation::{
    build_invocation, select_emulator, BinaryLocator, QEMU_COMPAT_CPU, QEMU_FALLBACK, QEMU_I386,
    QEMU_X86_64,
};
use simvisor::model::{DebugMode, DiskHandle, RunConfiguration};
use std::path::PathBuf;

/// Finds only the programs it was given, under `/opt/qemu/bin`.
struct Installed(Vec<&'static str>);

impl BinaryLocator for Installed {
    fn locate(&self, program: &str) -> Option<PathBuf> {
        self.0
            .contains(&program)
            .then(|| PathBuf::from("/opt/qemu/bin").join(program))
    }
}

fn disk() -> DiskHandle {
    DiskHandle::ephemeral("/tmp/run.dsk")
}

fn i386_only() -> Installed {
    Installed(vec![QEMU_I386])
}

#[test]
fn default_run_matches_classic_command_line() {
    let config = RunConfiguration::builder().build().unwrap();
    let invocation = build_invocation(&config, &disk(), &i386_only());

    assert_eq!(
        invocation.spec.to_string(),
        "/opt/qemu/bin/qemu-system-i386 \
         -drive file=/tmp/run.dsk,if=ide,index=0,media=disk \
         -m 4 -net none -serial stdio -monitor none -no-reboot"
    );
    assert!(invocation.warnings.is_empty());
}

#[test]
fn memory_and_headless_flags_are_rendered() {
    let config = RunConfiguration::builder()
        .memory_mb(8)
        .no_vga(true)
        .build()
        .unwrap();
    let invocation = build_invocation(&config, &disk(), &i386_only());
    let spec = &invocation.spec;

    assert!(spec.has_pair("-m", "8"));
    assert!(spec.has_pair("-display", "none"));
    assert!(spec.has_pair("-serial", "stdio"));
    assert!(spec.has_pair("-net", "none"));
    assert_eq!(spec.args().last().map(String::as_str), Some("-no-reboot"));
}

#[test]
fn no_reboot_is_present_in_every_mode() {
    for debug in [DebugMode::None, DebugMode::Monitor, DebugMode::Gdb] {
        for no_serial in [false, true] {
            let config = RunConfiguration::builder()
                .debug(debug)
                .no_serial(no_serial)
                .build()
                .unwrap();
            let invocation = build_invocation(&config, &disk(), &i386_only());
            assert!(
                invocation.spec.contains("-no-reboot"),
                "missing -no-reboot for {debug:?} no_serial={no_serial}"
            );
        }
    }
}

#[test]
fn debug_modes_select_monitor_or_gdb_stub() {
    let monitor = RunConfiguration::builder()
        .debug(DebugMode::Monitor)
        .build()
        .unwrap();
    let spec = build_invocation(&monitor, &disk(), &i386_only()).spec;
    assert!(spec.contains("-S"));
    assert!(!spec.contains("-s"));
    assert!(!spec.has_pair("-monitor", "none"));

    let gdb = RunConfiguration::builder()
        .debug(DebugMode::Gdb)
        .build()
        .unwrap();
    let spec = build_invocation(&gdb, &disk(), &i386_only()).spec;
    assert!(spec.has_pair("-s", "-S"));
    assert!(!spec.has_pair("-monitor", "none"));
}

#[test]
fn no_serial_drops_serial_redirection() {
    let config = RunConfiguration::builder().no_serial(true).build().unwrap();
    let spec = build_invocation(&config, &disk(), &i386_only()).spec;
    assert!(!spec.contains("-serial"));
}

#[test]
fn emulator_preference_order() {
    let native = select_emulator(&Installed(vec![QEMU_I386, QEMU_X86_64]));
    assert!(native.program.ends_with(QEMU_I386));
    assert!(!native.needs_compat_cpu);

    let wide = select_emulator(&Installed(vec![QEMU_X86_64]));
    assert!(wide.program.ends_with(QEMU_X86_64));
    assert!(wide.needs_compat_cpu);

    let none = select_emulator(&Installed(Vec::new()));
    assert_eq!(none.program, QEMU_FALLBACK);
    assert!(!none.needs_compat_cpu);
}

#[test]
fn x86_64_binary_gets_compat_cpu_first() {
    let config = RunConfiguration::builder().build().unwrap();
    let spec = build_invocation(&config, &disk(), &Installed(vec![QEMU_X86_64])).spec;
    assert_eq!(spec.args()[0], "-cpu");
    assert_eq!(spec.args()[1], QEMU_COMPAT_CPU);
}

#[test]
fn terminal_request_is_a_warning_not_an_error() {
    let config = RunConfiguration::builder().terminal(true).build().unwrap();
    let invocation = build_invocation(&config, &disk(), &i386_only());
    assert_eq!(invocation.warnings, vec!["qemu doesn't support --terminal"]);
}

#[test]
fn detection_without_serial_is_warned_about() {
    let config = RunConfiguration::builder()
        .no_serial(true)
        .kill_on_failure(true)
        .build()
        .unwrap();
    let invocation = build_invocation(&config, &disk(), &i386_only());
    assert_eq!(invocation.warnings.len(), 1);
    assert!(invocation.warnings[0].contains("serial output is disabled"));
}
