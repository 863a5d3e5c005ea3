//! Console-line classification.
//!
//! Rules are evaluated in table order and the first match wins, so a line
//! carrying several markers always resolves the same way.

use crate::model::TerminationCause;

pub const PANIC_MARKER: &str = "Kernel PANIC";
pub const ABORT_MARKER: &str = "User process ABORT";
pub const BOOT_MARKER: &str = "Pintos booting";
pub const FAILURE_MARKER: &str = "FAILED";

#[derive(Clone, Copy, Debug)]
enum Effect {
    Terminate(TerminationCause),
    BootMarker,
}

#[derive(Clone, Copy, Debug)]
struct Rule {
    marker: &'static str,
    effect: Effect,
}

const RULES: &[Rule] = &[
    Rule {
        marker: PANIC_MARKER,
        effect: Effect::Terminate(TerminationCause::KernelPanic),
    },
    Rule {
        marker: ABORT_MARKER,
        effect: Effect::Terminate(TerminationCause::UserAbort),
    },
    Rule {
        marker: BOOT_MARKER,
        effect: Effect::BootMarker,
    },
    Rule {
        marker: FAILURE_MARKER,
        effect: Effect::Terminate(TerminationCause::TestFailureMarker),
    },
];

/// Result of classifying one line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Classification {
    pub cause: Option<TerminationCause>,
    /// Boot markers seen so far, including this line.
    pub boot_markers: u32,
}

/// Classify `line` given the boot markers already seen in this run.
///
/// The boot marker is counted on every occurrence; it only yields
/// [`TerminationCause::TripleFault`] from the second occurrence on.
#[must_use]
pub fn classify_line(line: &str, boot_markers: u32) -> Classification {
    let Some(rule) = RULES.iter().find(|rule| line.contains(rule.marker)) else {
        return Classification {
            cause: None,
            boot_markers,
        };
    };
    match rule.effect {
        Effect::Terminate(cause) => Classification {
            cause: Some(cause),
            boot_markers,
        },
        Effect::BootMarker => {
            let seen = boot_markers.saturating_add(1);
            Classification {
                cause: (boot_markers >= 1).then_some(TerminationCause::TripleFault),
                boot_markers: seen,
            }
        }
    }
}

/// Running classifier over one run's console stream.
#[derive(Clone, Debug, Default)]
pub struct OutputClassifier {
    boot_markers: u32,
}

impl OutputClassifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line; returns the cause that should stop the run, if any.
    pub fn observe(&mut self, line: &str) -> Option<TerminationCause> {
        let classification = classify_line(line, self.boot_markers);
        self.boot_markers = classification.boot_markers;
        classification.cause
    }

    pub fn boot_markers(&self) -> u32 {
        self.boot_markers
    }
}
