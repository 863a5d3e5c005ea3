use super::SupervisorEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

/// Cloneable handle used to interrupt a run from another thread (the Ctrl-C
/// handler in the CLI).
///
/// Once raised it stays raised: a run that has not spawned its emulator yet
/// will not spawn it.
#[derive(Clone, Debug, Default)]
pub struct Interrupter {
    inner: Arc<InterruptState>,
}

#[derive(Debug, Default)]
struct InterruptState {
    raised: AtomicBool,
    listener: Mutex<Option<Sender<SupervisorEvent>>>,
}

impl Interrupter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the interrupt and wake the supervision loop if one is waiting.
    pub fn interrupt(&self) {
        self.inner.raised.store(true, Ordering::SeqCst);
        if let Ok(listener) = self.inner.listener.lock() {
            if let Some(tx) = listener.as_ref() {
                let _ = tx.send(SupervisorEvent::Interrupted);
            }
        }
    }

    pub fn is_raised(&self) -> bool {
        self.inner.raised.load(Ordering::SeqCst)
    }

    /// Route interrupts into `tx` until the returned guard is dropped.
    pub(crate) fn listen(&self, tx: Sender<SupervisorEvent>) -> ListenGuard {
        if let Ok(mut listener) = self.inner.listener.lock() {
            *listener = Some(tx);
        }
        ListenGuard {
            state: Arc::clone(&self.inner),
        }
    }
}

pub(crate) struct ListenGuard {
    state: Arc<InterruptState>,
}

impl Drop for ListenGuard {
    fn drop(&mut self) {
        if let Ok(mut listener) = self.state.listener.lock() {
            listener.take();
        }
    }
}
