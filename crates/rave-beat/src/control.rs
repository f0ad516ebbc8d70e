//! Start/resync/stop signals into the clock task.
//!
//! The channel holds a single pending slot. A newer signal replaces one the
//! clock has not taken yet, with two exceptions: an untaken `Start` can only
//! be replaced by `Stop`, and once `Stop` is sent nothing else is accepted.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

/// The only inputs a control source can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClockControlSignal {
    Start,
    Resync,
    Stop,
}

#[derive(Debug, Default)]
struct Slot {
    pending: Option<ClockControlSignal>,
    stopped: bool,
    handles_gone: bool,
    receiver_gone: bool,
}

#[derive(Debug, Default)]
struct Shared {
    slot: Mutex<Slot>,
    wake: Notify,
}

impl Shared {
    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Create a connected handle/receiver pair.
pub fn control_channel() -> (ControlHandle, ControlReceiver) {
    let shared = Arc::new(Shared::default());
    let handle = ControlHandle {
        inner: Arc::new(HandleInner {
            shared: Arc::clone(&shared),
        }),
    };
    (handle, ControlReceiver { shared })
}

/// Marks the channel closed once the last handle clone goes away.
#[derive(Debug)]
struct HandleInner {
    shared: Arc<Shared>,
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        self.shared.slot().handles_gone = true;
        self.shared.wake.notify_one();
    }
}

/// Cloneable sender used by control sources.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    inner: Arc<HandleInner>,
}

impl ControlHandle {
    /// Raise a signal. Returns false if it was refused: after a stop, or a
    /// resync while a start is still untaken.
    pub fn send(&self, signal: ClockControlSignal) -> bool {
        let shared = &self.inner.shared;
        {
            let mut slot = shared.slot();
            let refused = slot.stopped
                || (slot.pending == Some(ClockControlSignal::Start)
                    && signal == ClockControlSignal::Resync);
            if refused {
                return false;
            }
            slot.pending = Some(signal);
            slot.stopped = signal == ClockControlSignal::Stop;
        }
        shared.wake.notify_one();
        true
    }

    pub fn start(&self) -> bool {
        self.send(ClockControlSignal::Start)
    }

    pub fn resync(&self) -> bool {
        self.send(ClockControlSignal::Resync)
    }

    pub fn stop(&self) -> bool {
        self.send(ClockControlSignal::Stop)
    }

    /// True once the clock task has gone away.
    pub fn is_closed(&self) -> bool {
        self.inner.shared.slot().receiver_gone
    }
}

/// Clock-side end of the control channel.
#[derive(Debug)]
pub struct ControlReceiver {
    shared: Arc<Shared>,
}

impl ControlReceiver {
    /// Take the pending signal, if any. A channel with no handles left reads
    /// as `Stop` once its last signal has been taken.
    pub fn take(&mut self) -> Option<ClockControlSignal> {
        let mut slot = self.shared.slot();
        match slot.pending.take() {
            Some(signal) => Some(signal),
            None if slot.handles_gone => Some(ClockControlSignal::Stop),
            None => None,
        }
    }

    /// Wait for the next signal and take it.
    ///
    /// Cancel safe: a signal is only removed from the slot by the call that
    /// returns it.
    pub async fn recv(&mut self) -> ClockControlSignal {
        loop {
            if let Some(signal) = self.take() {
                return signal;
            }
            self.shared.wake.notified().await;
        }
    }
}

impl Drop for ControlReceiver {
    fn drop(&mut self) {
        self.shared.slot().receiver_gone = true;
    }
}
