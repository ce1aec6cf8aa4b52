// Bounded-interval retry-until-result primitive with cooperative
// cancellation. Every polling loop in the protocol goes through here.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cooperative cancellation flag shared by all polling loops of one flow
/// instance (the "stop latch"). Once set it is never cleared.
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Handed to the polled action; lets the action end the loop immediately
/// with whatever value it returns from the current attempt.
#[derive(Clone, Debug, Default)]
pub struct PollerHandle {
    stopped: Arc<AtomicBool>,
}

impl PollerHandle {
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Repeatedly invoke `action` until it yields `Some`, sleeping `interval`
/// between attempts. Returns `None` only when the action stopped the loop
/// via its handle or the external stop latch was set.
///
/// The interval is clamped to at least 1ms: the poller never busy-loops.
/// It also never gives up on its own; callers wire a stop condition.
pub async fn poll_until<T, F, Fut>(interval: Duration, stop: &StopSignal, mut action: F) -> Option<T>
where
    F: FnMut(PollerHandle) -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let interval = interval.max(Duration::from_millis(1));

    loop {
        if stop.is_stopped() {
            return None;
        }

        let handle = PollerHandle::default();
        let result = action(handle.clone()).await;

        if result.is_some() || handle.is_stopped() {
            return result;
        }

        tokio::time::sleep(interval).await;
    }
}
