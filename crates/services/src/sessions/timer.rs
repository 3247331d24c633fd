use std::ops::ControlFlow;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

/// Periodic countdown task. Aborted when dropped, so a discarded session
/// never keeps ticking.
#[derive(Debug)]
pub(crate) struct SessionTimer {
    handle: JoinHandle<()>,
}

impl SessionTimer {
    /// Call `on_tick` every `period`, starting one period from now, until it
    /// returns `ControlFlow::Break`.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn spawn<F>(period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if on_tick().is_break() {
                    break;
                }
            }
        });
        Self { handle }
    }

    pub(crate) fn cancel(&self) {
        self.handle.abort();
    }

    #[must_use]
    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for SessionTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
