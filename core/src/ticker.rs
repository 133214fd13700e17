//! Periodic dwell ticks on a tokio runtime.
//!
//! At most one tick task exists. Scheduling aborts the previous task before
//! spawning the next, and every tick carries the generation it was scheduled
//! for so the receiver can drop ticks that outlived their session.

use std::time::Duration;

use log::debug;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub struct DwellTicker {
    handle: Handle,
    interval: Duration,
    task: Option<JoinHandle<()>>,
    scheduled: Option<u64>,
}

impl DwellTicker {
    pub fn new(handle: Handle, interval: Duration) -> Self {
        Self {
            handle,
            interval,
            task: None,
            scheduled: None,
        }
    }

    /// Call `on_tick(generation)` every interval until it returns `false`.
    ///
    /// The first call happens one interval from now. Any previously
    /// scheduled task is cancelled first.
    pub fn schedule<F>(&mut self, generation: u64, mut on_tick: F)
    where
        F: FnMut(u64) -> bool + Send + 'static,
    {
        self.cancel();
        self.scheduled = Some(generation);
        let period = self.interval;
        debug!("scheduling ticks for session {generation} every {period:?}");
        self.task = Some(self.handle.spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if !on_tick(generation) {
                    break;
                }
            }
        }));
    }

    pub fn cancel(&mut self) {
        self.scheduled = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Generation the running task ticks for, if it is still running.
    pub fn scheduled_generation(&self) -> Option<u64> {
        self.scheduled.filter(|_| self.is_active())
    }
}

impl Drop for DwellTicker {
    fn drop(&mut self) {
        self.cancel();
    }
}
