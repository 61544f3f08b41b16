//! Periodic triggering with cooperative cancellation.

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Callback fired on every tick. It must not block; long work is spawned.
pub type Tick = Arc<dyn Fn() + Send + Sync>;

pub trait Scheduler: Send + Sync {
    /// Fire `tick` every `period`, starting one period from now, until the
    /// returned handle is cancelled.
    fn schedule(&self, period: Duration, tick: Tick) -> ScheduledTask;
}

/// Handle to a running schedule.
pub struct ScheduledTask {
    stop_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    pub fn new(stop_tx: watch::Sender<bool>, handle: Option<JoinHandle<()>>) -> Self {
        Self { stop_tx, handle }
    }

    /// Stops further ticks. Work already spawned by a tick is unaffected.
    pub async fn cancel(mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

/// Scheduler driven by `tokio::time::interval`.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntervalScheduler;

impl Scheduler for IntervalScheduler {
    fn schedule(&self, period: Duration, tick: Tick) -> ScheduledTask {
        let (stop_tx, mut stopped) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => tick(),
                }
            }
            debug!("Scheduler stopped");
        });
        ScheduledTask::new(stop_tx, Some(handle))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Scheduler whose ticks are fired by hand.
    #[derive(Default)]
    pub struct ManualScheduler {
        tick: Mutex<Option<Tick>>,
        pub period: Mutex<Option<Duration>>,
    }

    impl ManualScheduler {
        pub fn fire(&self) -> bool {
            let tick = self.tick.lock().unwrap().clone();
            match tick {
                Some(tick) => {
                    tick();
                    true
                }
                None => false,
            }
        }
    }

    impl Scheduler for ManualScheduler {
        fn schedule(&self, period: Duration, tick: Tick) -> ScheduledTask {
            *self.tick.lock().unwrap() = Some(tick);
            *self.period.lock().unwrap() = Some(period);
            let (stop_tx, _) = watch::channel(false);
            ScheduledTask::new(stop_tx, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn ticks_until_cancelled() {
        let count = Arc::new(AtomicUsize::new(0));
        let tick: Tick = {
            let count = count.clone();
            Arc::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        let task = IntervalScheduler.schedule(Duration::from_millis(10), tick);

        tokio::time::sleep(Duration::from_millis(75)).await;
        task.cancel().await;
        let seen = count.load(Ordering::SeqCst);
        assert!(seen >= 2, "expected several ticks, saw {seen}");

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(count.load(Ordering::SeqCst), seen, "no ticks after cancel");
    }

    #[tokio::test]
    async fn first_tick_waits_one_period() {
        let count = Arc::new(AtomicUsize::new(0));
        let tick: Tick = {
            let count = count.clone();
            Arc::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        let task = IntervalScheduler.schedule(Duration::from_secs(3600), tick);
        tokio::time::sleep(Duration::from_millis(20)).await;
        task.cancel().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
