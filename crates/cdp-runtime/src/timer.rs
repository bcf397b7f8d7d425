//! Timer facility: callbacks run by a single task ticking at a fixed
//! resolution.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub type TimerCallback = Arc<dyn Fn() + Send + Sync>;

pub type TimerId = u64;

struct TimerEntry {
    id: TimerId,
    interval: Duration,
    next: Instant,
    one_shot: bool,
    callback: TimerCallback,
}

pub struct TimerFacility {
    resolution: Duration,
    timers: Mutex<Vec<TimerEntry>>,
    next_id: AtomicU64,
}

impl TimerFacility {
    pub fn new(resolution: Duration) -> Self {
        Self {
            resolution,
            timers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn resolution(&self) -> Duration {
        self.resolution
    }

    /// Run `callback` every `interval`, or once after it when `one_shot`.
    /// Precision is bounded by the resolution.
    pub fn add<F>(&self, interval: Duration, one_shot: bool, callback: F) -> TimerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.timers.lock().push(TimerEntry {
            id,
            interval,
            next: Instant::now() + interval,
            one_shot,
            callback: Arc::new(callback),
        });
        id
    }

    pub fn remove(&self, id: TimerId) -> bool {
        let mut timers = self.timers.lock();
        let before = timers.len();
        timers.retain(|t| t.id != id);
        timers.len() != before
    }

    pub fn len(&self) -> usize {
        self.timers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.lock().is_empty()
    }

    /// Run every callback due at `now`. Callbacks run without the timer
    /// lock held, so they may add or remove timers.
    pub fn fire_due(&self, now: Instant) -> usize {
        let due: Vec<TimerCallback> = {
            let mut timers = self.timers.lock();
            let mut due = Vec::new();
            timers.retain_mut(|t| {
                if t.next > now {
                    return true;
                }
                due.push(t.callback.clone());
                if t.one_shot {
                    return false;
                }
                t.next += t.interval;
                if t.next <= now {
                    t.next = now + t.interval;
                }
                true
            });
            due
        };

        for callback in &due {
            callback();
        }
        due.len()
    }

    /// Tick until `shutdown` is cancelled
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut tick = tokio::time::interval(self.resolution);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!(resolution_ms = self.resolution.as_millis() as u64, "timer started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick.tick() => {
                    self.fire_due(Instant::now());
                }
            }
        }
        debug!("timer stopped");
    }
}
