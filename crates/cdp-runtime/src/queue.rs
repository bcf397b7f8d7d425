//! Bounded task queue between peer connections and the worker pool.

use cdp_core::{CdpError, DiameterMessage, Result};
use cdp_metrics::CdpMetrics;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// A received application message waiting for a worker
#[derive(Debug, Clone)]
pub struct Task {
    /// FQDN of the peer the message came from
    pub peer: String,
    pub msg: DiameterMessage,
}

/// Fixed-capacity FIFO. `put` waits for a free slot and `take` for an item;
/// both give up with `ShuttingDown` once the token is cancelled.
pub struct TaskQueue {
    tasks: Mutex<VecDeque<Task>>,
    /// Free slots
    empty: Semaphore,
    /// Queued items
    full: Semaphore,
    capacity: usize,
    put_warn: Duration,
    shutdown: CancellationToken,
    metrics: Option<Arc<CdpMetrics>>,
}

impl TaskQueue {
    pub fn new(capacity: usize, put_warn: Duration, shutdown: CancellationToken) -> Self {
        Self {
            tasks: Mutex::new(VecDeque::with_capacity(capacity)),
            empty: Semaphore::new(capacity),
            full: Semaphore::new(0),
            capacity,
            put_warn,
            shutdown,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<CdpMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn put(&self, task: Task) -> Result<()> {
        let start = Instant::now();
        let permit = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(CdpError::ShuttingDown),
            permit = self.empty.acquire() => permit.map_err(|_| CdpError::ShuttingDown)?,
        };
        permit.forget();

        let len = {
            let mut tasks = self.tasks.lock();
            tasks.push_back(task);
            tasks.len()
        };
        self.full.add_permits(1);

        let elapsed = start.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics.queue_length.set(len as i64);
            if elapsed > self.put_warn {
                metrics.queue_put_slow.inc();
            }
        }
        if elapsed > self.put_warn {
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                queue_length = len,
                capacity = self.capacity,
                "task queue put was slow, consider more workers or a longer queue"
            );
        }
        Ok(())
    }

    pub async fn take(&self) -> Result<Task> {
        let permit = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(CdpError::ShuttingDown),
            permit = self.full.acquire() => permit.map_err(|_| CdpError::ShuttingDown)?,
        };
        permit.forget();

        let (task, len) = {
            let mut tasks = self.tasks.lock();
            (tasks.pop_front(), tasks.len())
        };
        self.empty.add_permits(1);
        if let Some(metrics) = &self.metrics {
            metrics.queue_length.set(len as i64);
        }
        task.ok_or_else(|| CdpError::InternalError("task queue permit without task".into()))
    }

    /// Wake every waiter; they return `ShuttingDown`
    pub fn close(&self) {
        self.shutdown.cancel();
        self.empty.close();
        self.full.close();
    }
}
