//! Worker threads over a shared bounded queue

use crate::config::PoolConfig;
use crate::error::{PoolError, PoolResult};
use crate::task::{Envelope, Task, TaskHandle};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
}

/// Point-in-time pool counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub workers: usize,
    pub submitted: u64,
    /// Tasks that finished, whatever their outcome
    pub completed: u64,
    pub failed: u64,
    pub panicked: u64,
    /// Tasks waiting in the queue right now
    pub queued: usize,
}

/// Fixed-size pool of worker threads
pub struct TaskPool {
    sender: Mutex<Option<flume::Sender<Envelope>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
    config: PoolConfig,
}

impl TaskPool {
    /// Start `config.workers` threads on a queue of `config.queue_capacity`
    pub fn open(config: PoolConfig) -> PoolResult<Self> {
        if config.workers == 0 {
            return Err(PoolError::Config("worker count must be at least 1".into()));
        }
        if config.queue_capacity == 0 {
            return Err(PoolError::Config("queue capacity must be at least 1".into()));
        }

        let (sender, receiver) = flume::bounded::<Envelope>(config.queue_capacity);
        let counters = Arc::new(Counters::default());

        let mut workers = Vec::with_capacity(config.workers);
        for index in 0..config.workers {
            let receiver = receiver.clone();
            let counters = Arc::clone(&counters);
            let name = format!("{}-{}", config.thread_name, index);
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_loop(&name, &receiver, &counters))?;
            workers.push(handle);
        }

        info!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            "Task pool started"
        );

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            counters,
            config,
        })
    }

    fn sender(&self) -> PoolResult<flume::Sender<Envelope>> {
        self.sender.lock().clone().ok_or(PoolError::Closed)
    }

    /// Enqueue `task`, blocking while the queue is full
    pub fn submit(&self, task: Task) -> PoolResult<TaskHandle> {
        let sender = self.sender()?;
        let (envelope, handle) = Envelope::new(task);
        sender.send(envelope)?;
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(handle)
    }

    /// Enqueue `task`, awaiting queue space instead of blocking the thread
    pub async fn submit_async(&self, task: Task) -> PoolResult<TaskHandle> {
        let sender = self.sender()?;
        let (envelope, handle) = Envelope::new(task);
        sender.send_async(envelope).await?;
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(handle)
    }

    /// Enqueue `task` only if there is room right now
    pub fn try_submit(&self, task: Task) -> PoolResult<TaskHandle> {
        let sender = self.sender()?;
        let (envelope, handle) = Envelope::new(task);
        sender.try_send(envelope).map_err(|e| match e {
            flume::TrySendError::Full(_) => PoolError::QueueFull(self.config.queue_capacity),
            flume::TrySendError::Disconnected(_) => PoolError::Closed,
        })?;
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(handle)
    }

    /// Stop accepting tasks, let the workers drain the queue, join them.
    ///
    /// Calling this from inside a task would wait on the calling worker
    /// itself; such a worker is detached instead of joined.
    pub fn close(&self) {
        let Some(sender) = self.sender.lock().take() else {
            return;
        };
        drop(sender);

        let workers = std::mem::take(&mut *self.workers.lock());
        debug!(workers = workers.len(), "Closing task pool");
        let current = thread::current().id();
        for handle in workers {
            if handle.thread().id() == current {
                warn!("Task pool closed from one of its own workers");
                continue;
            }
            if handle.join().is_err() {
                error!("Worker thread terminated abnormally");
            }
        }

        let stats = self.stats();
        info!(
            completed = stats.completed,
            failed = stats.failed,
            panicked = stats.panicked,
            "Task pool closed"
        );
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            workers: self.config.workers,
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            panicked: self.counters.panicked.load(Ordering::Relaxed),
            queued: self.sender.lock().as_ref().map(|s| s.len()).unwrap_or(0),
        }
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.close();
    }
}

fn worker_loop(name: &str, receiver: &flume::Receiver<Envelope>, counters: &Counters) {
    debug!(worker = name, "Worker started");

    // recv keeps returning queued tasks after the sender is dropped
    while let Ok(Envelope { task, done }) = receiver.recv() {
        let label = task.label().to_string();
        let outcome = task.run();

        match &outcome {
            Ok(()) => debug!(worker = name, task = %label, "Task completed"),
            Err(e @ crate::TaskError::Panicked { .. }) => {
                counters.panicked.fetch_add(1, Ordering::Relaxed);
                error!(worker = name, error = %e, "Task panicked");
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(worker = name, error = %e, "Task failed");
            }
        }
        counters.completed.fetch_add(1, Ordering::Relaxed);

        // Handle may already be gone
        let _ = done.send(outcome);
    }

    debug!(worker = name, "Worker stopped");
}
