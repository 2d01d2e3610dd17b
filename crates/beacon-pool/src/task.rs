//! Tasks and their completion handles

use crate::error::TaskError;
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Final state of a task as seen through its handle
pub type TaskOutcome = Result<(), TaskError>;

type Work = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

/// A unit of deferred work.
///
/// Parameters are whatever the closure captures. Tasks carry no priority
/// and no identity beyond a label used in logs.
pub struct Task {
    label: String,
    work: Work,
}

impl Task {
    pub fn new<F>(label: impl Into<String>, work: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            label: label.into(),
            work: Box::new(work),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Run the work, turning both errors and panics into a [`TaskError`]
    pub(crate) fn run(self) -> TaskOutcome {
        let Task { label, work } = self;
        match catch_unwind(AssertUnwindSafe(work)) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(TaskError::Failed {
                task: label,
                message: format!("{:#}", err),
            }),
            Err(payload) => Err(TaskError::Panicked {
                task: label,
                message: panic_payload_to_string(&payload),
            }),
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("label", &self.label).finish_non_exhaustive()
    }
}

/// Completion signal for one submitted task.
///
/// Dropping the handle is fine; the task still runs and its failure is still
/// logged by the worker.
#[derive(Debug)]
pub struct TaskHandle {
    label: String,
    done: flume::Receiver<TaskOutcome>,
}

impl TaskHandle {
    pub(crate) fn new(label: String, done: flume::Receiver<TaskOutcome>) -> Self {
        Self { label, done }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Block the current thread until the task finishes
    pub fn wait(self) -> TaskOutcome {
        self.done.recv().unwrap_or(Err(TaskError::Dropped))
    }

    /// Await the task without blocking an executor thread
    pub async fn join(self) -> TaskOutcome {
        self.done.recv_async().await.unwrap_or(Err(TaskError::Dropped))
    }

    /// Outcome if the task has already finished
    pub fn try_outcome(&self) -> Option<TaskOutcome> {
        self.done.try_recv().ok()
    }
}

/// Queue entry: the task plus the sender half of its handle
pub(crate) struct Envelope {
    pub task: Task,
    pub done: flume::Sender<TaskOutcome>,
}

impl Envelope {
    pub fn new(task: Task) -> (Self, TaskHandle) {
        let (done, rx) = flume::bounded(1);
        let handle = TaskHandle::new(task.label.clone(), rx);
        (Self { task, done }, handle)
    }
}

fn panic_payload_to_string(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
