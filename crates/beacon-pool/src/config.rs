/// Worker pool sizing
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker threads
    pub workers: usize,
    /// Tasks that may wait in the queue before producers block
    pub queue_capacity: usize,
    /// Worker thread name prefix; threads are named `{prefix}-{index}`
    pub thread_name: String,
}

impl PoolConfig {
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers,
            ..Self::default()
        }
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
            thread_name: "beacon-worker".to_string(),
        }
    }
}
