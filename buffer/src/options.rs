use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::retry::Queueable;

pub const DEFAULT_BATCH_SIZE: usize = 5000;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(1000);

/// Write configuration shared by the client and its writers.
///
/// Fields are public for test convenience; do not mutate them while writers
/// are live. Prefer the `with_*` builder methods.
#[derive(Clone)]
pub struct Options {
    /// Maximum number of rows sent to the server in a single insert.
    pub batch_size: usize,
    /// Interval in which the buffer is flushed if it has not already been
    /// flushed by reaching the batch size.
    pub flush_interval: Duration,
    /// Enables verbose lifecycle logging.
    pub debug: bool,
    /// Enables resending of undelivered batches through the retry engine.
    pub retry_enabled: bool,
    /// Custom retry queue backend. When `None` and retry is enabled, the
    /// client creates the in-memory queue.
    pub queue: Option<Arc<dyn Queueable>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            debug: false,
            retry_enabled: false,
            queue: None,
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_retry(mut self, enabled: bool) -> Self {
        self.retry_enabled = enabled;
        self
    }

    pub fn with_queue(mut self, queue: Arc<dyn Queueable>) -> Self {
        self.queue = Some(queue);
        self
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("batch_size", &self.batch_size)
            .field("flush_interval", &self.flush_interval)
            .field("debug", &self.debug)
            .field("retry_enabled", &self.retry_enabled)
            .field("queue", &self.queue.as_ref().map(|q| q.close_message()))
            .finish()
    }
}
