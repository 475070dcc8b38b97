use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::batch::{Batch, View};
use crate::buffer::Buffer;
use crate::database::Clickhouse;
use crate::error::{is_retry_eligible, Error};
use crate::options::Options;
use crate::retry::{DefaultWriter, MemoryQueue, Retry, RetryPacket};
use crate::writer::Writer;
use crate::writer_blocking::WriterBlocking;

/// The seam between writers and the client: writers deliver batches through
/// this trait so the retry hook lives in one place.
#[async_trait]
pub(crate) trait BatchSink: Send + Sync + 'static {
    async fn write_batch(&self, view: &View, batch: Batch) -> Result<(), Error>;
}

/// Top-level handle owning the database connection, the per-view writer
/// registry and the retry engine.
///
/// Clients should be reused rather than created per write; a client may be
/// shared by multiple tasks. Call [`Client::close`] to drain in-flight
/// batches before dropping the last handle.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    clickhouse: Arc<dyn Clickhouse>,
    options: Options,
    registry: Mutex<Registry>,
    retry: Option<Retry>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Registry {
    writers: HashMap<String, Writer>,
    blocking: HashMap<String, WriterBlocking>,
}

impl Client {
    pub fn new(clickhouse: Arc<dyn Clickhouse>) -> Self {
        Self::with_options(clickhouse, Options::default())
    }

    pub fn with_options(clickhouse: Arc<dyn Clickhouse>, options: Options) -> Self {
        let cancel = CancellationToken::new();
        let retry = options.retry_enabled.then(|| {
            let queue = options
                .queue
                .clone()
                .unwrap_or_else(|| Arc::new(MemoryQueue::new()));
            Retry::start(
                queue,
                Arc::new(DefaultWriter::new(clickhouse.clone())),
                cancel.clone(),
                options.debug,
            )
        });
        Self {
            inner: Arc::new(Inner {
                clickhouse,
                options,
                registry: Mutex::new(Registry::default()),
                retry,
                cancel,
            }),
        }
    }

    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    /// Returns the asynchronous writer for the view, creating it on first
    /// call. One writer instance exists per view name; the buffer argument
    /// is used only by the call that creates the writer.
    pub fn writer(&self, view: View, buffer: Box<dyn Buffer>) -> Writer {
        let mut registry = self.inner.registry.lock();
        registry
            .writers
            .entry(view.name.clone())
            .or_insert_with(|| {
                Writer::new(
                    self.inner.clone(),
                    view,
                    buffer,
                    self.inner.options.clone(),
                )
            })
            .clone()
    }

    /// Returns the blocking writer for the view, creating it on first call.
    pub fn writer_blocking(&self, view: View) -> WriterBlocking {
        let mut registry = self.inner.registry.lock();
        registry
            .blocking
            .entry(view.name.clone())
            .or_insert_with(|| WriterBlocking::new(self.inner.clone(), view))
            .clone()
    }

    /// Sends one batch to the database. Used implicitly by the asynchronous
    /// writers and explicitly by the blocking ones; this is also the retry
    /// entry point.
    pub async fn write_batch(&self, view: &View, batch: Batch) -> Result<(), Error> {
        self.inner.write_batch(view, batch).await
    }

    /// The retry engine handle, present iff retry is enabled.
    pub fn retry_client(&self) -> Option<Retry> {
        self.inner.retry.clone()
    }

    /// Ensures all ongoing asynchronous writers finish, then stops the retry
    /// worker (which closes the queue backend).
    pub async fn close(&self) {
        if self.inner.options.debug {
            tracing::debug!("close clickhouse buffer client");
        }
        let writers: Vec<Writer> = {
            let mut registry = self.inner.registry.lock();
            registry.blocking.clear();
            registry.writers.drain().map(|(_, writer)| writer).collect()
        };
        for writer in writers {
            writer.close().await;
        }
        self.inner.cancel.cancel();
    }
}

#[async_trait]
impl BatchSink for Inner {
    async fn write_batch(&self, view: &View, batch: Batch) -> Result<(), Error> {
        match self.clickhouse.insert(view, batch.rows()).await {
            Ok(_affected) => Ok(()),
            Err(err) => {
                // undelivered batches go for another round when the error
                // code allows it
                if let Some(retry) = &self.retry {
                    if is_retry_eligible(&err) {
                        retry.enqueue(RetryPacket::new(view.clone(), batch)).await;
                    }
                }
                Err(err)
            }
        }
    }
}
