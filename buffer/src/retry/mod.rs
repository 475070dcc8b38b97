//! Bounded redelivery of batches that failed their first insert.

use std::sync::Arc;

use async_trait::async_trait;

use crate::batch::{Batch, View};
use crate::database::Clickhouse;
use crate::error::Error;
use crate::row::Vector;

mod engine;
mod memory;

pub use engine::Retry;
pub use memory::MemoryQueue;

/// A batch bound to its view plus the number of resubmit cycles it has been
/// through. Travels from the failing insert to the retry worker.
#[derive(Debug, Clone)]
pub struct RetryPacket {
    pub view: View,
    pub batch: Batch,
    pub try_count: u8,
}

impl RetryPacket {
    pub fn new(view: View, batch: Batch) -> Self {
        Self {
            view,
            batch,
            try_count: 0,
        }
    }

    fn resubmitted(self) -> Self {
        Self {
            try_count: self.try_count + 1,
            ..self
        }
    }
}

/// Queue backend carrying retry packets from producers to the retry worker.
///
/// The in-memory implementation is [`MemoryQueue`]; a persistent backend can
/// be supplied through [`crate::Options::with_queue`].
#[async_trait]
pub trait Queueable: Send + Sync + 'static {
    /// Appends a packet. Blocks only if the backend blocks. After [`close`]
    /// this returns [`Error::QueueClosed`].
    ///
    /// [`close`]: Queueable::close
    async fn queue(&self, packet: RetryPacket) -> Result<(), Error>;

    /// The stream consumed by the retry worker.
    fn retries(&self) -> async_channel::Receiver<RetryPacket>;

    /// Releases backend resources.
    fn close(&self) -> Result<(), Error>;

    /// Diagnostic line logged when the worker shuts the backend down.
    fn close_message(&self) -> &str;
}

/// The retry worker's handle to the database, separated so tests can stub
/// the insert path.
#[async_trait]
pub(crate) trait Writeable: Send + Sync + 'static {
    async fn write(&self, view: &View, rows: &[Vector]) -> Result<u64, Error>;
}

pub(crate) struct DefaultWriter {
    conn: Arc<dyn Clickhouse>,
}

impl DefaultWriter {
    pub(crate) fn new(conn: Arc<dyn Clickhouse>) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl Writeable for DefaultWriter {
    async fn write(&self, view: &View, rows: &[Vector]) -> Result<u64, Error> {
        self.conn.insert(view, rows).await
    }
}
