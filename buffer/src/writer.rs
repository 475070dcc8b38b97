use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::batch::{Batch, View};
use crate::buffer::Buffer;
use crate::client::BatchSink;
use crate::error::Error;
use crate::options::Options;
use crate::row::{Rower, Vector};

/// Capacity of the producer-facing vector channel.
const WRITE_CHANNEL_CAPACITY: usize = 100;

/// Non-blocking, per-view writer accumulating rows into batches.
///
/// A writer can be used concurrently; when writing from multiple tasks, share
/// a single instance (clones share the pipeline). Rows are staged in the
/// buffer and sent on the background when the batch size is reached or the
/// flush interval elapses.
#[derive(Clone)]
pub struct Writer {
    view: View,
    sender: async_channel::Sender<Vector>,
    errors: Arc<ErrorSlot>,
    tasks: Arc<tokio::sync::Mutex<Tasks>>,
}

impl Writer {
    pub(crate) fn new(
        sink: Arc<dyn BatchSink>,
        view: View,
        buffer: Box<dyn Buffer>,
        options: Options,
    ) -> Self {
        let (vector_tx, vector_rx) = async_channel::bounded::<Vector>(WRITE_CHANNEL_CAPACITY);
        let (batch_tx, batch_rx) = async_channel::bounded::<Batch>(1);
        let errors = Arc::new(ErrorSlot::new());

        let bridges = vec![
            tokio::spawn(run_buffer_bridge(
                view.clone(),
                buffer,
                vector_rx,
                batch_tx,
                options.clone(),
            )),
            tokio::spawn(run_db_bridge(
                view.clone(),
                sink,
                batch_rx,
                errors.clone(),
                options.debug,
            )),
        ];

        Self {
            view,
            sender: vector_tx,
            errors,
            tasks: Arc::new(tokio::sync::Mutex::new(Tasks::new(bridges))),
        }
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    /// Writes a record asynchronously. The row is staged in the buffer and
    /// sent on the background when it reaches the batch size.
    ///
    /// Blocks while the staging channel is full. Calling this after
    /// [`Writer::close`] is undefined; use [`Writer::try_write_row`] from
    /// tasks that may race shutdown.
    pub async fn write_row(&self, row: &impl Rower) {
        self.write_vector(row.row()).await;
    }

    /// [`Writer::write_row`] without the projection, saving an allocation
    /// when the caller already holds a vector.
    pub async fn write_vector(&self, vector: Vector) {
        let _ = self.sender.send(vector).await;
    }

    /// Like [`Writer::write_row`], but returns silently once shutdown has
    /// begun instead of writing. Never panics on a closed writer.
    pub async fn try_write_row(&self, row: &impl Rower) {
        self.try_write_vector(row.row()).await;
    }

    pub async fn try_write_vector(&self, vector: Vector) {
        if self.sender.is_closed() {
            return;
        }
        // a send racing close is absorbed by the channel, not a panic
        let _ = self.sender.send(vector).await;
    }

    /// Returns the stream of errors from background writes.
    ///
    /// Must be called before writing for errors to be collected. The stream
    /// is nearly unbuffered and must be drained, otherwise the writer's
    /// database bridge blocks on the next error.
    pub fn errors(&self) -> async_channel::Receiver<Error> {
        self.errors.subscribe()
    }

    /// Finishes outstanding writes: the final partial buffer is flushed, the
    /// in-flight insert completes, background tasks stop and all owned
    /// channels are closed.
    pub async fn close(&self) {
        self.sender.close();
        self.tasks.lock().await.done().await;
    }
}

/// Join handles of the two bridge tasks.
struct Tasks {
    inner: Option<Vec<JoinHandle<()>>>,
}

impl Tasks {
    fn new(tasks: Vec<JoinHandle<()>>) -> Self {
        Self { inner: Some(tasks) }
    }

    /// Waits for the bridges to finish. Idempotent.
    async fn done(&mut self) {
        if let Some(tasks) = self.inner.take() {
            for task in tasks {
                let _ = task.await;
            }
        }
    }
}

/// Lazily materialized error channel plus the consumer-exists flag the
/// database bridge reads lock-free.
struct ErrorSlot {
    chan: Mutex<Option<(async_channel::Sender<Error>, async_channel::Receiver<Error>)>>,
    opened: AtomicBool,
    closed: AtomicBool,
}

impl ErrorSlot {
    fn new() -> Self {
        Self {
            chan: Mutex::new(None),
            opened: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    fn subscribe(&self) -> async_channel::Receiver<Error> {
        let mut slot = self.chan.lock();
        let (sender, receiver) = slot.get_or_insert_with(|| {
            self.opened.store(true, Ordering::Release);
            async_channel::bounded(1)
        });
        // subscribing after shutdown yields an already-closed stream
        if self.closed.load(Ordering::Acquire) {
            sender.close();
        }
        receiver.clone()
    }

    fn has_reader(&self) -> bool {
        self.opened.load(Ordering::Acquire)
    }

    async fn forward(&self, error: Error) {
        let sender = self.chan.lock().as_ref().map(|(sender, _)| sender.clone());
        if let Some(sender) = sender {
            let _ = sender.send(error).await;
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some((sender, _)) = self.chan.lock().as_ref() {
            sender.close();
        }
    }
}

/// Stages incoming vectors and emits batches on size or time.
async fn run_buffer_bridge(
    view: View,
    mut buffer: Box<dyn Buffer>,
    vectors: async_channel::Receiver<Vector>,
    batches: async_channel::Sender<Batch>,
    options: Options,
) {
    if options.debug {
        tracing::debug!(table = %view.name, "run buffer bridge");
    }
    let mut ticker = tokio::time::interval(options.flush_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            received = vectors.recv() => match received {
                Ok(vector) => {
                    buffer.write(vector).await;
                    if buffer.len() >= options.batch_size {
                        flush(&view, buffer.as_mut(), &batches, &options).await;
                    }
                }
                // sender closed and channel drained
                Err(_) => break,
            },
            _ = ticker.tick() => {
                if buffer.len() > 0 {
                    flush(&view, buffer.as_mut(), &batches, &options).await;
                }
            }
        }
    }
    // flush the residue before the batch channel is dropped
    if buffer.len() > 0 {
        flush(&view, buffer.as_mut(), &batches, &options).await;
    }
    if options.debug {
        tracing::debug!(table = %view.name, "stop buffer bridge");
    }
}

async fn flush(
    view: &View,
    buffer: &mut dyn Buffer,
    batches: &async_channel::Sender<Batch>,
    options: &Options,
) {
    if options.debug {
        tracing::debug!(table = %view.name, "flush buffer");
    }
    let batch = Batch::new(buffer.read().await);
    if batch.is_empty() {
        return;
    }
    let _ = batches.send(batch).await;
    buffer.flush().await;
}

/// Sends batches to the database and forwards insert errors to the error
/// stream when a consumer exists.
async fn run_db_bridge(
    view: View,
    sink: Arc<dyn BatchSink>,
    batches: async_channel::Receiver<Batch>,
    errors: Arc<ErrorSlot>,
    debug: bool,
) {
    if debug {
        tracing::debug!(table = %view.name, "run database bridge");
    }
    while let Ok(batch) = batches.recv().await {
        if let Err(err) = sink.write_batch(&view, batch).await {
            if errors.has_reader() {
                errors.forward(err).await;
            }
        }
    }
    errors.close();
    if debug {
        tracing::debug!(table = %view.name, "stop database bridge");
    }
}
