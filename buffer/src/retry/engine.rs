use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use clickhouse_buffer_retry::{invoke, RetryAlways, RetrySetting};
use tokio_util::sync::CancellationToken;

use crate::error::is_retry_eligible;
use crate::retry::{Queueable, RetryPacket, Writeable};

/// Attempts per packet within one cycle: the initial insert plus backoff
/// retries.
const MAX_RETRY_ATTEMPTS: usize = 3;
/// How many times an exhausted packet may be resubmitted as a fresh cycle.
const MAX_RETRY_CYCLES: u8 = 2;
/// Upper bound on in-flight packets; enqueues above it are dropped.
const IN_PROGRESS_SOFT_CAP: u64 = 100;
/// Fibonacci backoff factor between attempts.
const BACKOFF_FACTOR_MS: u64 = 100;

/// Handle to the retry engine: enqueues packets and exposes delivery
/// counters. Cheap to clone.
#[derive(Clone)]
pub struct Retry {
    inner: Arc<Inner>,
}

struct Inner {
    queue: Arc<dyn Queueable>,
    successfully: AtomicU64,
    failed: AtomicU64,
    in_progress: AtomicU64,
    debug: bool,
}

impl Retry {
    /// Spawns the retry worker. It drains the queue until the token is
    /// cancelled, then closes the backend and exits.
    pub(crate) fn start(
        queue: Arc<dyn Queueable>,
        writer: Arc<dyn Writeable>,
        cancel: CancellationToken,
        debug: bool,
    ) -> Self {
        let engine = Self {
            inner: Arc::new(Inner {
                queue,
                successfully: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                in_progress: AtomicU64::new(0),
                debug,
            }),
        };
        let worker = engine.clone();
        tokio::spawn(async move { worker.run(writer, cancel).await });
        engine
    }

    /// Delivery counters: `(successfully, failed, in_progress)`.
    pub fn metrics(&self) -> (u64, u64, u64) {
        (
            self.inner.successfully.load(Ordering::SeqCst),
            self.inner.failed.load(Ordering::SeqCst),
            self.inner.in_progress.load(Ordering::SeqCst),
        )
    }

    /// Hands a packet to the queue backend, subject to the in-flight soft
    /// cap. Packets above the cap are dropped with an error log.
    pub(crate) async fn enqueue(&self, packet: RetryPacket) {
        let in_progress = self.inner.in_progress.fetch_add(1, Ordering::SeqCst) + 1;
        if in_progress > IN_PROGRESS_SOFT_CAP {
            self.inner.in_progress.fetch_sub(1, Ordering::SeqCst);
            tracing::error!(
                table = %packet.view.name,
                rows = packet.batch.len(),
                "retry queue is full, batch dropped"
            );
            return;
        }
        if let Err(err) = self.inner.queue.queue(packet).await {
            self.inner.in_progress.fetch_sub(1, Ordering::SeqCst);
            tracing::error!("enqueue retry packet: {err}");
        }
    }

    async fn run(&self, writer: Arc<dyn Writeable>, cancel: CancellationToken) {
        let retries = self.inner.queue.retries();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    if let Err(err) = self.inner.queue.close() {
                        tracing::error!("close retry queue backend: {err}");
                    }
                    tracing::info!("{}", self.inner.queue.close_message());
                    return;
                }
                packet = retries.recv() => match packet {
                    Ok(packet) => self.handle(writer.as_ref(), packet).await,
                    Err(_) => return,
                }
            }
        }
    }

    async fn handle(&self, writer: &dyn Writeable, packet: RetryPacket) {
        self.inner.in_progress.fetch_sub(1, Ordering::SeqCst);

        let setting = RetrySetting {
            from_millis: BACKOFF_FACTOR_MS,
            max_delay: None,
            take: MAX_RETRY_ATTEMPTS - 1,
        };
        let result = invoke(Some(setting), RetryAlways, || {
            writer.write(&packet.view, packet.batch.rows())
        })
        .await;

        match result {
            Ok(affected) => {
                self.inner.successfully.fetch_add(1, Ordering::SeqCst);
                if self.inner.debug {
                    tracing::debug!(table = %packet.view.name, affected, "retry delivered batch");
                }
            }
            Err(err) => {
                if packet.try_count < MAX_RETRY_CYCLES && is_retry_eligible(&err) {
                    if self.inner.debug {
                        tracing::debug!(
                            table = %packet.view.name,
                            try_count = packet.try_count + 1,
                            "resubmit batch for another retry cycle"
                        );
                    }
                    self.enqueue(packet.resubmitted()).await;
                } else {
                    self.inner.failed.fetch_add(1, Ordering::SeqCst);
                    tracing::error!(
                        table = %packet.view.name,
                        rows = packet.batch.len(),
                        "batch lost after retries: {err}"
                    );
                }
            }
        }
    }
}
