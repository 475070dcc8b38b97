use async_trait::async_trait;

use crate::error::Error;
use crate::retry::{Queueable, RetryPacket};

/// Capacity of the in-memory retry channel. Matches the engine's in-flight
/// soft cap so a healthy worker never observes a full queue.
pub const RETRY_QUEUE_CAPACITY: usize = 100;

/// Default in-memory retry queue over a bounded channel.
pub struct MemoryQueue {
    sender: async_channel::Sender<RetryPacket>,
    receiver: async_channel::Receiver<RetryPacket>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        let (sender, receiver) = async_channel::bounded(RETRY_QUEUE_CAPACITY);
        Self { sender, receiver }
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Queueable for MemoryQueue {
    async fn queue(&self, packet: RetryPacket) -> Result<(), Error> {
        self.sender
            .send(packet)
            .await
            .map_err(|_| Error::QueueClosed)
    }

    fn retries(&self) -> async_channel::Receiver<RetryPacket> {
        self.receiver.clone()
    }

    fn close(&self) -> Result<(), Error> {
        self.sender.close();
        Ok(())
    }

    fn close_message(&self) -> &str {
        "close in-memory queue engine"
    }
}
