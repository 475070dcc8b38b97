//! Table-scoped staging stores accumulating vectors between flushes.

use async_trait::async_trait;

use crate::row::Vector;

mod memory;
mod sync;

#[cfg(feature = "redis-buffer")]
mod redis;

pub use memory::MemoryBuffer;
pub use sync::SyncBuffer;

#[cfg(feature = "redis-buffer")]
pub use self::redis::RedisBuffer;

/// A staging store for one (view, writer) pair.
///
/// Implementations are not required to be thread-safe: the writer's buffer
/// bridge is the sole caller, which is why mutating operations take
/// `&mut self`. [`SyncBuffer`] exists for test harnesses that access the
/// buffer from several tasks.
#[async_trait]
pub trait Buffer: Send + 'static {
    /// Appends a vector.
    async fn write(&mut self, vector: Vector);

    /// Snapshots the current contents for flushing.
    async fn read(&self) -> Vec<Vector>;

    /// Current number of staged vectors.
    fn len(&self) -> usize;

    /// Clears the contents.
    async fn flush(&mut self);
}
