use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::buffer::Buffer;
use crate::row::Vector;

/// Mutex-guarded in-process buffer for tests that poke the buffer from
/// several tasks at once. Clones share the same storage.
#[derive(Clone)]
pub struct SyncBuffer {
    rows: Arc<RwLock<Vec<Vector>>>,
}

impl SyncBuffer {
    pub fn new(batch_size: usize) -> Self {
        Self {
            rows: Arc::new(RwLock::new(Vec::with_capacity(batch_size))),
        }
    }
}

#[async_trait]
impl Buffer for SyncBuffer {
    async fn write(&mut self, vector: Vector) {
        self.rows.write().push(vector);
    }

    async fn read(&self) -> Vec<Vector> {
        self.rows.read().clone()
    }

    fn len(&self) -> usize {
        self.rows.read().len()
    }

    async fn flush(&mut self) {
        self.rows.write().clear();
    }
}
