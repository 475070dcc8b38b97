use async_trait::async_trait;

use crate::buffer::Buffer;
use crate::row::Vector;

/// In-process buffer backed by a plain vector. Not thread-safe; the writer
/// guarantees serial access.
pub struct MemoryBuffer {
    rows: Vec<Vector>,
    size: usize,
}

impl MemoryBuffer {
    pub fn new(batch_size: usize) -> Self {
        Self {
            rows: Vec::with_capacity(batch_size),
            size: batch_size,
        }
    }
}

#[async_trait]
impl Buffer for MemoryBuffer {
    async fn write(&mut self, vector: Vector) {
        self.rows.push(vector);
    }

    async fn read(&self) -> Vec<Vector> {
        self.rows.clone()
    }

    fn len(&self) -> usize {
        self.rows.len()
    }

    async fn flush(&mut self) {
        self.rows = Vec::with_capacity(self.size);
    }
}
