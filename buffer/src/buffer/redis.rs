use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::buffer::Buffer;
use crate::error::Error;
use crate::row::Vector;

const KEY_PREFIX: &str = "ch_buffer";

fn key(bucket: &str) -> String {
    format!("{KEY_PREFIX}:{bucket}")
}

/// Remote buffer backed by a redis list. Vectors are stored as encoded bytes
/// so that buffered rows survive the producer process.
///
/// The length is tracked locally with an atomic counter seeded by a single
/// `LLEN` at construction, avoiding one network round trip per buffered row.
pub struct RedisBuffer {
    conn: ConnectionManager,
    key: String,
    batch_size: usize,
    len: AtomicUsize,
}

impl RedisBuffer {
    pub async fn new(
        conn: ConnectionManager,
        bucket: &str,
        batch_size: usize,
    ) -> Result<Self, Error> {
        let key = key(bucket);
        let mut probe = conn.clone();
        let len: usize = probe
            .llen(&key)
            .await
            .map_err(|e| Error::Backend(e.to_string()))?;
        Ok(Self {
            conn,
            key,
            batch_size,
            len: AtomicUsize::new(len),
        })
    }

    /// The redis key holding the buffered rows.
    pub fn bucket_key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl Buffer for RedisBuffer {
    async fn write(&mut self, vector: Vector) {
        let bytes = match vector.encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::error!("redis buffer value encode: {err}");
                return;
            }
        };
        let mut conn = self.conn.clone();
        match conn.rpush::<_, _, i64>(&self.key, bytes).await {
            Ok(_) => {
                self.len.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => tracing::error!("redis buffer write: {err}"),
        }
    }

    async fn read(&self) -> Vec<Vector> {
        let mut conn = self.conn.clone();
        let stop = self.batch_size as isize - 1;
        let values: Vec<Vec<u8>> = match conn.lrange(&self.key, 0, stop).await {
            Ok(values) => values,
            Err(err) => {
                tracing::error!("redis buffer read: {err}");
                return Vec::new();
            }
        };
        values
            .iter()
            .filter_map(|bytes| match Vector::decode(bytes) {
                Ok(vector) => Some(vector),
                Err(err) => {
                    tracing::error!("redis buffer value decode: {err}");
                    None
                }
            })
            .collect()
    }

    fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    async fn flush(&mut self) {
        let mut conn = self.conn.clone();
        if let Err(err) = conn
            .ltrim::<_, ()>(&self.key, self.batch_size as isize, -1)
            .await
        {
            tracing::error!("redis buffer flush: {err}");
            return;
        }
        let current = self.len.load(Ordering::Relaxed);
        self.len
            .store(current.saturating_sub(self.batch_size), Ordering::Relaxed);
    }
}
