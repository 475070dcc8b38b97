#![allow(dead_code)]

use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use clickhouse_buffer::database::Clickhouse;
use clickhouse_buffer::{Error, Rower, Value, Vector, View};

/// Database handle standing in for a real server: records inserted batches
/// and fails with an injectable exception code.
pub struct MockClickhouse {
    batches: Mutex<Vec<(String, Vec<Vector>)>>,
    fail_code: AtomicI32,
    calls: AtomicUsize,
}

impl MockClickhouse {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            batches: Mutex::new(Vec::new()),
            fail_code: AtomicI32::new(0),
            calls: AtomicUsize::new(0),
        })
    }

    /// Makes every following insert fail with the given server code.
    pub fn fail_with(&self, code: i32) {
        self.fail_code.store(code, Ordering::SeqCst);
    }

    /// Makes every following insert succeed.
    pub fn succeed(&self) {
        self.fail_code.store(0, Ordering::SeqCst);
    }

    /// Number of insert calls, including failed ones.
    pub fn insert_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Successfully inserted batches, in arrival order.
    pub fn batches(&self) -> Vec<Vec<Vector>> {
        self.batches.lock().iter().map(|(_, rows)| rows.clone()).collect()
    }

    /// All successfully inserted rows concatenated in arrival order.
    pub fn rows(&self) -> Vec<Vector> {
        self.batches.lock().iter().flat_map(|(_, rows)| rows.clone()).collect()
    }
}

#[async_trait]
impl Clickhouse for MockClickhouse {
    async fn insert(&self, view: &View, rows: &[Vector]) -> Result<u64, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let code = self.fail_code.load(Ordering::SeqCst);
        if code != 0 {
            return Err(Error::Exception {
                code,
                message: format!("Code: {code}. DB::Exception: injected failure"),
            });
        }
        self.batches.lock().push((view.name.clone(), rows.to_vec()));
        Ok(rows.len() as u64)
    }

    async fn close(&self) -> Result<(), Error> {
        Ok(())
    }
}

/// Sample record used across the scenario tests.
pub struct SampleRow {
    pub id: i64,
    pub label: String,
    pub at: DateTime<Utc>,
}

impl SampleRow {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            label: id.to_string(),
            at: Utc.with_ymd_and_hms(2023, 7, 1, 12, 0, 0).unwrap(),
        }
    }
}

impl Rower for SampleRow {
    fn row(&self) -> Vector {
        vec![
            Value::from(self.id),
            Value::from(self.label.as_str()),
            Value::from(self.at),
        ]
        .into()
    }
}

/// Polls until the condition holds or the timeout elapses.
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
