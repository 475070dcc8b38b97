//! # clickhouse-buffer
//!
//! Client-side write batching for ClickHouse-style columnar databases.
//!
//! Applications produce rows one at a time; the server ingests most
//! efficiently in large multi-row batches. This library sits between the two:
//! rows are staged in per-table buffers and flushed as batches when the batch
//! size is reached or the flush interval elapses. Failed batches can be
//! resent through a bounded retry queue with an error classifier that keeps
//! permanently rejected inserts out of the loop.
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use clickhouse_buffer::buffer::MemoryBuffer;
//! use clickhouse_buffer::database::ClickhouseNative;
//! use clickhouse_buffer::{Client, Options, Rower, Value, Vector, View};
//!
//! struct Visit {
//!     user_id: u64,
//!     page: String,
//! }
//!
//! impl Rower for Visit {
//!     fn row(&self) -> Vector {
//!         vec![
//!             Value::from(self.user_id),
//!             Value::from(self.page.as_str()),
//!         ]
//!         .into()
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let conn = ClickhouseNative::new(
//!         clickhouse::Client::default().with_url("http://localhost:8123"),
//!     );
//!     let options = Options::new()
//!         .with_batch_size(2000)
//!         .with_flush_interval(Duration::from_millis(500))
//!         .with_retry(true);
//!     let client = Client::with_options(Arc::new(conn), options);
//!
//!     let view = View::new("visits", vec!["user_id", "page"]);
//!     let writer = client.writer(view, Box::new(MemoryBuffer::new(2000)));
//!
//!     writer
//!         .write_row(&Visit {
//!             user_id: 42,
//!             page: "/pricing".to_string(),
//!         })
//!         .await;
//!
//!     // drain in-flight batches before exiting
//!     client.close().await;
//! }
//! ```
//!
//! ## Errors
//!
//! Insert failures surface on [`Writer::errors`] when a consumer subscribed
//! before the write. With retry enabled, eligible failures are also resent in
//! the background; delivery counters are available through
//! [`Client::retry_client`].

pub mod batch;
pub mod buffer;
pub mod client;
pub mod database;
pub mod error;
pub mod options;
pub mod retry;
pub mod row;
pub mod writer;
pub mod writer_blocking;

pub use batch::{Batch, View};
pub use client::Client;
pub use error::{is_retry_eligible, Error};
pub use options::Options;
pub use row::{Rower, Value, Vector};
pub use writer::Writer;
pub use writer_blocking::WriterBlocking;
