use std::sync::Arc;

use crate::batch::{Batch, View};
use crate::client::BatchSink;
use crate::error::Error;
use crate::row::{Rower, Vector};

/// Synchronous, per-view writer. Skips the staging buffer entirely: the
/// given rows become one batch and are written immediately.
#[derive(Clone)]
pub struct WriterBlocking {
    view: View,
    sink: Arc<dyn BatchSink>,
}

impl WriterBlocking {
    pub(crate) fn new(sink: Arc<dyn BatchSink>, view: View) -> Self {
        Self { view, sink }
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    /// Writes the records as a single batch, returning the insert error
    /// verbatim. Writing an empty slice is a no-op.
    pub async fn write_row(&self, rows: &[impl Rower]) -> Result<(), Error> {
        if rows.is_empty() {
            return Ok(());
        }
        self.write_vectors(rows.iter().map(|row| row.row()).collect())
            .await
    }

    /// [`WriterBlocking::write_row`] for callers that already hold vectors.
    pub async fn write_vectors(&self, rows: Vec<Vector>) -> Result<(), Error> {
        if rows.is_empty() {
            return Ok(());
        }
        self.sink.write_batch(&self.view, Batch::new(rows)).await
    }
}
