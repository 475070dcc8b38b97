use std::time::Duration;

use async_trait::async_trait;

use crate::batch::View;
use crate::database::{insert_statement, render_values, Clickhouse, DEFAULT_INSERT_TIMEOUT};
use crate::error::{from_server_text, Error};
use crate::row::Vector;

/// Wrapper over the `clickhouse` crate client. Sends every batch as a single
/// multi-row `VALUES` statement.
pub struct ClickhouseNative {
    client: clickhouse::Client,
    insert_timeout: Duration,
}

impl ClickhouseNative {
    pub fn new(client: clickhouse::Client) -> Self {
        Self {
            client,
            insert_timeout: DEFAULT_INSERT_TIMEOUT,
        }
    }

    pub fn with_insert_timeout(mut self, insert_timeout: Duration) -> Self {
        self.insert_timeout = insert_timeout;
        self
    }
}

#[async_trait]
impl Clickhouse for ClickhouseNative {
    async fn insert(&self, view: &View, rows: &[Vector]) -> Result<u64, Error> {
        let statement = format!("{} VALUES {}", insert_statement(view), render_values(rows));
        let query = self.client.query(&statement).execute();
        match tokio::time::timeout(self.insert_timeout, query).await {
            Ok(Ok(())) => Ok(rows.len() as u64),
            Ok(Err(err)) => Err(map_driver_error(err)),
            Err(_) => Err(Error::Timeout(self.insert_timeout)),
        }
    }

    async fn close(&self) -> Result<(), Error> {
        // the underlying client pools http connections, nothing to release
        Ok(())
    }
}

fn map_driver_error(err: clickhouse::error::Error) -> Error {
    match err {
        clickhouse::error::Error::BadResponse(text) => from_server_text(text),
        other => Error::Transport(other.to_string()),
    }
}
