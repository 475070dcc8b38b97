use std::time::Duration;

use async_trait::async_trait;

use crate::batch::View;
use crate::database::{insert_statement, to_json, Clickhouse, DEFAULT_INSERT_TIMEOUT};
use crate::error::{from_server_text, Error};
use crate::row::Vector;

const EXCEPTION_CODE_HEADER: &str = "x-clickhouse-exception-code";

/// Wrapper over the raw ClickHouse HTTP interface. Streams every batch as an
/// `INSERT ... FORMAT JSONEachRow` request body.
pub struct ClickhouseHttp {
    http: reqwest::Client,
    url: String,
    database: Option<String>,
    user: Option<String>,
    password: Option<String>,
    insert_timeout: Duration,
}

impl ClickhouseHttp {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            database: None,
            user: None,
            password: None,
            insert_timeout: DEFAULT_INSERT_TIMEOUT,
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_insert_timeout(mut self, insert_timeout: Duration) -> Self {
        self.insert_timeout = insert_timeout;
        self
    }

    fn body(view: &View, rows: &[Vector]) -> Result<String, Error> {
        let mut body = String::new();
        for row in rows {
            let object: serde_json::Map<String, serde_json::Value> = view
                .columns
                .iter()
                .zip(row.values())
                .map(|(column, value)| (column.clone(), to_json(value)))
                .collect();
            let line = serde_json::to_string(&object).map_err(|e| Error::Codec(e.to_string()))?;
            body.push_str(&line);
            body.push('\n');
        }
        Ok(body)
    }
}

#[async_trait]
impl Clickhouse for ClickhouseHttp {
    async fn insert(&self, view: &View, rows: &[Vector]) -> Result<u64, Error> {
        let query = format!("{} FORMAT JSONEachRow", insert_statement(view));
        let mut request = self
            .http
            .post(self.url.as_str())
            .query(&[("query", query.as_str())])
            .body(Self::body(view, rows)?)
            .timeout(self.insert_timeout);
        if let Some(database) = &self.database {
            request = request.query(&[("database", database.as_str())]);
        }
        if let Some(user) = &self.user {
            request = request.header("X-ClickHouse-User", user);
        }
        if let Some(password) = &self.password {
            request = request.header("X-ClickHouse-Key", password);
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                Error::Timeout(self.insert_timeout)
            } else {
                Error::Transport(err.to_string())
            }
        })?;

        if response.status().is_success() {
            return Ok(rows.len() as u64);
        }

        let code = response
            .headers()
            .get(EXCEPTION_CODE_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i32>().ok());
        let text = response.text().await.unwrap_or_default();
        match code {
            Some(code) => Err(Error::Exception {
                code,
                message: text.trim().to_string(),
            }),
            None => Err(from_server_text(text)),
        }
    }

    async fn close(&self) -> Result<(), Error> {
        Ok(())
    }
}
