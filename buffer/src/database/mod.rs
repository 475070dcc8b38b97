//! The database contract and the reference driver wrappers.

use std::time::Duration;

use async_trait::async_trait;

use crate::batch::View;
use crate::error::Error;
#[cfg(any(feature = "http", feature = "native"))]
use crate::row::Value;
use crate::row::Vector;

#[cfg(feature = "http")]
mod http;
#[cfg(feature = "native")]
mod native;

#[cfg(feature = "http")]
pub use http::ClickhouseHttp;
#[cfg(feature = "native")]
pub use native::ClickhouseNative;

pub const DEFAULT_INSERT_TIMEOUT: Duration = Duration::from_secs(15);

/// The database handle the client writes through.
///
/// The library only ever calls `insert` with a view and a positional row
/// slice; everything else about the connection is the wrapper's business.
#[async_trait]
pub trait Clickhouse: Send + Sync + 'static {
    /// Inserts the rows into the view's table, returning the number of
    /// appended rows.
    async fn insert(&self, view: &View, rows: &[Vector]) -> Result<u64, Error>;

    async fn close(&self) -> Result<(), Error>;
}

/// Renders the insert prefix for a view, keeping the column order.
pub(crate) fn insert_statement(view: &View) -> String {
    format!("INSERT INTO {} ({})", view.name, view.columns.join(", "))
}

/// Renders rows as a ClickHouse `VALUES` literal list.
#[cfg(feature = "native")]
pub(crate) fn render_values(rows: &[Vector]) -> String {
    let mut out = String::new();
    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push('(');
        for (j, value) in row.values().iter().enumerate() {
            if j > 0 {
                out.push(',');
            }
            render_value(value, &mut out);
        }
        out.push(')');
    }
    out
}

#[cfg(feature = "native")]
fn render_value(value: &Value, out: &mut String) {
    use std::fmt::Write;

    match value {
        Value::Null => out.push_str("NULL"),
        Value::Bool(v) => out.push_str(if *v { "true" } else { "false" }),
        Value::Int64(v) => {
            let _ = write!(out, "{v}");
        }
        Value::UInt64(v) => {
            let _ = write!(out, "{v}");
        }
        Value::Float64(v) => {
            if v.is_nan() {
                out.push_str("nan");
            } else if v.is_infinite() {
                out.push_str(if *v > 0.0 { "inf" } else { "-inf" });
            } else {
                let _ = write!(out, "{v}");
            }
        }
        Value::String(v) => {
            out.push('\'');
            for c in v.chars() {
                match c {
                    '\\' => out.push_str("\\\\"),
                    '\'' => out.push_str("\\'"),
                    c => out.push(c),
                }
            }
            out.push('\'');
        }
        Value::Bytes(v) => {
            out.push_str("unhex('");
            for b in v {
                let _ = write!(out, "{b:02x}");
            }
            out.push_str("')");
        }
        Value::DateTime(v) => {
            let _ = write!(out, "'{}'", v.format("%Y-%m-%d %H:%M:%S"));
        }
    }
}

/// JSON projection used by the `JSONEachRow` wrapper.
#[cfg(feature = "http")]
pub(crate) fn to_json(value: &Value) -> serde_json::Value {
    use chrono::SecondsFormat;

    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(v) => serde_json::Value::Bool(*v),
        Value::Int64(v) => serde_json::Value::from(*v),
        Value::UInt64(v) => serde_json::Value::from(*v),
        Value::Float64(v) => serde_json::Number::from_f64(*v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(v) => serde_json::Value::String(v.clone()),
        Value::Bytes(v) => serde_json::Value::Array(
            v.iter().map(|b| serde_json::Value::from(*b)).collect(),
        ),
        Value::DateTime(v) => {
            serde_json::Value::String(v.to_rfc3339_opts(SecondsFormat::Secs, true))
        }
    }
}
