use std::time::Duration;

/// Errors surfaced by the library.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A server-side exception carrying a ClickHouse error code.
    #[error("clickhouse exception: code={code} {message}")]
    Exception { code: i32, message: String },

    /// Connection or protocol failure without a server error code.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("insert timed out after {0:?}")]
    Timeout(Duration),

    /// Row encoding/decoding failure.
    #[error("codec error: {0}")]
    Codec(String),

    /// Buffer backend failure (e.g. the remote list store).
    #[error("buffer backend error: {0}")]
    Backend(String),

    #[error("retry queue is closed")]
    QueueClosed,
}

// Server error codes that disable retry. Resending on any of these would loop
// forever: the insert is rejected for structural reasons, not load.
// see: https://github.com/ClickHouse/ClickHouse/blob/master/src/Common/ErrorCodes.cpp
const NO_RETRY_CODES: [i32; 20] = [
    1,   // UNSUPPORTED_METHOD
    2,   // UNSUPPORTED_PARAMETER
    20,  // NUMBER_OF_COLUMNS_DOESNT_MATCH
    60,  // UNKNOWN_TABLE
    62,  // SYNTAX_ERROR
    80,  // INCORRECT_QUERY
    81,  // UNKNOWN_DATABASE
    108, // NO_DATA_TO_INSERT
    158, // TOO_MANY_ROWS
    161, // TOO_MANY_COLUMNS
    164, // READONLY
    192, // UNKNOWN_USER
    193, // WRONG_PASSWORD
    195, // IP_ADDRESS_NOT_ALLOWED
    229, // QUERY_IS_TOO_LARGE
    241, // MEMORY_LIMIT_EXCEEDED
    242, // TABLE_IS_READ_ONLY
    291, // DATABASE_ACCESS_DENIED
    372, // SESSION_NOT_FOUND
    373, // SESSION_IS_LOCKED
];

/// Whether an undelivered batch may be resent.
///
/// Errors without a recognizable server code are treated as transient.
pub fn is_retry_eligible(error: &Error) -> bool {
    match error {
        Error::Exception { code, .. } => !NO_RETRY_CODES.contains(code),
        _ => true,
    }
}

/// Extracts `(code, message)` from server exception text of the form
/// `"Code: 60. DB::Exception: Table default.t does not exist"`.
pub(crate) fn parse_exception(text: &str) -> Option<(i32, String)> {
    let start = text.find("Code:")? + "Code:".len();
    let rest = text[start..].trim_start();
    let digits: &str = rest
        .split(|c: char| !c.is_ascii_digit())
        .next()
        .filter(|s| !s.is_empty())?;
    let code = digits.parse().ok()?;
    Some((code, text.trim().to_string()))
}

/// Maps raw server response text to an [`Error`], preferring an exception
/// with a parsed code over a bare transport error.
pub(crate) fn from_server_text(text: String) -> Error {
    match parse_exception(&text) {
        Some((code, message)) => Error::Exception { code, message },
        None => Error::Transport(text),
    }
}
