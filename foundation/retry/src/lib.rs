pub mod backoff;
pub mod invoke;

pub use backoff::FibonacciBackoff;
pub use invoke::{invoke, Condition, RetryAlways, RetrySetting};
