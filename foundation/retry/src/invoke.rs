use std::future::Future;
use std::iter::Take;
use std::time::Duration;

use crate::backoff::FibonacciBackoff;

/// Decides whether an error is worth another attempt.
pub trait Condition<E> {
    fn should_retry(&mut self, error: &E) -> bool;
}

/// Retries every error until the strategy is exhausted.
pub struct RetryAlways;

impl<E> Condition<E> for RetryAlways {
    fn should_retry(&mut self, _error: &E) -> bool {
        true
    }
}

impl<E, F> Condition<E> for F
where
    F: FnMut(&E) -> bool,
{
    fn should_retry(&mut self, error: &E) -> bool {
        self(error)
    }
}

#[derive(Debug, Clone)]
pub struct RetrySetting {
    pub from_millis: u64,
    pub max_delay: Option<Duration>,
    /// Number of backoff sleeps, i.e. attempts minus one.
    pub take: usize,
}

impl RetrySetting {
    pub fn strategy(&self) -> Take<FibonacciBackoff> {
        let mut st = FibonacciBackoff::from_millis(self.from_millis);
        if let Some(max_delay) = self.max_delay {
            st = st.max_delay(max_delay);
        }
        st.take(self.take)
    }
}

impl Default for RetrySetting {
    fn default() -> Self {
        Self {
            from_millis: 100,
            max_delay: None,
            take: 2,
        }
    }
}

/// Runs the action, sleeping between attempts according to the setting's
/// backoff strategy. The first attempt is not delayed. Returns the last error
/// once the strategy is exhausted or the condition rejects the error.
pub async fn invoke<R, E, A>(
    retry: Option<RetrySetting>,
    mut condition: impl Condition<E>,
    mut action: impl FnMut() -> A,
) -> Result<R, E>
where
    A: Future<Output = Result<R, E>>,
{
    let retry = retry.unwrap_or_default();
    let mut strategy = retry.strategy();
    loop {
        let error = match action().await {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };
        if !condition.should_retry(&error) {
            return Err(error);
        }
        match strategy.next() {
            None => return Err(error),
            Some(duration) => tokio::time::sleep(duration).await,
        };
    }
}
