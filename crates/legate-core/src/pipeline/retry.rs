//! Transient-failure retry around the remainder of a pipeline.

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{DispatchError, DispatchResult};
use crate::pipeline::filter::Filter;
use crate::pipeline::pipe::Pipe;

type ErrorSelector = Box<dyn Fn(&DispatchError) -> bool + Send + Sync>;

/// How a retry stage reacts to failures of the stages after it.
///
/// With no selectors configured, every error except cancellation is
/// retried. Selectors narrow that to specific handler error types (or an
/// arbitrary predicate) and OR-combine when several are present.
/// Cancellation is never retried regardless of selectors.
///
/// ```
/// use std::time::Duration;
/// use legate_core::pipeline::RetryPolicy;
///
/// #[derive(Debug, thiserror::Error)]
/// #[error("store unavailable")]
/// struct StoreUnavailable;
///
/// let policy = RetryPolicy::attempts(3)
///     .interval(Duration::from_millis(50))
///     .handle::<StoreUnavailable>();
/// # let _ = policy;
/// ```
pub struct RetryPolicy {
    attempts: u32,
    interval: Duration,
    selectors: Vec<ErrorSelector>,
}

impl RetryPolicy {
    /// Retries until `attempts` total tries have been made (minimum one).
    pub fn attempts(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            interval: Duration::ZERO,
            selectors: Vec::new(),
        }
    }

    /// Sleeps for `interval` between consecutive tries.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Retries handler failures whose concrete error type is `E`.
    pub fn handle<E>(mut self) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.selectors
            .push(Box::new(|error| error.handler_is::<E>()));
        self
    }

    /// Retries errors for which `selector` returns true.
    pub fn handle_when<S>(mut self, selector: S) -> Self
    where
        S: Fn(&DispatchError) -> bool + Send + Sync + 'static,
    {
        self.selectors.push(Box::new(selector));
        self
    }

    fn should_retry(&self, error: &DispatchError) -> bool {
        if matches!(error, DispatchError::Cancelled) {
            return false;
        }
        if self.selectors.is_empty() {
            return true;
        }
        self.selectors.iter().any(|selector| selector(error))
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("attempts", &self.attempts)
            .field("interval", &self.interval)
            .field("selectors", &self.selectors.len())
            .finish()
    }
}

/// Stage that re-sends the rest of the pipeline on retryable failures.
pub(crate) struct RetryFilter {
    policy: RetryPolicy,
}

impl RetryFilter {
    pub(crate) fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl<Ctx: Send + 'static> Filter<Ctx> for RetryFilter {
    async fn send(&self, ctx: &mut Ctx, next: &Pipe<Ctx>) -> DispatchResult<()> {
        let mut attempt = 1u32;
        loop {
            match next.send(ctx).await {
                Ok(()) => return Ok(()),
                Err(error) => {
                    if attempt >= self.policy.attempts || !self.policy.should_retry(&error) {
                        return Err(error);
                    }
                    debug!(attempt, error = %error, "retrying after stage failure");
                    attempt += 1;
                    if !self.policy.interval.is_zero() {
                        tokio::time::sleep(self.policy.interval).await;
                    }
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "retry"
    }
}
