use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::{CallioError, Completion, CompletionClient, CompletionRequest};

/// Fixed-delay retry for transient provider failures.
///
/// `max_retries: None` never gives up on a transient failure; a row only
/// stops retrying when the provider answers or fails terminally.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    pub max_retries: Option<usize>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(10),
            max_retries: None,
        }
    }
}

pub fn is_transient(error: &CallioError) -> bool {
    matches!(
        error,
        CallioError::RateLimited { .. }
            | CallioError::Timeout(_)
            | CallioError::ServiceUnavailable(_)
            | CallioError::Api(_)
            | CallioError::Network(_)
    )
}

impl RetryPolicy {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_retries: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: Option<usize>) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delay before the next attempt; a server-provided `Retry-After` wins
    /// when it is longer than the configured delay.
    pub fn delay_for(&self, error: &CallioError) -> Duration {
        match error {
            CallioError::RateLimited {
                retry_after: Some(retry_after),
                ..
            } => (*retry_after).max(self.delay),
            _ => self.delay,
        }
    }

    /// Runs `op` until it succeeds, fails terminally, or the retry ceiling is
    /// reached. `on_retry` sees the retry number (starting at 1) and the
    /// transient error before each sleep.
    pub async fn run<T, F, Fut, R>(&self, mut op: F, mut on_retry: R) -> Result<T, CallioError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallioError>>,
        R: FnMut(usize, &CallioError),
    {
        let mut retries = 0usize;
        loop {
            match op().await {
                Ok(output) => return Ok(output),
                Err(error) if is_transient(&error) => {
                    if let Some(max) = self.max_retries {
                        if retries >= max {
                            return Err(CallioError::MaxRetriesExceeded { max });
                        }
                    }
                    retries += 1;
                    on_retry(retries, &error);
                    sleep(self.delay_for(&error)).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// A completion client that retries transient failures in place.
pub struct Retrying<C> {
    client: C,
    policy: RetryPolicy,
}

impl<C> Retrying<C> {
    pub fn new(client: C, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }
}

#[async_trait::async_trait]
impl<C> CompletionClient for Retrying<C>
where
    C: CompletionClient,
{
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, CallioError> {
        let client = &self.client;
        let request = &request;
        self.policy
            .run(
                move || client.complete(request.clone()),
                move |retry, error| {
                    tracing::warn!(
                        retry,
                        error = %error,
                        model = %request.model,
                        "retrying completion"
                    );
                },
            )
            .await
    }
}
