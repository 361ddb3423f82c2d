//! Bounded-retry send helper for the campaign path.
//!
//! The policy is a value so tests can shrink the delays and the batch
//! sender does not care how the backoff curve is shaped.

use crate::error::TransportError;
use crate::mailer::{EmailTransport, OutboundEmail, SendReceipt};
use tokio::time::Duration;

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following `attempt` (1-based): base * 2^attempt,
    /// i.e. 2s after the first failure and 4s after the second with the
    /// default base.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

/// Attempt the send up to `policy.max_attempts` times, sleeping the
/// backoff between attempts. First success short-circuits; errors that
/// can never succeed (malformed input) are returned immediately.
pub async fn send_with_retry(
    transport: &dyn EmailTransport,
    message: &OutboundEmail,
    policy: RetryPolicy,
) -> Result<SendReceipt, TransportError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match transport.send(message).await {
            Ok(receipt) => return Ok(receipt),
            Err(e) if attempt < policy.max_attempts && e.is_retryable() => {
                tracing::warn!(
                    name = "automation.retry.attempt_failed",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    error = %e,
                    attempt,
                    max_attempts = policy.max_attempts,
                    message = "Send attempt failed, backing off"
                );
                tokio::time::sleep(policy.backoff(attempt)).await;
            }
            Err(e) => return Err(e),
        }
    }
}
