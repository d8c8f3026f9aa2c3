//! Bounded retry with a recovery step between attempts.

use std::fmt;
use std::time::Duration;

use tracing::{debug, warn};

use crate::TransferError;
use crate::connection::BoxFuture;

/// Error text that marks a dropped connection or an unreachable data
/// channel, matched case-insensitively.
const TRANSIENT_MARKERS: &[&str] = &[
    "econnreset",
    "connection reset",
    "client is closed",
    "timeout",
    "timed out",
    "eai_again",
    "temporary failure in name resolution",
    "can't open data connection",
    "unable to open data connection",
];

/// Attempt budget and linear backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt that follows failed attempt `attempt`
    /// (1-based): `base_delay * attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt.max(1))
    }
}

/// Handed to the recovery step after a transient failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryNotice {
    /// The attempt that just failed (1-based).
    pub attempt: u32,
    pub delay: Duration,
    pub error: String,
}

/// Whether an error is worth another attempt on a fresh connection.
///
/// Path and configuration errors never are. FTP errors are classified by
/// kind first, then by message text like everything else.
pub fn is_transient(err: &TransferError) -> bool {
    match err {
        TransferError::Closed => true,
        TransferError::Path(_) | TransferError::InvalidPath(_) | TransferError::Config(_) => false,
        TransferError::Ftp(e) if e.is_transient() => true,
        other => has_transient_marker(&other.to_string()),
    }
}

fn has_transient_marker(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_MARKERS.iter().any(|m| lower.contains(m))
}

/// Runs `op` until it succeeds, fails terminally, or the attempt budget is
/// spent. After each transient failure `recover` runs with the backoff
/// delay; it is expected to sleep and replace whatever `state` holds.
///
/// Returns the last result together with the number of attempts made.
pub async fn retry_with_backoff<S, T, E, Op, Recover>(
    state: &mut S,
    policy: &RetryPolicy,
    is_transient: impl Fn(&E) -> bool,
    mut op: Op,
    mut recover: Recover,
) -> (Result<T, E>, u32)
where
    E: fmt::Display,
    Op: for<'a> FnMut(&'a mut S, u32) -> BoxFuture<'a, Result<T, E>>,
    Recover: for<'a> FnMut(&'a mut S, RetryNotice) -> BoxFuture<'a, ()>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(&mut *state, attempt).await {
            Ok(value) => return (Ok(value), attempt),
            Err(e) if attempt < max_attempts && is_transient(&e) => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient failure, retrying"
                );
                recover(
                    &mut *state,
                    RetryNotice {
                        attempt,
                        delay,
                        error: e.to_string(),
                    },
                )
                .await;
                attempt += 1;
            }
            Err(e) => {
                debug!(attempt, transient = is_transient(&e), error = %e, "giving up");
                return (Err(e), attempt);
            }
        }
    }
}
