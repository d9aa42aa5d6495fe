//! The resilient operation executor.
//!
//! [`ResilientExecutor::handle`] runs one logical call against a [`Driver`],
//! and on failure decides between propagating the error and resetting the
//! connection for another attempt.

use sqlkeeper_core::{Classifier, Driver, Error, FailureClass, Result, RetryPolicy};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Per-invocation bookkeeping. Never outlives one `handle` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttemptState {
    /// Number of resets performed so far.
    pub attempt: u32,
    /// Whether the last caught error was judged worth another attempt.
    pub retry_requested: bool,
}

/// Runs operations against a driver, reconnecting and retrying on transient failures.
#[derive(Debug, Clone)]
pub struct ResilientExecutor {
    policy: RetryPolicy,
    classifier: Classifier,
}

impl ResilientExecutor {
    /// Create an executor for `policy`.
    pub fn new(policy: RetryPolicy) -> Result<Self> {
        let classifier = Classifier::for_policy(&policy)?;
        Ok(Self { policy, classifier })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Run `operation`, retrying it after a reconnect while the policy allows.
    ///
    /// `pinned` marks a connection that must not be retried at this layer
    /// (it was closed while a transaction was open). A transaction open on the
    /// driver pins the connection as well.
    ///
    /// `on_caught` sees every caught error exactly once, before the retry
    /// decision, including errors raised while reconnecting or probing.
    ///
    /// On exhaustion the error of the final attempt is returned unchanged.
    /// A lost connection is then closed rather than reopened here: with
    /// retries disabled (`attempts == 0`) no diagnostic reconnect is issued,
    /// and the next call on the connection opens a fresh one lazily.
    pub fn handle<D, T, F, H>(
        &self,
        driver: &mut D,
        pinned: bool,
        mut operation: F,
        mut on_caught: H,
    ) -> Result<T>
    where
        D: Driver + ?Sized,
        F: FnMut(&mut D) -> Result<T>,
        H: FnMut(&Error),
    {
        let pinned = pinned || driver.transaction_nesting_level() > 0;
        let mut state = AttemptState::default();

        loop {
            let mut error = match operation(driver) {
                Ok(value) => {
                    if state.attempt > 0 {
                        tracing::info!(
                            attempts = state.attempt + 1,
                            "Operation succeeded after reconnect"
                        );
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            // Reconnect, folding any failure of the reset itself back into
            // the same decision at the next attempt index.
            loop {
                on_caught(&error);

                let class = self.classifier.classify(&error);
                let in_transaction = pinned || driver.transaction_nesting_level() > 0;
                state.retry_requested = class.is_retryable()
                    && !in_transaction
                    && state.attempt < self.policy.attempts();

                if !state.retry_requested {
                    if class == FailureClass::TransientConnectionLoss && !in_transaction {
                        // Never hand a dead socket to the next caller; the
                        // next operation reconnects.
                        driver.close();
                    }
                    tracing::debug!(
                        attempt = state.attempt,
                        class = ?class,
                        in_transaction,
                        error = %error,
                        "Propagating failure"
                    );
                    return Err(error);
                }

                state.attempt += 1;
                tracing::warn!(
                    attempt = state.attempt,
                    max_attempts = self.policy.attempts(),
                    class = ?class,
                    error = %error,
                    "Reconnecting before retry"
                );

                match self.reset(driver) {
                    Ok(()) => break,
                    Err(reset_error) => {
                        tracing::debug!(error = %reset_error, "Reconnect failed");
                        error = reset_error;
                    }
                }
            }
        }
    }

    fn reset<D: Driver + ?Sized>(&self, driver: &mut D) -> Result<()> {
        driver.close();
        driver.connect()?;
        if self.policy.refreshes_on_exception() {
            probe(driver)?;
        }
        Ok(())
    }
}

/// Run a trivial round-trip query to prove the connection is usable.
pub fn probe<D: Driver + ?Sized>(driver: &mut D) -> Result<()> {
    driver.query(&probe_sql(), &[]).map(|_| ())
}

/// A `SELECT` of a unique literal, so no intermediate cache can answer it.
pub fn probe_sql() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("SELECT 'ping_{nanos:x}.{seq}'")
}
