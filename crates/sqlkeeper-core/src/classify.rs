//! Failure classification.
//!
//! Every caught error is sorted into a [`FailureClass`] before any retry
//! decision is made. The class is computed on demand and never stored.

use crate::config::RetryPolicy;
use crate::error::{Error, Result};
use regex::{RegexSet, RegexSetBuilder};

/// Vendor wording that identifies a dropped connection.
pub const CONNECTION_LOSS_PHRASES: &[&str] = &[
    "MySQL server has gone away",
    "Lost connection to MySQL server during query",
    "Error while sending QUERY packet",
];

/// How a caught error should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The socket went away; reconnecting may fix it.
    TransientConnectionLoss,
    /// The operation itself conflicted (deadlock, serialization) and may be replayed.
    RetryableOperation,
    /// Anything else. Never retried.
    Fatal,
}

impl FailureClass {
    pub fn is_retryable(self) -> bool {
        !matches!(self, FailureClass::Fatal)
    }
}

/// Sorts errors into [`FailureClass`]es under a given [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct Classifier {
    phrases: RegexSet,
    handle_retryable: bool,
}

impl Classifier {
    /// Build a classifier for `policy`, compiling the built-in vocabulary plus
    /// the policy's extra phrases into one case-insensitive matcher.
    pub fn for_policy(policy: &RetryPolicy) -> Result<Self> {
        let patterns = CONNECTION_LOSS_PHRASES
            .iter()
            .map(|p| regex::escape(p))
            .chain(
                policy
                    .extra_connection_loss_phrases()
                    .iter()
                    .map(|p| regex::escape(p)),
            );
        let phrases = RegexSetBuilder::new(patterns)
            .case_insensitive(true)
            .build()
            .map_err(|e| Error::config(format!("invalid connection-loss phrase: {e}")))?;

        Ok(Self {
            phrases,
            handle_retryable: policy.handles_retryable_exceptions(),
        })
    }

    /// Does the error's message mention a known connection-loss phrase?
    pub fn is_connection_loss(&self, error: &Error) -> bool {
        error.is_disconnect() || self.phrases.is_match(&error.to_string())
    }

    /// Classify a caught error.
    pub fn classify(&self, error: &Error) -> FailureClass {
        let class = if self.is_connection_loss(error) {
            FailureClass::TransientConnectionLoss
        } else if self.handle_retryable && error.is_retryable() {
            FailureClass::RetryableOperation
        } else {
            FailureClass::Fatal
        };
        tracing::trace!(class = ?class, error = %error, "Classified failure");
        class
    }
}

impl Default for Classifier {
    fn default() -> Self {
        let phrases = RegexSetBuilder::new(CONNECTION_LOSS_PHRASES.iter().map(|p| regex::escape(p)))
            .case_insensitive(true)
            .build()
            .unwrap_or_else(|_| RegexSet::empty());
        Self {
            phrases,
            handle_retryable: false,
        }
    }
}
