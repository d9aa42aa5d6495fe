//! The transactional retry decorator.

use crate::{Session, SessionRegistry};
use sqlkeeper_connection::CatchHook;
use sqlkeeper_core::{Classifier, Error, FailureClass, Result, RetryPolicy};
use std::fmt;
use std::time::Duration;

/// Pause between transactional attempts.
pub type Sleeper = Box<dyn FnMut(Duration) + Send>;

/// Runs units of work in a transaction, replacing the session and trying
/// again when the failure is transient.
///
/// The decorator exclusively owns the current session. After any retryable
/// failure that session is closed and never touched again; callers must
/// reach the replacement through [`session`](Self::session) rather than
/// keeping their own handle.
pub struct RetryingSession<R: SessionRegistry> {
    session: R::Session,
    registry: R,
    name: Option<String>,
    policy: RetryPolicy,
    classifier: Classifier,
    catch_hook: Option<CatchHook>,
    sleeper: Sleeper,
}

impl<R: SessionRegistry> fmt::Debug for RetryingSession<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryingSession")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("catch_hook", &self.catch_hook.is_some())
            .finish_non_exhaustive()
    }
}

impl<R: SessionRegistry> RetryingSession<R> {
    /// Wrap `session`, which `registry` must be able to replace under `name`.
    pub fn new(
        session: R::Session,
        registry: R,
        policy: RetryPolicy,
        name: Option<String>,
    ) -> Result<Self> {
        let classifier = Classifier::for_policy(&policy)?;
        Ok(Self {
            session,
            registry,
            name,
            policy,
            classifier,
            catch_hook: None,
            sleeper: Box::new(std::thread::sleep),
        })
    }

    /// Replace the pause between attempts.
    pub fn with_sleeper(mut self, sleeper: impl FnMut(Duration) + Send + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    /// Install a hook called with every error a unit of work raises.
    pub fn set_catch_hook(&mut self, hook: impl FnMut(&Error) + Send + 'static) {
        self.catch_hook = Some(Box::new(hook));
    }

    pub fn clear_catch_hook(&mut self) -> Option<CatchHook> {
        self.catch_hook.take()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The current session. Changes after a retried failure.
    pub fn session(&self) -> &R::Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut R::Session {
        &mut self.session
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn into_session(self) -> R::Session {
        self.session
    }

    /// Run `unit` inside `begin … flush → commit`, retrying the whole unit on
    /// a fresh session while the policy allows.
    ///
    /// The value of the first fully committed attempt is returned. On
    /// exhaustion the error of the last attempt is returned unchanged. A
    /// failing commit is handled like any other failure in the attempt; a
    /// commit that succeeded is never replayed.
    #[tracing::instrument(level = "debug", skip(self, unit), fields(session = ?self.name))]
    pub fn run_in_transaction<T, F>(&mut self, mut unit: F) -> Result<T>
    where
        F: FnMut(&mut R::Session) -> Result<T>,
    {
        let mut attempt: u32 = 0;

        loop {
            let error = match self.attempt_once(&mut unit) {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!(attempts = attempt + 1, "Transaction committed after retry");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if let Some(hook) = self.catch_hook.as_mut() {
                hook(&error);
            }

            let class = self.classifier.classify(&error);
            self.rollback_if_active();

            if class == FailureClass::Fatal {
                tracing::debug!(error = %error, "Unit of work failed; not retrying");
                return Err(error);
            }

            let exhausted = attempt >= self.policy.attempts();
            if let Err(reset_error) = self.replace_session() {
                tracing::error!(
                    error = %reset_error,
                    original = %error,
                    "Could not obtain a fresh session"
                );
                return Err(if exhausted { error } else { reset_error });
            }

            attempt += 1;
            if exhausted {
                tracing::warn!(
                    attempts = attempt,
                    class = ?class,
                    error = %error,
                    "Transaction retries exhausted"
                );
                return Err(error);
            }

            tracing::warn!(
                attempt,
                max_attempts = self.policy.attempts(),
                class = ?class,
                error = %error,
                "Retrying transaction on a fresh session"
            );
            let pause = self.policy.sleep();
            if !pause.is_zero() {
                (self.sleeper)(pause);
            }
        }
    }

    fn attempt_once<T, F>(&mut self, unit: &mut F) -> Result<T>
    where
        F: FnMut(&mut R::Session) -> Result<T>,
    {
        self.session.begin()?;
        let value = unit(&mut self.session)?;
        self.session.flush()?;
        self.session.commit()?;
        Ok(value)
    }

    fn rollback_if_active(&mut self) {
        if !self.session.is_transaction_active() {
            return;
        }
        if let Err(e) = self.session.rollback() {
            tracing::warn!(error = %e, "Rollback after failed unit of work failed");
        }
    }

    // The old session is closed before asking for a new one so it can never
    // be reused, even if the registry fails.
    fn replace_session(&mut self) -> Result<()> {
        self.session.close();
        self.session = self.registry.reset_session(self.name.as_deref())?;
        Ok(())
    }
}
