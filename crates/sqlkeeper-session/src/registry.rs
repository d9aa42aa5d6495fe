//! Closure-backed session registry.

use crate::{Session, SessionRegistry};
use sqlkeeper_core::Result;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

/// Logical name used when none is given.
pub const DEFAULT_SESSION_NAME: &str = "default";

/// A [`SessionRegistry`] that builds every session with a factory closure.
///
/// The closure receives the logical session name, which lets one registry
/// serve several databases.
pub struct FactoryRegistry<S, F> {
    factory: F,
    default_name: String,
    resets: HashMap<String, u64>,
    _session: PhantomData<fn() -> S>,
}

impl<S, F> fmt::Debug for FactoryRegistry<S, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryRegistry")
            .field("default_name", &self.default_name)
            .field("resets", &self.resets)
            .finish_non_exhaustive()
    }
}

impl<S, F> FactoryRegistry<S, F>
where
    S: Session,
    F: FnMut(&str) -> Result<S>,
{
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            default_name: DEFAULT_SESSION_NAME.to_string(),
            resets: HashMap::new(),
            _session: PhantomData,
        }
    }

    /// Use `name` when callers do not pass one.
    pub fn with_default_name(mut self, name: impl Into<String>) -> Self {
        self.default_name = name.into();
        self
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    /// Build the initial session for `name`. Not counted as a reset.
    pub fn session(&mut self, name: Option<&str>) -> Result<S> {
        let name = name.unwrap_or(&self.default_name).to_string();
        (self.factory)(&name)
    }

    /// How many times the session under `name` has been reset.
    pub fn reset_count(&self, name: Option<&str>) -> u64 {
        let name = name.unwrap_or(&self.default_name);
        self.resets.get(name).copied().unwrap_or(0)
    }
}

impl<S, F> SessionRegistry for FactoryRegistry<S, F>
where
    S: Session,
    F: FnMut(&str) -> Result<S>,
{
    type Session = S;

    fn reset_session(&mut self, name: Option<&str>) -> Result<S> {
        let name = name.unwrap_or(&self.default_name).to_string();
        let session = (self.factory)(&name)?;
        let count = self.resets.entry(name.clone()).or_insert(0);
        *count += 1;
        tracing::debug!(session = %name, resets = *count, "Session reset");
        Ok(session)
    }
}
