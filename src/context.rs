//! Resolution context.
//!
//! `ResolveContext` carries host data through to subsystems (combat state,
//! zone, event flags, ...) together with a cooperative cancellation flag and
//! an optional deadline. The engine never interprets the data; it only checks
//! cancellation once, at the start of each context-aware entry point.

use crate::error::StatError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Pass-through data plus cancellation for one resolution.
///
/// Clones share the same cancellation flag, so a handle kept by the caller
/// can cancel work started with a clone.
///
/// # Examples
///
/// ```rust
/// use actorstat::ResolveContext;
///
/// let mut ctx = ResolveContext::new();
/// ctx.set("in_combat", true);
/// ctx.set("zone", "pvp");
///
/// let in_combat: Option<bool> = ctx.get("in_combat");
/// assert_eq!(in_combat, Some(true));
/// assert!(ctx.check().is_ok());
///
/// ctx.cancel();
/// assert!(ctx.check().is_err());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolveContext {
    data: HashMap<String, serde_json::Value>,
    #[serde(skip)]
    cancelled: Arc<AtomicBool>,
    #[serde(skip)]
    deadline: Option<Instant>,
}

impl ResolveContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that expires `timeout` from now.
    ///
    /// A timeout too large to represent as an instant means no deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
            ..Self::default()
        }
    }

    /// Set a context value.
    ///
    /// The value must be serializable. If serialization fails, the value
    /// is silently not added.
    pub fn set(&mut self, key: impl Into<String>, value: impl Serialize) {
        if let Ok(json_value) = serde_json::to_value(value) {
            self.data.insert(key.into(), json_value);
        }
    }

    /// Get a context value.
    ///
    /// Returns `None` if the key doesn't exist or if the value
    /// cannot be deserialized to the requested type.
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Request cancellation of every operation sharing this context.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail if the context was cancelled or its deadline has passed.
    pub fn check(&self) -> Result<(), StatError> {
        if self.is_cancelled() {
            return Err(StatError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(StatError::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}
