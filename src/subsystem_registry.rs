//! Subsystem registry.
//!
//! Holds the registered subsystems keyed by system ID and hands them out in
//! priority order. Every registration gets a sequence number; subsystems with
//! equal priority are ordered by it, so iteration order never depends on
//! hash map layout.

use crate::error::StatError;
use crate::subsystem::Subsystem;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::info;

struct Entry {
    subsystem: Arc<dyn Subsystem>,
    sequence: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    next_sequence: u64,
}

/// Thread-safe registry of subsystems.
///
/// # Examples
///
/// ```rust
/// use actorstat::{StaticSubsystem, SubsystemOutput, SubsystemRegistry};
/// use std::sync::Arc;
///
/// let registry = SubsystemRegistry::new();
/// registry
///     .register(Arc::new(StaticSubsystem::new("buffs", 10, SubsystemOutput::new("buffs"))))
///     .unwrap();
/// registry
///     .register(Arc::new(StaticSubsystem::new("gear", 50, SubsystemOutput::new("gear"))))
///     .unwrap();
///
/// let ids: Vec<String> = registry
///     .by_priority()
///     .iter()
///     .map(|s| s.system_id().to_string())
///     .collect();
/// assert_eq!(ids, vec!["gear", "buffs"]);
///
/// // IDs are unique.
/// assert!(registry
///     .register(Arc::new(StaticSubsystem::new("gear", 1, SubsystemOutput::new("gear"))))
///     .is_err());
/// ```
#[derive(Default)]
pub struct SubsystemRegistry {
    inner: RwLock<Inner>,
}

impl SubsystemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subsystem under its system ID.
    ///
    /// # Errors
    ///
    /// * `StatError::InvalidInput` if the ID is blank
    /// * `StatError::DuplicateSubsystem` if the ID is taken
    pub fn register(&self, subsystem: Arc<dyn Subsystem>) -> Result<(), StatError> {
        let id = subsystem.system_id().to_string();
        if id.trim().is_empty() {
            return Err(StatError::InvalidInput(
                "subsystem ID cannot be empty".to_string(),
            ));
        }

        let mut inner = self.inner.write();
        if inner.entries.contains_key(&id) {
            return Err(StatError::DuplicateSubsystem(id));
        }
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        info!(system = %id, priority = subsystem.priority(), "registered subsystem");
        inner.entries.insert(
            id,
            Entry {
                subsystem,
                sequence,
            },
        );
        Ok(())
    }

    /// Remove a subsystem and return it.
    pub fn unregister(&self, system_id: &str) -> Result<Arc<dyn Subsystem>, StatError> {
        let removed = self.inner.write().entries.remove(system_id);
        match removed {
            Some(entry) => {
                info!(system = %system_id, "unregistered subsystem");
                Ok(entry.subsystem)
            }
            None => Err(StatError::SubsystemNotFound(system_id.to_string())),
        }
    }

    pub fn get(&self, system_id: &str) -> Option<Arc<dyn Subsystem>> {
        self.inner
            .read()
            .entries
            .get(system_id)
            .map(|entry| Arc::clone(&entry.subsystem))
    }

    pub fn contains(&self, system_id: &str) -> bool {
        self.inner.read().entries.contains_key(system_id)
    }

    /// All subsystems in registration order.
    pub fn all(&self) -> Vec<Arc<dyn Subsystem>> {
        let inner = self.inner.read();
        let mut entries: Vec<&Entry> = inner.entries.values().collect();
        entries.sort_by_key(|entry| entry.sequence);
        entries
            .into_iter()
            .map(|entry| Arc::clone(&entry.subsystem))
            .collect()
    }

    /// All subsystems by descending priority, ties by registration order.
    ///
    /// This is the order the aggregator calls `contribute` in.
    pub fn by_priority(&self) -> Vec<Arc<dyn Subsystem>> {
        let inner = self.inner.read();
        let mut entries: Vec<(i64, u64, &Arc<dyn Subsystem>)> = inner
            .entries
            .values()
            .map(|entry| (entry.subsystem.priority(), entry.sequence, &entry.subsystem))
            .collect();
        entries.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        entries
            .into_iter()
            .map(|(_, _, subsystem)| Arc::clone(subsystem))
            .collect()
    }

    /// Subsystems whose priority lies in `min..=max`, in priority order.
    pub fn by_priority_range(&self, min: i64, max: i64) -> Vec<Arc<dyn Subsystem>> {
        self.by_priority()
            .into_iter()
            .filter(|subsystem| (min..=max).contains(&subsystem.priority()))
            .collect()
    }

    /// Registered IDs, sorted.
    pub fn system_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.read().entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of subsystems per priority value.
    pub fn priority_distribution(&self) -> BTreeMap<i64, usize> {
        let mut distribution = BTreeMap::new();
        for entry in self.inner.read().entries.values() {
            *distribution.entry(entry.subsystem.priority()).or_insert(0) += 1;
        }
        distribution
    }

    pub fn highest_priority(&self) -> Option<i64> {
        self.priority_distribution().keys().next_back().copied()
    }

    pub fn lowest_priority(&self) -> Option<i64> {
        self.priority_distribution().keys().next().copied()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// Remove every subsystem. Sequence numbers keep counting.
    pub fn clear(&self) {
        self.inner.write().entries.clear();
    }
}
