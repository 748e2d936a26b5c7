//! Resolved actor snapshots.
//!
//! A `Snapshot` is the immutable result of one aggregation: final primary
//! and derived values, the caps that were applied, the actor version it was
//! computed for and when. Snapshots are replaced, never mutated.

use crate::caps::EffectiveCaps;
use crate::dimension::Dimension;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Final stats of one actor.
///
/// Maps are ordered by dimension, so two snapshots built from the same
/// inputs serialize identically apart from `created_at`.
///
/// # Examples
///
/// ```rust
/// use actorstat::{Dimension, Snapshot};
///
/// let mut snapshot = Snapshot::new("hero", 3);
/// snapshot.primary.insert(Dimension::new("hp"), 120.0);
///
/// assert_eq!(snapshot.primary_value("hp"), Some(120.0));
/// assert_eq!(snapshot.value("hp"), Some(120.0));
/// assert_eq!(snapshot.value("mana"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub actor_id: String,
    pub primary: BTreeMap<Dimension, f64>,
    pub derived: BTreeMap<Dimension, f64>,
    pub caps_used: EffectiveCaps,
    /// Actor version the snapshot was computed for.
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    /// An empty snapshot stamped with the current time.
    pub fn new(actor_id: impl Into<String>, version: i64) -> Self {
        Self {
            actor_id: actor_id.into(),
            primary: BTreeMap::new(),
            derived: BTreeMap::new(),
            caps_used: EffectiveCaps::new(),
            version,
            created_at: Utc::now(),
        }
    }

    pub fn primary_value(&self, dimension: &str) -> Option<f64> {
        self.primary.get(dimension).copied()
    }

    pub fn derived_value(&self, dimension: &str) -> Option<f64> {
        self.derived.get(dimension).copied()
    }

    /// Look a dimension up in the primary values, then the derived values.
    pub fn value(&self, dimension: &str) -> Option<f64> {
        self.primary_value(dimension)
            .or_else(|| self.derived_value(dimension))
    }

    /// `true` if both snapshots hold the same values, ignoring `created_at`.
    pub fn same_values(&self, other: &Snapshot) -> bool {
        self.actor_id == other.actor_id
            && self.version == other.version
            && self.primary == other.primary
            && self.derived == other.derived
            && self.caps_used == other.caps_used
    }
}
