//! Primary and derived stat sets used by the formula pipeline.
//!
//! `PrimaryStats` is the read-only input (strength, agility, ...).
//! `DerivedStats` is the output: a versioned value object. Every `set_stat`
//! increments its version and refreshes its timestamp, so callers can detect
//! a newer result by comparing versions instead of holding a lock.

use crate::dimension::Dimension;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Input stats for formula evaluation.
///
/// # Examples
///
/// ```rust
/// use actorstat::PrimaryStats;
///
/// let primary = PrimaryStats::new().with("str", 12.0).with("agi", 8.0);
/// assert_eq!(primary.get("str"), Some(12.0));
/// assert_eq!(primary.get("int"), None);
/// assert_eq!(primary.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrimaryStats {
    values: BTreeMap<Dimension, f64>,
}

impl PrimaryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, stat: impl Into<Dimension>, value: f64) -> Self {
        self.set(stat, value);
        self
    }

    pub fn set(&mut self, stat: impl Into<Dimension>, value: f64) {
        self.values.insert(stat.into(), value);
    }

    pub fn get(&self, stat: &str) -> Option<f64> {
        self.values.get(stat).copied()
    }

    pub fn contains(&self, stat: &str) -> bool {
        self.values.contains_key(stat)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Dimension, f64)> {
        self.values.iter().map(|(stat, value)| (stat, *value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<D: Into<Dimension>> FromIterator<(D, f64)> for PrimaryStats {
    fn from_iter<I: IntoIterator<Item = (D, f64)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(stat, value)| (stat.into(), value))
                .collect(),
        }
    }
}

/// Versioned output of the formula pipeline.
///
/// # Examples
///
/// ```rust
/// use actorstat::DerivedStats;
///
/// let mut derived = DerivedStats::new();
/// assert_eq!(derived.version(), 0);
///
/// derived.set_stat("atk", 42.0);
/// assert_eq!(derived.get_stat("atk"), Some(42.0));
/// assert_eq!(derived.version(), 1);
///
/// // Clones are independent.
/// let mut next = derived.clone();
/// next.set_stat("atk", 50.0);
/// assert_eq!(derived.get_stat("atk"), Some(42.0));
/// assert_eq!(next.version(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedStats {
    values: BTreeMap<Dimension, f64>,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Default for DerivedStats {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            values: BTreeMap::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

impl DerivedStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a stat, bumping the version and the update timestamp.
    pub fn set_stat(&mut self, stat: impl Into<Dimension>, value: f64) {
        self.values.insert(stat.into(), value);
        self.touch();
    }

    pub fn get_stat(&self, stat: &str) -> Option<f64> {
        self.values.get(stat).copied()
    }

    pub fn all_stats(&self) -> &BTreeMap<Dimension, f64> {
        &self.values
    }

    /// Bump the version and the update timestamp without changing values.
    pub fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
