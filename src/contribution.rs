//! Contribution value objects.
//!
//! Subsystems describe their effect on an actor as plain data: stat
//! contributions tagged with a [`Bucket`], and cap contributions tagged with
//! a [`CapMode`] and the [`Layer`] they apply to. Both are produced fresh on
//! every resolution and never stored by the engine.

use crate::bucket::Bucket;
use crate::caps::{CapMode, Layer};
use crate::dimension::Dimension;
use crate::error::StatError;
use serde::{Deserialize, Serialize};

/// One proposed adjustment to a stat dimension.
///
/// # Examples
///
/// ```rust
/// use actorstat::{Bucket, Contribution};
///
/// let c = Contribution::new("equipment", "atk", Bucket::Flat, 25.0).with_priority(10);
/// assert_eq!(c.dimension.as_str(), "atk");
/// assert_eq!(c.priority, 10);
/// assert!(c.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub dimension: Dimension,
    pub bucket: Bucket,
    pub value: f64,
    pub system: String,
    #[serde(default)]
    pub priority: i64,
}

impl Contribution {
    /// Create a contribution with priority `0`.
    pub fn new(
        system: impl Into<String>,
        dimension: impl Into<Dimension>,
        bucket: Bucket,
        value: f64,
    ) -> Self {
        Self {
            dimension: dimension.into(),
            bucket,
            value,
            system: system.into(),
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Reject blank names and non-finite values.
    pub fn validate(&self) -> Result<(), StatError> {
        if self.dimension.is_blank() {
            return Err(StatError::EmptyDimension);
        }
        if self.system.trim().is_empty() {
            return Err(StatError::InvalidInput(format!(
                "contribution to {} has no system",
                self.dimension
            )));
        }
        if !self.value.is_finite() {
            return Err(StatError::InvalidInput(format!(
                "contribution to {} from {} is not finite",
                self.dimension, self.system
            )));
        }
        Ok(())
    }
}

/// One proposed bound on a stat dimension, scoped to a layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapContribution {
    pub system: String,
    pub dimension: Dimension,
    pub mode: CapMode,
    pub value: f64,
    #[serde(default)]
    pub priority: i64,
    pub scope: Layer,
    /// Realm the cap was issued for, if any. Carried for auditing only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl CapContribution {
    pub fn new(
        system: impl Into<String>,
        dimension: impl Into<Dimension>,
        mode: CapMode,
        value: f64,
        priority: i64,
        scope: Layer,
    ) -> Self {
        Self {
            system: system.into(),
            dimension: dimension.into(),
            mode,
            value,
            priority,
            scope,
            realm: None,
            tags: Vec::new(),
        }
    }

    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Reject blank names and non-finite values.
    pub fn validate(&self) -> Result<(), StatError> {
        if self.dimension.is_blank() {
            return Err(StatError::EmptyDimension);
        }
        if self.system.trim().is_empty() {
            return Err(StatError::InvalidInput(format!(
                "cap on {} has no system",
                self.dimension
            )));
        }
        if !self.value.is_finite() {
            return Err(StatError::InvalidInput(format!(
                "cap on {} from {} is not finite",
                self.dimension, self.system
            )));
        }
        Ok(())
    }
}

/// Metadata a subsystem attaches to its output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubsystemMeta {
    pub system: String,
    #[serde(default)]
    pub version: i64,
}

/// Everything one subsystem contributes to one resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubsystemOutput {
    #[serde(default)]
    pub primary: Vec<Contribution>,
    #[serde(default)]
    pub derived: Vec<Contribution>,
    #[serde(default)]
    pub caps: Vec<CapContribution>,
    #[serde(default)]
    pub meta: SubsystemMeta,
}

impl SubsystemOutput {
    /// Create an empty output tagged with the producing system.
    pub fn new(system: impl Into<String>) -> Self {
        Self {
            meta: SubsystemMeta {
                system: system.into(),
                version: 0,
            },
            ..Self::default()
        }
    }

    pub fn with_primary(mut self, contribution: Contribution) -> Self {
        self.primary.push(contribution);
        self
    }

    pub fn with_derived(mut self, contribution: Contribution) -> Self {
        self.derived.push(contribution);
        self
    }

    pub fn with_cap(mut self, cap: CapContribution) -> Self {
        self.caps.push(cap);
        self
    }

    /// `true` if the output carries no contributions of any kind.
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.derived.is_empty() && self.caps.is_empty()
    }

    /// Validate every contribution. The first failure rejects the output.
    pub fn validate(&self) -> Result<(), StatError> {
        for contribution in self.primary.iter().chain(&self.derived) {
            contribution.validate()?;
        }
        for cap in &self.caps {
            cap.validate()?;
        }
        Ok(())
    }
}
