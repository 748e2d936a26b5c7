//! Combiner registry: per-dimension merge rules.
//!
//! A [`MergeRule`] decides how a dimension's contributions are combined
//! (bucket pipeline or a plain [`Operator`]) and which range is applied when
//! no layer caps the dimension. Dimensions without a registered rule use
//! [`MergeRule::default`].
//!
//! Rules can be loaded from and saved to a JSON document:
//!
//! ```json
//! {
//!   "rules": {
//!     "hp_max": { "use_pipeline": true, "clamp_default": { "min": 1, "max": 500000 } },
//!     "move_speed": { "use_pipeline": false, "operator": "MAX" }
//!   }
//! }
//! ```

use crate::bucket::{combine_contributions, Operator};
use crate::caps::Caps;
use crate::contribution::Contribution;
use crate::dimension::Dimension;
use crate::error::StatError;
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::debug;

/// Default clamp range for dimensions without a cap.
pub const DEFAULT_CLAMP: Caps = Caps {
    min: 0.0,
    max: 1_000_000.0,
};

fn default_use_pipeline() -> bool {
    true
}

fn default_clamp() -> Caps {
    DEFAULT_CLAMP
}

/// Accepts `null`, `""` or an operator name.
fn operator_or_empty<'de, D>(deserializer: D) -> Result<Option<Operator>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(name) => name.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// How one dimension's contributions are merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRule {
    /// Combine through the bucket pipeline. When `false`, `operator` is used.
    #[serde(default = "default_use_pipeline")]
    pub use_pipeline: bool,
    #[serde(
        default,
        deserialize_with = "operator_or_empty",
        skip_serializing_if = "Option::is_none"
    )]
    pub operator: Option<Operator>,
    /// Range applied when the dimension has no effective cap.
    #[serde(default = "default_clamp")]
    pub clamp_default: Caps,
}

impl Default for MergeRule {
    fn default() -> Self {
        Self {
            use_pipeline: true,
            operator: None,
            clamp_default: DEFAULT_CLAMP,
        }
    }
}

impl MergeRule {
    /// A pipeline rule with a custom default clamp.
    pub fn pipeline(clamp_default: Caps) -> Self {
        Self {
            use_pipeline: true,
            operator: None,
            clamp_default,
        }
    }

    /// A rule that folds values with `operator` instead of the pipeline.
    pub fn operator(operator: Operator, clamp_default: Caps) -> Self {
        Self {
            use_pipeline: false,
            operator: Some(operator),
            clamp_default,
        }
    }

    pub fn validate(&self, dimension: &str) -> Result<(), StatError> {
        if !self.use_pipeline && self.operator.is_none() {
            return Err(StatError::InvalidRule {
                dimension: dimension.to_string(),
                reason: "operator is required when use_pipeline is false".to_string(),
            });
        }
        Caps::validated(dimension, self.clamp_default.min, self.clamp_default.max)?;
        Ok(())
    }

    /// Combine contributions for one dimension according to this rule.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use actorstat::{Bucket, Caps, Contribution, MergeRule, Operator};
    ///
    /// let contributions = vec![
    ///     Contribution::new("a", "speed", Bucket::Flat, 4.0),
    ///     Contribution::new("b", "speed", Bucket::Flat, 7.0),
    /// ];
    /// assert_eq!(MergeRule::default().combine(&contributions), 11.0);
    ///
    /// let max_rule = MergeRule::operator(Operator::Max, Caps::new(0.0, 100.0));
    /// assert_eq!(max_rule.combine(&contributions), 7.0);
    /// ```
    pub fn combine(&self, contributions: &[Contribution]) -> f64 {
        match (self.use_pipeline, self.operator) {
            (false, Some(operator)) => {
                let values: Vec<f64> = contributions.iter().map(|c| c.value).collect();
                operator.combine(&values)
            }
            _ => combine_contributions(contributions),
        }
    }
}

/// Serialized form of a combiner registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombinerConfig {
    #[serde(default)]
    pub rules: BTreeMap<Dimension, MergeRule>,
}

impl CombinerConfig {
    pub fn validate(&self) -> Result<(), StatError> {
        for (dimension, rule) in &self.rules {
            if dimension.is_blank() {
                return Err(StatError::EmptyDimension);
            }
            rule.validate(dimension.as_str())?;
        }
        Ok(())
    }
}

/// Thread-safe map from dimension to [`MergeRule`].
///
/// # Examples
///
/// ```rust
/// use actorstat::{Caps, CombinerRegistry, MergeRule};
///
/// let registry = CombinerRegistry::new();
/// registry
///     .set_rule("hp_max", MergeRule::pipeline(Caps::new(1.0, 50_000.0)))
///     .unwrap();
///
/// assert_eq!(registry.get_rule("hp_max").clamp_default.max, 50_000.0);
/// // Unknown dimensions fall back to the default rule.
/// assert_eq!(registry.get_rule("mana"), MergeRule::default());
/// ```
#[derive(Debug, Default)]
pub struct CombinerRegistry {
    rules: RwLock<HashMap<Dimension, MergeRule>>,
}

impl CombinerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a validated config.
    pub fn from_config(config: &CombinerConfig) -> Result<Self, StatError> {
        let registry = Self::new();
        registry.apply_config(config)?;
        Ok(registry)
    }

    /// The rule for a dimension, or the default rule if none is registered.
    pub fn get_rule(&self, dimension: &str) -> MergeRule {
        self.rule(dimension).unwrap_or_default()
    }

    /// The explicitly registered rule for a dimension.
    pub fn rule(&self, dimension: &str) -> Option<MergeRule> {
        self.rules.read().get(dimension).cloned()
    }

    /// Register or replace a rule.
    pub fn set_rule(
        &self,
        dimension: impl Into<Dimension>,
        rule: MergeRule,
    ) -> Result<(), StatError> {
        let dimension = dimension.into();
        if dimension.is_blank() {
            return Err(StatError::EmptyDimension);
        }
        rule.validate(dimension.as_str())?;
        self.rules.write().insert(dimension, rule);
        Ok(())
    }

    pub fn remove_rule(&self, dimension: &str) -> Option<MergeRule> {
        self.rules.write().remove(dimension)
    }

    pub fn has_rule(&self, dimension: &str) -> bool {
        self.rules.read().contains_key(dimension)
    }

    /// Dimensions with a registered rule, sorted.
    pub fn dimensions(&self) -> Vec<Dimension> {
        let mut dimensions: Vec<Dimension> = self.rules.read().keys().cloned().collect();
        dimensions.sort();
        dimensions
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }

    pub fn clear(&self) {
        self.rules.write().clear();
    }

    /// Re-validate every registered rule.
    pub fn validate(&self) -> Result<(), StatError> {
        self.to_config().validate()
    }

    /// Snapshot of the registered rules.
    pub fn to_config(&self) -> CombinerConfig {
        CombinerConfig {
            rules: self
                .rules
                .read()
                .iter()
                .map(|(dimension, rule)| (dimension.clone(), rule.clone()))
                .collect(),
        }
    }

    /// Merge every rule of `config` into the registry.
    ///
    /// The whole config is validated first; on any error nothing is applied.
    pub fn apply_config(&self, config: &CombinerConfig) -> Result<usize, StatError> {
        config.validate()?;
        let mut rules = self.rules.write();
        for (dimension, rule) in &config.rules {
            rules.insert(dimension.clone(), rule.clone());
        }
        debug!(count = config.rules.len(), "loaded merge rules");
        Ok(config.rules.len())
    }

    /// Load rules from a JSON document. All-or-nothing.
    pub fn load_from_json(&self, json: &str) -> Result<usize, StatError> {
        let config: CombinerConfig = serde_json::from_str(json)?;
        self.apply_config(&config)
    }

    pub fn load_from_file(&self, path: impl AsRef<Path>) -> Result<usize, StatError> {
        let json = std::fs::read_to_string(path)?;
        self.load_from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, StatError> {
        Ok(serde_json::to_string_pretty(&self.to_config())?)
    }

    /// Write the rules as pretty JSON, creating parent directories.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), StatError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::Bucket;

    #[test]
    fn test_default_rule() {
        let rule = MergeRule::default();
        assert!(rule.use_pipeline);
        assert_eq!(rule.operator, None);
        assert_eq!(rule.clamp_default, Caps::new(0.0, 1_000_000.0));
    }

    #[test]
    fn test_set_rule_validation() {
        let registry = CombinerRegistry::new();
        let bad = MergeRule {
            use_pipeline: false,
            operator: None,
            clamp_default: DEFAULT_CLAMP,
        };
        assert!(matches!(
            registry.set_rule("hp", bad),
            Err(StatError::InvalidRule { .. })
        ));
        assert!(matches!(
            registry.set_rule("hp", MergeRule::pipeline(Caps::new(5.0, 1.0))),
            Err(StatError::InvalidCaps { .. })
        ));
        assert_eq!(
            registry.set_rule("", MergeRule::default()),
            Err(StatError::EmptyDimension)
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_rule_crud() {
        let registry = CombinerRegistry::new();
        registry
            .set_rule("speed", MergeRule::operator(Operator::Max, DEFAULT_CLAMP))
            .unwrap();
        registry.set_rule("atk", MergeRule::default()).unwrap();
        assert!(registry.has_rule("speed"));
        assert_eq!(
            registry.dimensions(),
            vec![Dimension::new("atk"), Dimension::new("speed")]
        );
        assert!(registry.remove_rule("speed").is_some());
        assert!(registry.remove_rule("speed").is_none());
        assert_eq!(registry.len(), 1);
        assert!(registry.validate().is_ok());
        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_operator_rule_combines() {
        let rule = MergeRule::operator(Operator::Min, DEFAULT_CLAMP);
        let contributions = vec![
            Contribution::new("a", "x", Bucket::Mult, 3.0),
            Contribution::new("b", "x", Bucket::Flat, 2.0),
        ];
        // Buckets are ignored by operator rules.
        assert_eq!(rule.combine(&contributions), 2.0);
    }

    #[test]
    fn test_load_from_json() {
        let registry = CombinerRegistry::new();
        let json = r#"{
            "rules": {
                "hp_max": {"use_pipeline": true, "operator": "", "clamp_default": {"min": 1, "max": 500}},
                "speed": {"use_pipeline": false, "operator": "MAX"}
            }
        }"#;
        assert_eq!(registry.load_from_json(json).unwrap(), 2);
        assert_eq!(registry.get_rule("hp_max").clamp_default, Caps::new(1.0, 500.0));
        let speed = registry.get_rule("speed");
        assert_eq!(speed.operator, Some(Operator::Max));
        assert_eq!(speed.clamp_default, DEFAULT_CLAMP);
    }

    #[test]
    fn test_load_is_all_or_nothing() {
        let registry = CombinerRegistry::new();
        let json = r#"{
            "rules": {
                "atk": {"use_pipeline": true},
                "speed": {"use_pipeline": false}
            }
        }"#;
        assert!(registry.load_from_json(json).is_err());
        assert!(registry.is_empty());

        let bad_operator = r#"{"rules": {"atk": {"use_pipeline": false, "operator": "POW"}}}"#;
        assert!(matches!(
            registry.load_from_json(bad_operator),
            Err(StatError::Config(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("combiner.json");

        let registry = CombinerRegistry::new();
        registry
            .set_rule("crit", MergeRule::operator(Operator::Sum, Caps::new(0.0, 1.0)))
            .unwrap();
        registry.save_to_file(&path).unwrap();

        let loaded = CombinerRegistry::new();
        assert_eq!(loaded.load_from_file(&path).unwrap(), 1);
        assert_eq!(loaded.get_rule("crit"), registry.get_rule("crit"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = CombinerRegistry::new();
        assert!(matches!(
            registry.load_from_file(dir.path().join("absent.json")),
            Err(StatError::Io(_))
        ));
    }
}
