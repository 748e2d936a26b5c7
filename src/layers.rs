//! Cap layer registry.
//!
//! Holds the ordered list of authority layers that take part in cap
//! resolution and the policy used to combine them. Defaults to every layer
//! (`REALM, WORLD, EVENT, GUILD, TOTAL`) with the `intersect` policy.
//!
//! Serialized form:
//!
//! ```json
//! { "order": ["REALM", "WORLD", "TOTAL"], "across_policy": "intersect" }
//! ```

use crate::caps::{AcrossLayerPolicy, Layer};
use crate::error::StatError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Layer order and across-layer policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerConfig {
    #[serde(default = "default_order")]
    pub order: Vec<Layer>,
    #[serde(default)]
    pub across_policy: AcrossLayerPolicy,
}

fn default_order() -> Vec<Layer> {
    Layer::ALL.to_vec()
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            order: default_order(),
            across_policy: AcrossLayerPolicy::default(),
        }
    }
}

impl LayerConfig {
    /// The order must be non-empty and free of duplicates.
    pub fn validate(&self) -> Result<(), StatError> {
        validate_order(&self.order)
    }
}

fn validate_order(order: &[Layer]) -> Result<(), StatError> {
    if order.is_empty() {
        return Err(StatError::InvalidInput(
            "layer order cannot be empty".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for layer in order {
        if !seen.insert(*layer) {
            return Err(StatError::InvalidInput(format!(
                "duplicate layer in order: {layer}"
            )));
        }
    }
    Ok(())
}

/// Thread-safe holder of the [`LayerConfig`].
///
/// # Examples
///
/// ```rust
/// use actorstat::{AcrossLayerPolicy, CapLayerRegistry, Layer};
///
/// let registry = CapLayerRegistry::new();
/// assert_eq!(registry.layer_order().len(), 5);
/// assert_eq!(registry.across_layer_policy(), AcrossLayerPolicy::Intersect);
///
/// registry.set_layer_order(vec![Layer::World, Layer::Total]).unwrap();
/// assert_eq!(registry.layer_index(Layer::Total), Some(1));
/// assert!(!registry.contains_layer(Layer::Guild));
///
/// // Duplicates are rejected and leave the order untouched.
/// assert!(registry.set_layer_order(vec![Layer::World, Layer::World]).is_err());
/// assert_eq!(registry.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct CapLayerRegistry {
    config: RwLock<LayerConfig>,
}

impl CapLayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: LayerConfig) -> Result<Self, StatError> {
        config.validate()?;
        Ok(Self {
            config: RwLock::new(config),
        })
    }

    pub fn layer_order(&self) -> Vec<Layer> {
        self.config.read().order.clone()
    }

    pub fn across_layer_policy(&self) -> AcrossLayerPolicy {
        self.config.read().across_policy
    }

    /// Replace the layer order.
    pub fn set_layer_order(&self, order: Vec<Layer>) -> Result<(), StatError> {
        validate_order(&order)?;
        debug!(?order, "layer order updated");
        self.config.write().order = order;
        Ok(())
    }

    /// Replace the layer order from layer names.
    pub fn set_layer_order_names<S: AsRef<str>>(&self, names: &[S]) -> Result<(), StatError> {
        let order = names
            .iter()
            .map(|name| name.as_ref().parse::<Layer>())
            .collect::<Result<Vec<_>, _>>()?;
        self.set_layer_order(order)
    }

    pub fn set_across_layer_policy(&self, policy: AcrossLayerPolicy) {
        self.config.write().across_policy = policy;
    }

    /// Position of `layer` in the order.
    pub fn layer_index(&self, layer: Layer) -> Option<usize> {
        self.config.read().order.iter().position(|l| *l == layer)
    }

    pub fn contains_layer(&self, layer: Layer) -> bool {
        self.config.read().order.contains(&layer)
    }

    pub fn len(&self) -> usize {
        self.config.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.config.read().order.is_empty()
    }

    /// Restore the default order and policy.
    pub fn reset(&self) {
        *self.config.write() = LayerConfig::default();
    }

    pub fn validate(&self) -> Result<(), StatError> {
        self.config.read().validate()
    }

    pub fn to_config(&self) -> LayerConfig {
        self.config.read().clone()
    }

    /// Replace order and policy. The config is validated before anything
    /// changes.
    pub fn apply_config(&self, config: LayerConfig) -> Result<(), StatError> {
        config.validate()?;
        *self.config.write() = config;
        Ok(())
    }

    pub fn load_from_json(&self, json: &str) -> Result<(), StatError> {
        let config: LayerConfig = serde_json::from_str(json)?;
        self.apply_config(config)
    }

    pub fn load_from_file(&self, path: impl AsRef<Path>) -> Result<(), StatError> {
        let json = std::fs::read_to_string(path)?;
        self.load_from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, StatError> {
        Ok(serde_json::to_string_pretty(&self.to_config())?)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), StatError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
