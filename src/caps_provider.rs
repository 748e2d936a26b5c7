//! Caps provider.
//!
//! Turns the cap contributions of a resolution into effective per-dimension
//! caps, using the layer order and policy of a [`CapLayerRegistry`].
//! Cap contributions scoped to a layer that is not in the order are ignored.

use crate::caps::{combine_across_layers, fold_within_layer, AcrossLayerPolicy, EffectiveCaps, Layer};
use crate::contribution::{CapContribution, SubsystemOutput};
use crate::error::StatError;
use crate::layers::{CapLayerRegistry, LayerConfig};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Summary of how many dimensions each layer caps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapStatistics {
    /// Capped dimensions per layer, for layers in the order.
    pub per_layer: BTreeMap<Layer, usize>,
    /// Dimensions with an effective cap after combining layers.
    pub total_dimensions: usize,
    pub policy: AcrossLayerPolicy,
}

/// Computes effective caps within one layer and across all layers.
///
/// # Examples
///
/// ```rust
/// use actorstat::{CapContribution, CapLayerRegistry, CapMode, Caps, CapsProvider, Layer, SubsystemOutput};
/// use std::sync::Arc;
///
/// let provider = CapsProvider::new(Arc::new(CapLayerRegistry::new()));
/// let output = SubsystemOutput::new("rules")
///     .with_cap(CapContribution::new("rules", "hp", CapMode::Baseline, 100.0, 10, Layer::World))
///     .with_cap(CapContribution::new("rules", "hp", CapMode::HardMin, 10.0, 5, Layer::World))
///     .with_cap(CapContribution::new("rules", "hp", CapMode::Baseline, 80.0, 10, Layer::Guild))
///     .with_cap(CapContribution::new("rules", "hp", CapMode::HardMin, 20.0, 5, Layer::Guild));
///
/// let caps = provider.effective_caps_across_layers(&[output]);
/// assert_eq!(caps["hp"], Caps::new(20.0, 80.0));
/// ```
#[derive(Debug, Clone)]
pub struct CapsProvider {
    layers: Arc<CapLayerRegistry>,
}

impl CapsProvider {
    pub fn new(layers: Arc<CapLayerRegistry>) -> Self {
        Self { layers }
    }

    pub fn layer_registry(&self) -> &Arc<CapLayerRegistry> {
        &self.layers
    }

    fn cap_contributions(outputs: &[SubsystemOutput]) -> impl Iterator<Item = &CapContribution> {
        outputs.iter().flat_map(|output| output.caps.iter())
    }

    /// Effective caps contributed to a single layer.
    ///
    /// # Errors
    ///
    /// `StatError::LayerNotRegistered` if `layer` is not in the layer order.
    pub fn effective_caps_within_layer(
        &self,
        outputs: &[SubsystemOutput],
        layer: Layer,
    ) -> Result<EffectiveCaps, StatError> {
        if !self.layers.contains_layer(layer) {
            return Err(StatError::LayerNotRegistered(layer));
        }
        Ok(fold_within_layer(Self::cap_contributions(outputs), layer))
    }

    /// Effective caps after combining every layer in the order.
    ///
    /// Order and policy are read together, so a concurrent config change
    /// is seen entirely or not at all.
    pub fn effective_caps_across_layers(&self, outputs: &[SubsystemOutput]) -> EffectiveCaps {
        let config = self.layers.to_config();
        Self::across_layers(outputs, &config)
    }

    fn across_layers(outputs: &[SubsystemOutput], config: &LayerConfig) -> EffectiveCaps {
        let per_layer: Vec<EffectiveCaps> = config
            .order
            .iter()
            .map(|&layer| fold_within_layer(Self::cap_contributions(outputs), layer))
            .collect();
        combine_across_layers(&per_layer, config.across_policy)
    }

    pub fn layer_order(&self) -> Vec<Layer> {
        self.layers.layer_order()
    }

    pub fn across_layer_policy(&self) -> AcrossLayerPolicy {
        self.layers.across_layer_policy()
    }

    /// Check that every range is finite and ordered.
    pub fn validate_caps(&self, caps: &EffectiveCaps) -> Result<(), StatError> {
        for (dimension, range) in caps {
            if dimension.is_blank() {
                return Err(StatError::EmptyDimension);
            }
            crate::caps::Caps::validated(dimension.as_str(), range.min, range.max)?;
        }
        Ok(())
    }

    pub fn cap_statistics(&self, outputs: &[SubsystemOutput]) -> CapStatistics {
        let config = self.layers.to_config();
        let per_layer = config
            .order
            .iter()
            .map(|&layer| {
                let count = fold_within_layer(Self::cap_contributions(outputs), layer).len();
                (layer, count)
            })
            .collect();
        CapStatistics {
            per_layer,
            total_dimensions: Self::across_layers(outputs, &config).len(),
            policy: config.across_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::{CapMode, Caps};
    use crate::dimension::Dimension;

    fn output_with(caps: Vec<CapContribution>) -> SubsystemOutput {
        caps.into_iter()
            .fold(SubsystemOutput::new("test"), |out, cap| out.with_cap(cap))
    }

    fn range(dim: &str, min: f64, max: f64, layer: Layer) -> Vec<CapContribution> {
        vec![
            CapContribution::new("test", dim, CapMode::Baseline, max, 10, layer),
            CapContribution::new("test", dim, CapMode::HardMin, min, 5, layer),
        ]
    }

    fn provider() -> CapsProvider {
        CapsProvider::new(Arc::new(CapLayerRegistry::new()))
    }

    #[test]
    fn test_within_layer() {
        let out = output_with(range("hp", 10.0, 100.0, Layer::World));
        let caps = provider()
            .effective_caps_within_layer(&[out], Layer::World)
            .unwrap();
        assert_eq!(caps["hp"], Caps::new(10.0, 100.0));
    }

    #[test]
    fn test_within_unregistered_layer() {
        let layers = Arc::new(CapLayerRegistry::new());
        layers.set_layer_order(vec![Layer::World]).unwrap();
        let provider = CapsProvider::new(layers);
        assert_eq!(
            provider.effective_caps_within_layer(&[], Layer::Guild),
            Err(StatError::LayerNotRegistered(Layer::Guild))
        );
    }

    #[test]
    fn test_across_layers_intersect_and_union() {
        let mut caps = range("hp", 10.0, 100.0, Layer::World);
        caps.extend(range("hp", 20.0, 80.0, Layer::Event));
        let outputs = [output_with(caps)];

        let provider = provider();
        assert_eq!(
            provider.effective_caps_across_layers(&outputs)["hp"],
            Caps::new(20.0, 80.0)
        );

        provider
            .layer_registry()
            .set_across_layer_policy(AcrossLayerPolicy::Union);
        assert_eq!(
            provider.effective_caps_across_layers(&outputs)["hp"],
            Caps::new(10.0, 100.0)
        );
    }

    #[test]
    fn test_layers_outside_order_ignored() {
        let layers = Arc::new(CapLayerRegistry::new());
        layers.set_layer_order(vec![Layer::World]).unwrap();
        let provider = CapsProvider::new(layers);

        let mut caps = range("hp", 10.0, 100.0, Layer::World);
        caps.extend(range("hp", 50.0, 60.0, Layer::Guild));
        let effective = provider.effective_caps_across_layers(&[output_with(caps)]);
        assert_eq!(effective["hp"], Caps::new(10.0, 100.0));
    }

    #[test]
    fn test_config_swap_seen_whole() {
        let mut caps = range("hp", 10.0, 40.0, Layer::World);
        caps.extend(range("hp", 50.0, 90.0, Layer::Event));
        caps.extend(range("hp", 30.0, 60.0, Layer::Guild));
        let outputs = [output_with(caps)];

        // Every order/policy pairing gives a different range; only the two
        // configured pairings may ever be observed.
        let narrow = LayerConfig {
            order: vec![Layer::World, Layer::Guild],
            across_policy: AcrossLayerPolicy::Intersect,
        };
        let wide = LayerConfig {
            order: vec![Layer::Event, Layer::Guild],
            across_policy: AcrossLayerPolicy::Union,
        };
        let allowed = [Caps::new(30.0, 40.0), Caps::new(30.0, 90.0)];

        let provider = provider();
        provider
            .layer_registry()
            .apply_config(narrow.clone())
            .unwrap();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 0..200 {
                    let config = if i % 2 == 0 { &narrow } else { &wide };
                    provider
                        .layer_registry()
                        .apply_config(config.clone())
                        .unwrap();
                }
            });
            for _ in 0..200 {
                let hp = provider.effective_caps_across_layers(&outputs)["hp"];
                assert!(allowed.contains(&hp), "mixed config produced {hp:?}");
            }
        });
    }

    #[test]
    fn test_caps_from_several_outputs_fold_together() {
        let a = output_with(vec![CapContribution::new(
            "a", "hp", CapMode::Baseline, 100.0, 10, Layer::Total,
        )]);
        let b = output_with(vec![CapContribution::new(
            "b", "hp", CapMode::Additive, 25.0, 1, Layer::Total,
        )]);
        let effective = provider().effective_caps_across_layers(&[a, b]);
        assert_eq!(effective["hp"], Caps::fixed(125.0));
    }

    #[test]
    fn test_validate_caps() {
        let provider = provider();
        let mut caps = EffectiveCaps::new();
        caps.insert(Dimension::new("hp"), Caps::new(0.0, 1.0));
        assert!(provider.validate_caps(&caps).is_ok());
        caps.insert(Dimension::new("mp"), Caps::new(2.0, 1.0));
        assert!(provider.validate_caps(&caps).is_err());
    }

    #[test]
    fn test_cap_statistics() {
        let mut caps = range("hp", 10.0, 100.0, Layer::World);
        caps.extend(range("mp", 1.0, 2.0, Layer::World));
        caps.extend(range("hp", 20.0, 80.0, Layer::Guild));
        let stats = provider().cap_statistics(&[output_with(caps)]);
        assert_eq!(stats.per_layer[&Layer::World], 2);
        assert_eq!(stats.per_layer[&Layer::Guild], 1);
        assert_eq!(stats.per_layer[&Layer::Realm], 0);
        assert_eq!(stats.total_dimensions, 2);
        assert_eq!(stats.policy, AcrossLayerPolicy::Intersect);
    }
}
