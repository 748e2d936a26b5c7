//! Engine configuration and component wiring.
//!
//! One JSON document describes the whole engine. Every section is optional
//! and falls back to its defaults:
//!
//! ```json
//! {
//!   "layers":   { "order": ["REALM", "WORLD", "TOTAL"], "across_policy": "intersect" },
//!   "combiner": { "rules": { "crit_rate": { "clamp_default": { "min": 0.0, "max": 1.0 } } } },
//!   "cache":    { "enabled": true, "max_size": 1000, "eviction_policy": "allkeys-lru", "snapshot_ttl": "1h" },
//!   "check_actor_version": false,
//!   "formulas": [],
//!   "stat_bounds": { "crit_chance": { "min": 0.0, "max": 1.0 } }
//! }
//! ```
//!
//! [`EngineConfig::build`] turns a config into a [`ServiceSet`] of shared,
//! ready-to-use components.

use crate::aggregator::{default_snapshot_ttl, Aggregator, AggregatorConfig, SnapshotCache};
use crate::cache::{parse_ttl, EvictionPolicy, MemoryCache};
use crate::caps::Caps;
use crate::caps_provider::CapsProvider;
use crate::combiner::{CombinerConfig, CombinerRegistry};
use crate::dimension::Dimension;
use crate::error::StatError;
use crate::formula::FormulaDefinition;
use crate::layers::{CapLayerRegistry, LayerConfig};
use crate::resolver::StatResolver;
use crate::snapshot::Snapshot;
use crate::subsystem_registry::SubsystemRegistry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Default snapshot cache capacity.
pub const DEFAULT_CACHE_SIZE: usize = 1000;

fn default_cache_size() -> usize {
    DEFAULT_CACHE_SIZE
}

fn default_enabled() -> bool {
    true
}

/// Snapshot cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Without a cache every resolution recomputes.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cache_size")]
    pub max_size: usize,
    #[serde(default)]
    pub eviction_policy: EvictionPolicy,
    /// Go-style duration, e.g. `"1h"` or `"90s"`.
    #[serde(default = "default_snapshot_ttl")]
    pub snapshot_ttl: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: DEFAULT_CACHE_SIZE,
            eviction_policy: EvictionPolicy::default(),
            snapshot_ttl: default_snapshot_ttl(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), StatError> {
        if self.max_size == 0 {
            return Err(StatError::Config(
                "cache.max_size must be greater than zero".to_string(),
            ));
        }
        parse_ttl(&self.snapshot_ttl)?;
        Ok(())
    }
}

/// Complete engine configuration.
///
/// # Examples
///
/// ```rust
/// use actorstat::{Actor, EngineConfig};
///
/// let config = EngineConfig::from_json(
///     r#"{ "layers": { "across_policy": "union" }, "cache": { "max_size": 10 } }"#,
/// )
/// .unwrap();
/// assert_eq!(config.cache.max_size, 10);
/// assert_eq!(config.cache.snapshot_ttl, "1h");
///
/// let services = config.build().unwrap();
/// let snapshot = services.aggregator.resolve(&Actor::new("hero", 1)).unwrap();
/// assert!(snapshot.primary.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub layers: LayerConfig,
    #[serde(default)]
    pub combiner: CombinerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    /// See [`AggregatorConfig::check_actor_version`].
    #[serde(default)]
    pub check_actor_version: bool,
    /// Formulas loaded into the [`StatResolver`].
    #[serde(default)]
    pub formulas: Vec<FormulaDefinition>,
    /// Allowed ranges checked by [`StatResolver::validate_stats`].
    #[serde(default)]
    pub stat_bounds: BTreeMap<Dimension, Caps>,
}

impl EngineConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, StatError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, StatError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            StatError::Io(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&content).map_err(|e| match e {
            StatError::Config(reason) => StatError::Config(format!(
                "failed to parse config file '{}': {}",
                path.display(),
                reason
            )),
            other => other,
        })
    }

    pub fn to_json(&self) -> Result<String, StatError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the config as pretty JSON, creating parent directories.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), StatError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Validate every section. Formulas are checked individually here; cycles
    /// surface from [`build`](Self::build).
    pub fn validate(&self) -> Result<(), StatError> {
        self.layers.validate()?;
        self.combiner.validate()?;
        self.cache.validate()?;
        for formula in &self.formulas {
            formula.validate()?;
        }
        for (stat, bounds) in &self.stat_bounds {
            if stat.is_blank() {
                return Err(StatError::EmptyDimension);
            }
            Caps::validated(stat.as_str(), bounds.min, bounds.max)?;
        }
        Ok(())
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            snapshot_ttl: self.cache.snapshot_ttl.clone(),
            check_actor_version: self.check_actor_version,
        }
    }

    /// Construct every component from this config.
    ///
    /// The subsystem registry starts empty; register subsystems on
    /// [`ServiceSet::subsystems`] before resolving.
    pub fn build(&self) -> Result<ServiceSet, StatError> {
        self.validate()?;

        let layers = Arc::new(CapLayerRegistry::from_config(self.layers.clone())?);
        let combiners = Arc::new(CombinerRegistry::from_config(&self.combiner)?);
        let subsystems = Arc::new(SubsystemRegistry::new());
        let caps_provider = Arc::new(CapsProvider::new(Arc::clone(&layers)));
        let resolver = Arc::new(StatResolver::from_formulas(self.formulas.iter().cloned())?);
        for (stat, bounds) in &self.stat_bounds {
            resolver.set_stat_bounds(stat.clone(), *bounds)?;
        }

        let cache: Option<Arc<SnapshotCache>> = if self.cache.enabled {
            let memory: Arc<SnapshotCache> = Arc::new(MemoryCache::<Arc<Snapshot>>::new(
                self.cache.max_size,
                self.cache.eviction_policy,
            ));
            Some(memory)
        } else {
            None
        };

        let aggregator = Arc::new(
            Aggregator::new(
                Arc::clone(&combiners),
                Arc::clone(&caps_provider),
                Arc::clone(&subsystems),
                cache.clone(),
            )
            .with_config(self.aggregator_config())?,
        );

        info!(
            layers = layers.len(),
            rules = combiners.len(),
            formulas = resolver.len(),
            cache = self.cache.enabled,
            "engine services built"
        );

        Ok(ServiceSet {
            layers,
            combiners,
            subsystems,
            caps_provider,
            cache,
            aggregator,
            resolver,
        })
    }
}

/// Shared handles to every engine component.
#[derive(Clone)]
pub struct ServiceSet {
    pub layers: Arc<CapLayerRegistry>,
    pub combiners: Arc<CombinerRegistry>,
    pub subsystems: Arc<SubsystemRegistry>,
    pub caps_provider: Arc<CapsProvider>,
    /// The aggregator's snapshot cache, if enabled.
    pub cache: Option<Arc<SnapshotCache>>,
    pub aggregator: Arc<Aggregator>,
    pub resolver: Arc<StatResolver>,
}

impl std::fmt::Debug for ServiceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceSet")
            .field("layers", &self.layers)
            .field("combiners", &self.combiners)
            .field("subsystems", &self.subsystems.len())
            .field("cache", &self.cache.is_some())
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Actor;
    use crate::bucket::Bucket;
    use crate::caps::{AcrossLayerPolicy, CapMode, Layer};
    use crate::contribution::{CapContribution, Contribution, SubsystemOutput};
    use crate::formula::Term;
    use crate::stats::PrimaryStats;
    use crate::subsystem::StaticSubsystem;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.cache.max_size, 1000);
        assert_eq!(config.cache.eviction_policy, EvictionPolicy::AllkeysLru);
        assert_eq!(config.cache.snapshot_ttl, "1h");
        assert!(config.cache.enabled);
        assert!(!config.check_actor_version);
        assert_eq!(config.layers.order, Layer::ALL.to_vec());
    }

    #[test]
    fn test_invalid_sections_rejected() {
        assert!(matches!(
            EngineConfig::from_json(r#"{"cache": {"snapshot_ttl": "0s"}}"#),
            Err(StatError::InvalidTtl(_))
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{"cache": {"max_size": 0}}"#),
            Err(StatError::Config(_))
        ));
        assert!(EngineConfig::from_json(r#"{"layers": {"order": []}}"#).is_err());
        assert!(matches!(
            EngineConfig::from_json(r#"{"cache": {"eviction_policy": "random"}}"#),
            Err(StatError::Config(_))
        ));
        assert!(matches!(
            EngineConfig::from_json("not json"),
            Err(StatError::Config(_))
        ));
    }

    #[test]
    fn test_build_wires_components() {
        let config = EngineConfig::from_json(
            r#"{
                "layers": { "order": ["REALM", "TOTAL"], "across_policy": "union" },
                "combiner": { "rules": { "atk": { "clamp_default": { "min": 0.0, "max": 50.0 } } } },
                "cache": { "max_size": 2, "eviction_policy": "allkeys-lfu" },
                "formulas": [
                    { "name": "dps", "deps": ["atk"], "steps": [ { "FLAT": { "scaled": { "stat": "atk", "factor": 2.0 } } } ] }
                ]
            }"#,
        )
        .unwrap();
        let services = config.build().unwrap();

        assert_eq!(services.layers.layer_order(), vec![Layer::Realm, Layer::Total]);
        assert_eq!(
            services.caps_provider.across_layer_policy(),
            AcrossLayerPolicy::Union
        );
        assert!(services.combiners.has_rule("atk"));
        assert_eq!(services.resolver.len(), 1);

        services
            .subsystems
            .register(Arc::new(StaticSubsystem::new(
                "gear",
                1,
                SubsystemOutput::new("gear")
                    .with_primary(Contribution::new("gear", "atk", Bucket::Flat, 80.0))
                    .with_primary(Contribution::new("gear", "hp", Bucket::Flat, 80.0)),
            )))
            .unwrap();

        let snapshot = services.aggregator.resolve(&Actor::new("hero", 1)).unwrap();
        // Registered rule without an effective cap: clamp_default applies.
        assert_eq!(snapshot.primary_value("atk"), Some(50.0));
        // No rule and no cap: unclamped.
        assert_eq!(snapshot.primary_value("hp"), Some(80.0));

        let cache = services.cache.as_ref().unwrap();
        assert!(cache.get("hero").is_some());
        assert_eq!(cache.stats().max_size, 2);

        let primary = PrimaryStats::new().with("atk", snapshot.primary_value("atk").unwrap());
        assert_eq!(services.resolver.resolve_stat("dps", &primary).unwrap(), 100.0);
    }

    #[test]
    fn test_build_caps_through_layers() {
        let mut config = EngineConfig::default();
        config.layers.order = vec![Layer::Realm, Layer::World];
        let services = config.build().unwrap();
        services
            .subsystems
            .register(Arc::new(StaticSubsystem::new(
                "realm",
                1,
                SubsystemOutput::new("realm")
                    .with_primary(Contribution::new("realm", "crit", Bucket::Flat, 5.0))
                    .with_cap(CapContribution::new(
                        "realm",
                        "crit",
                        CapMode::HardMax,
                        1.0,
                        0,
                        Layer::Realm,
                    )),
            )))
            .unwrap();
        let snapshot = services.aggregator.resolve(&Actor::new("a", 1)).unwrap();
        assert!(snapshot.primary_value("crit").unwrap() <= 1.0);
    }

    #[test]
    fn test_cache_disabled() {
        let mut config = EngineConfig::default();
        config.cache.enabled = false;
        let services = config.build().unwrap();
        assert!(services.cache.is_none());
        assert!(services.aggregator.cache_stats().is_none());
    }

    #[test]
    fn test_cyclic_formulas_fail_build() {
        let mut config = EngineConfig::default();
        config.formulas = vec![
            FormulaDefinition::new("a").with_dep("b").flat(Term::stat("b")),
            FormulaDefinition::new("b").with_dep("a").flat(Term::stat("a")),
        ];
        assert!(config.validate().is_ok());
        assert!(matches!(config.build(), Err(StatError::Cycle { .. })));
    }

    #[test]
    fn test_stat_bounds_reach_resolver() {
        let config = EngineConfig::from_json(
            r#"{"stat_bounds": {"crit_chance": {"min": 0.0, "max": 1.0}}}"#,
        )
        .unwrap();
        let services = config.build().unwrap();
        assert_eq!(
            services.resolver.stat_bounds("crit_chance"),
            Some(Caps::new(0.0, 1.0))
        );

        assert!(matches!(
            EngineConfig::from_json(r#"{"stat_bounds": {"haste": {"min": 2.0, "max": 1.0}}}"#),
            Err(StatError::InvalidCaps { .. })
        ));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("engine.json");

        let mut config = EngineConfig::default();
        config.cache.eviction_policy = EvictionPolicy::VolatileTtl;
        config.check_actor_version = true;
        config.save_to_file(&path).unwrap();

        let loaded = EngineConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);

        let missing = EngineConfig::from_file(dir.path().join("missing.json"));
        assert!(matches!(missing, Err(StatError::Io(_))));
    }
}
