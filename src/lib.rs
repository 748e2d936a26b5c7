//! # actorstat - Deterministic Actor Stat Aggregation Engine
//!
//! Computes an actor's final stats (HP, attack, crit chance, ...) from many
//! independent, pluggable contributors called *subsystems*: equipment,
//! buffs, cultivation, guild bonuses and so on.
//!
//! - **Deterministic**: the same subsystems and actor always produce the
//!   same snapshot, regardless of registration or map iteration order
//! - **Hardcode-free**: no built-in stat names; dimensions are plain strings
//! - **Layered caps**: min/max limits scoped to authority layers and folded
//!   with per-mode semantics
//! - **Cached**: snapshots are cached per actor with a TTL
//!
//! ## Core Concepts
//!
//! ### Contribution pipeline
//!
//! ```text
//! [Subsystem] → [SubsystemOutput] → [Aggregator] → [Snapshot]
//!                  │                    │
//!                  │ contributions      ├─ bucket pipeline / merge operator
//!                  │ cap contributions  └─ effective caps (per layer, across layers)
//! ```
//!
//! 1. **Buckets** combine a dimension's contributions in a fixed order:
//!    `FLAT → MULT → POST_ADD → OVERRIDE` (plus the optional
//!    `EXPONENTIAL`, `LOGARITHMIC`, `CONDITIONAL` stages)
//! 2. **Caps** are folded within each layer by priority and cap mode, then
//!    combined across layers by `intersect` or `union`
//! 3. **Snapshots** hold the clamped result and the caps that were applied
//!
//! ### Formula pipeline
//!
//! A separate, independent pipeline derives stats from a set of primary
//! stats with declared formulas, evaluated in dependency order
//! ([`FormulaPipeline`], [`StatResolver`]).
//!
//! ## Example
//!
//! ```rust
//! use actorstat::*;
//! use std::sync::Arc;
//!
//! let subsystems = Arc::new(SubsystemRegistry::new());
//! subsystems
//!     .register(Arc::new(StaticSubsystem::new(
//!         "equipment",
//!         100,
//!         SubsystemOutput::new("equipment")
//!             .with_primary(Contribution::new("equipment", "hp", Bucket::Flat, 100.0))
//!             .with_primary(Contribution::new("equipment", "hp", Bucket::Mult, 1.5))
//!             .with_cap(CapContribution::new(
//!                 "equipment",
//!                 "hp",
//!                 CapMode::HardMax,
//!                 120.0,
//!                 0,
//!                 Layer::World,
//!             )),
//!     )))
//!     .unwrap();
//!
//! let layers = Arc::new(CapLayerRegistry::new());
//! let aggregator = Aggregator::new(
//!     Arc::new(CombinerRegistry::new()),
//!     Arc::new(CapsProvider::new(layers)),
//!     subsystems,
//!     None,
//! );
//!
//! let snapshot = aggregator.resolve(&Actor::new("hero", 1)).unwrap();
//! assert_eq!(snapshot.primary_value("hp"), Some(120.0)); // 100 * 1.5, capped
//! ```
//!
//! ## Modules
//!
//! - [`dimension`] - Stat name type
//! - [`bucket`] - Buckets, merge operators and the bucket pipeline
//! - [`caps`] - Caps, cap modes, layers and cap folding
//! - [`contribution`] - Contributions and subsystem outputs
//! - [`subsystem`] / [`subsystem_registry`] - Contributors and their registry
//! - [`combiner`] - Per-dimension merge rules
//! - [`layers`] / [`caps_provider`] - Layer registry and effective caps
//! - [`cache`] - Snapshot cache
//! - [`aggregator`] - Actor resolution
//! - [`stats`] / [`formula`] / [`resolver`] / [`graph`] - Derived stat formulas
//! - [`config`] - Engine configuration and wiring
//! - [`context`] - Cancellation and pass-through data
//! - [`error`] - Error types

pub mod actor;
pub mod aggregator;
pub mod bucket;
pub mod cache;
pub mod caps;
pub mod caps_provider;
pub mod combiner;
pub mod config;
pub mod context;
pub mod contribution;
pub mod dimension;
pub mod error;
pub mod formula;
pub mod graph;
pub mod layers;
pub mod resolver;
pub mod snapshot;
pub mod stats;
pub mod subsystem;
pub mod subsystem_registry;

// Re-export main types for convenience
pub use actor::Actor;
pub use aggregator::{Aggregator, AggregatorConfig, AggregatorMetrics};
pub use bucket::{combine_contributions, Bucket, Operator};
pub use cache::{Cache, CacheStats, EvictionPolicy, MemoryCache};
pub use caps::{AcrossLayerPolicy, CapMode, Caps, EffectiveCaps, Layer};
pub use caps_provider::{CapStatistics, CapsProvider};
pub use combiner::{CombinerConfig, CombinerRegistry, MergeRule};
pub use config::{CacheConfig, EngineConfig, ServiceSet};
pub use context::ResolveContext;
pub use contribution::{CapContribution, Contribution, SubsystemMeta, SubsystemOutput};
pub use dimension::Dimension;
pub use error::{ErrorCategory, StatError};
pub use formula::{FormulaDefinition, FormulaPipeline, Step, StepKind, Term};
pub use layers::{CapLayerRegistry, LayerConfig};
pub use resolver::{default_stat_bounds, StatResolver};
pub use snapshot::Snapshot;
pub use stats::{DerivedStats, PrimaryStats};
pub use subsystem::{StaticSubsystem, Subsystem};
pub use subsystem_registry::SubsystemRegistry;
