//! Aggregator: subsystem outputs → capped snapshot.
//!
//! `resolve` runs the whole pipeline for one actor:
//!
//! 1. return the cached snapshot for the actor ID, if any;
//! 2. ask every active subsystem for its output, by descending priority,
//!    skipping subsystems that fail, return nothing or return invalid data;
//! 3. compute effective caps across all layers;
//! 4. combine each primary dimension with its merge rule and clamp it;
//! 5. do the same for derived dimensions;
//! 6. stamp a [`Snapshot`] with the actor version and the current time,
//!    cache it and return it.

use crate::actor::Actor;
use crate::cache::{parse_ttl, Cache, CacheStats};
use crate::caps::EffectiveCaps;
use crate::caps_provider::CapsProvider;
use crate::combiner::CombinerRegistry;
use crate::context::ResolveContext;
use crate::contribution::{Contribution, SubsystemOutput};
use crate::dimension::Dimension;
use crate::error::StatError;
use crate::snapshot::Snapshot;
use crate::subsystem_registry::SubsystemRegistry;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Cache type the aggregator stores snapshots in.
pub type SnapshotCache = dyn Cache<Arc<Snapshot>>;

/// Default snapshot TTL.
pub const DEFAULT_SNAPSHOT_TTL: &str = "1h";

pub(crate) fn default_snapshot_ttl() -> String {
    DEFAULT_SNAPSHOT_TTL.to_string()
}

/// Aggregator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// TTL applied to every cached snapshot.
    #[serde(default = "default_snapshot_ttl")]
    pub snapshot_ttl: String,
    /// Treat a cached snapshot as stale when its version differs from the
    /// actor's current version. Off by default: snapshots are keyed by actor
    /// ID only and must be invalidated explicitly.
    #[serde(default)]
    pub check_actor_version: bool,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            snapshot_ttl: default_snapshot_ttl(),
            check_actor_version: false,
        }
    }
}

impl AggregatorConfig {
    pub fn validate(&self) -> Result<(), StatError> {
        parse_ttl(&self.snapshot_ttl).map(|_| ())
    }
}

/// Counters observed since the aggregator was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregatorMetrics {
    pub requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Subsystems skipped because they failed or returned invalid output.
    pub skipped_subsystems: u64,
    pub failed_resolutions: u64,
}

#[derive(Debug, Default)]
struct Counters {
    requests: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    skipped_subsystems: AtomicU64,
    failed_resolutions: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Resolves actors into snapshots.
///
/// # Examples
///
/// ```rust
/// use actorstat::*;
/// use std::sync::Arc;
///
/// let subsystems = Arc::new(SubsystemRegistry::new());
/// subsystems
///     .register(Arc::new(StaticSubsystem::new(
///         "gear",
///         10,
///         SubsystemOutput::new("gear")
///             .with_primary(Contribution::new("gear", "atk", Bucket::Flat, 10.0))
///             .with_primary(Contribution::new("gear", "atk", Bucket::Mult, 2.0))
///             .with_primary(Contribution::new("gear", "atk", Bucket::PostAdd, 5.0)),
///     )))
///     .unwrap();
///
/// let aggregator = Aggregator::new(
///     Arc::new(CombinerRegistry::new()),
///     Arc::new(CapsProvider::new(Arc::new(CapLayerRegistry::new()))),
///     subsystems,
///     None,
/// );
///
/// let snapshot = aggregator.resolve(&Actor::new("hero", 1)).unwrap();
/// assert_eq!(snapshot.primary_value("atk"), Some(25.0));
/// assert_eq!(snapshot.version, 1);
/// ```
pub struct Aggregator {
    combiners: Arc<CombinerRegistry>,
    caps: Arc<CapsProvider>,
    subsystems: Arc<SubsystemRegistry>,
    cache: Option<Arc<SnapshotCache>>,
    config: AggregatorConfig,
    counters: Counters,
}

impl Aggregator {
    /// Create an aggregator with the default config.
    ///
    /// Without a cache every call recomputes.
    pub fn new(
        combiners: Arc<CombinerRegistry>,
        caps: Arc<CapsProvider>,
        subsystems: Arc<SubsystemRegistry>,
        cache: Option<Arc<SnapshotCache>>,
    ) -> Self {
        Self {
            combiners,
            caps,
            subsystems,
            cache,
            config: AggregatorConfig::default(),
            counters: Counters::default(),
        }
    }

    /// Replace the config after validating it.
    pub fn with_config(mut self, config: AggregatorConfig) -> Result<Self, StatError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn combiners(&self) -> &Arc<CombinerRegistry> {
        &self.combiners
    }

    pub fn caps_provider(&self) -> &Arc<CapsProvider> {
        &self.caps
    }

    pub fn subsystems(&self) -> &Arc<SubsystemRegistry> {
        &self.subsystems
    }

    /// Resolve one actor, serving from cache when possible.
    pub fn resolve(&self, actor: &Actor) -> Result<Arc<Snapshot>, StatError> {
        self.resolve_inner(&ResolveContext::new(), actor)
    }

    /// Like [`Aggregator::resolve`], but rejected up front if `ctx` is
    /// cancelled or past its deadline. The context is not re-checked during
    /// resolution.
    pub fn resolve_with_context(
        &self,
        ctx: &ResolveContext,
        actor: &Actor,
    ) -> Result<Arc<Snapshot>, StatError> {
        if let Err(err) = ctx.check() {
            bump(&self.counters.failed_resolutions);
            return Err(err);
        }
        self.resolve_inner(ctx, actor)
    }

    /// Resolve several actors independently. Failed actors are left out.
    pub fn resolve_batch(&self, actors: &[Actor]) -> Vec<Arc<Snapshot>> {
        self.resolve_batch_with_context(&ResolveContext::new(), actors)
    }

    /// Batch variant of [`Aggregator::resolve_with_context`]. The context is
    /// checked once per actor.
    pub fn resolve_batch_with_context(
        &self,
        ctx: &ResolveContext,
        actors: &[Actor],
    ) -> Vec<Arc<Snapshot>> {
        actors
            .iter()
            .filter_map(|actor| match self.resolve_with_context(ctx, actor) {
                Ok(snapshot) => Some(snapshot),
                Err(err) => {
                    warn!(actor = %actor.id, error = %err, "skipping actor in batch");
                    None
                }
            })
            .collect()
    }

    /// The cached snapshot for an actor ID, without resolving.
    pub fn cached_snapshot(&self, actor_id: &str) -> Option<Arc<Snapshot>> {
        self.cache.as_ref()?.get(actor_id)
    }

    /// Drop the cached snapshot of one actor.
    ///
    /// Returns `Ok(false)` if nothing was cached for it.
    pub fn invalidate_cache(&self, actor_id: &str) -> Result<bool, StatError> {
        let Some(cache) = &self.cache else {
            return Ok(false);
        };
        match cache.delete(actor_id) {
            Ok(()) => {
                debug!(actor = %actor_id, "invalidated snapshot");
                Ok(true)
            }
            Err(StatError::CacheKeyNotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|cache| cache.stats())
    }

    pub fn metrics(&self) -> AggregatorMetrics {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        AggregatorMetrics {
            requests: load(&self.counters.requests),
            cache_hits: load(&self.counters.cache_hits),
            cache_misses: load(&self.counters.cache_misses),
            skipped_subsystems: load(&self.counters.skipped_subsystems),
            failed_resolutions: load(&self.counters.failed_resolutions),
        }
    }

    /// Check the config and every registry the aggregator depends on.
    pub fn validate(&self) -> Result<(), StatError> {
        self.config.validate()?;
        self.combiners.validate()?;
        self.caps.layer_registry().validate()
    }

    fn resolve_inner(
        &self,
        ctx: &ResolveContext,
        actor: &Actor,
    ) -> Result<Arc<Snapshot>, StatError> {
        bump(&self.counters.requests);
        if actor.id.trim().is_empty() {
            bump(&self.counters.failed_resolutions);
            return Err(StatError::InvalidInput("actor ID cannot be empty".to_string()));
        }

        if let Some(snapshot) = self.lookup_cached(actor) {
            bump(&self.counters.cache_hits);
            return Ok(snapshot);
        }
        bump(&self.counters.cache_misses);

        let outputs = self.gather_outputs(ctx, actor);
        let effective_caps = self.caps.effective_caps_across_layers(&outputs);

        let mut caps_used = effective_caps.clone();
        let primary = self.aggregate(
            outputs.iter().flat_map(|output| output.primary.iter()),
            &effective_caps,
            &mut caps_used,
        );
        let derived = self.aggregate(
            outputs.iter().flat_map(|output| output.derived.iter()),
            &effective_caps,
            &mut caps_used,
        );

        let snapshot = Arc::new(Snapshot {
            actor_id: actor.id.clone(),
            primary,
            derived,
            caps_used,
            version: actor.version,
            created_at: Utc::now(),
        });

        if let Some(cache) = &self.cache {
            if let Err(err) = cache.set(&actor.id, Arc::clone(&snapshot), &self.config.snapshot_ttl)
            {
                warn!(actor = %actor.id, error = %err, "failed to cache snapshot");
            }
        }
        Ok(snapshot)
    }

    fn lookup_cached(&self, actor: &Actor) -> Option<Arc<Snapshot>> {
        let snapshot = self.cache.as_ref()?.get(&actor.id)?;
        if self.config.check_actor_version && snapshot.version != actor.version {
            debug!(
                actor = %actor.id,
                cached = snapshot.version,
                current = actor.version,
                "cached snapshot is stale"
            );
            return None;
        }
        Some(snapshot)
    }

    fn gather_outputs(&self, ctx: &ResolveContext, actor: &Actor) -> Vec<SubsystemOutput> {
        let mut outputs = Vec::new();
        for subsystem in self.subsystems.by_priority() {
            let system = subsystem.system_id();
            if !subsystem.is_active(actor) {
                debug!(system = %system, actor = %actor.id, "subsystem inactive");
                continue;
            }
            let result = subsystem
                .validate(actor)
                .and_then(|()| subsystem.contribute(ctx, actor))
                .and_then(|output| match output {
                    Some(output) => output.validate().map(|()| Some(output)),
                    None => Ok(None),
                });
            match result {
                Ok(Some(output)) => outputs.push(output),
                Ok(None) => debug!(system = %system, "subsystem contributed nothing"),
                Err(err) => {
                    bump(&self.counters.skipped_subsystems);
                    warn!(system = %system, actor = %actor.id, error = %err, "skipping subsystem");
                }
            }
        }
        outputs
    }

    /// Combine and clamp every dimension in `contributions`.
    ///
    /// A dimension is clamped to its effective cap. Without one, a dimension
    /// with an explicitly registered rule is clamped to the rule's default
    /// range, which is then recorded in `caps_used`. Other dimensions stay
    /// unclamped.
    fn aggregate<'a>(
        &self,
        contributions: impl Iterator<Item = &'a Contribution>,
        effective_caps: &EffectiveCaps,
        caps_used: &mut EffectiveCaps,
    ) -> BTreeMap<Dimension, f64> {
        let mut grouped: BTreeMap<Dimension, Vec<Contribution>> = BTreeMap::new();
        for contribution in contributions {
            grouped
                .entry(contribution.dimension.clone())
                .or_default()
                .push(contribution.clone());
        }

        grouped
            .into_iter()
            .filter_map(|(dimension, contributions)| {
                let rule = self.combiners.rule(dimension.as_str());
                let raw = rule
                    .as_ref()
                    .map(|rule| rule.combine(&contributions))
                    .unwrap_or_else(|| crate::bucket::combine_contributions(&contributions));
                if !raw.is_finite() {
                    warn!(dimension = %dimension, value = raw, "combined value is not finite");
                }

                let value = match (effective_caps.get(&dimension), rule) {
                    (Some(caps), _) => caps.clamp(raw),
                    (None, Some(rule)) => {
                        caps_used.insert(dimension.clone(), rule.clamp_default);
                        rule.clamp_default.clamp(raw)
                    }
                    // Nothing bounds an overflowed value, so drop it.
                    (None, None) if !raw.is_finite() => return None,
                    (None, None) => raw,
                };
                Some((dimension, value))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::{Bucket, Operator};
    use crate::cache::{EvictionPolicy, MemoryCache};
    use crate::caps::{CapMode, Caps, Layer};
    use crate::combiner::MergeRule;
    use crate::contribution::CapContribution;
    use crate::layers::CapLayerRegistry;
    use crate::subsystem::{StaticSubsystem, Subsystem};

    struct Failing;

    impl Subsystem for Failing {
        fn system_id(&self) -> &str {
            "failing"
        }

        fn priority(&self) -> i64 {
            1_000
        }

        fn contribute(
            &self,
            _ctx: &ResolveContext,
            _actor: &Actor,
        ) -> Result<Option<SubsystemOutput>, StatError> {
            Err(StatError::Subsystem {
                system: "failing".to_string(),
                reason: "database offline".to_string(),
            })
        }
    }

    struct OnlyFor(&'static str);

    impl Subsystem for OnlyFor {
        fn system_id(&self) -> &str {
            "conditional"
        }

        fn priority(&self) -> i64 {
            0
        }

        fn contribute(
            &self,
            _ctx: &ResolveContext,
            _actor: &Actor,
        ) -> Result<Option<SubsystemOutput>, StatError> {
            Ok(Some(SubsystemOutput::new("conditional").with_primary(
                Contribution::new("conditional", "hp", Bucket::Flat, 1.0),
            )))
        }

        fn is_active(&self, actor: &Actor) -> bool {
            actor.id == self.0
        }
    }

    fn static_subsystem(id: &str, priority: i64, output: SubsystemOutput) -> Arc<dyn Subsystem> {
        Arc::new(StaticSubsystem::new(id, priority, output))
    }

    fn flat(system: &str, dim: &str, value: f64) -> Contribution {
        Contribution::new(system, dim, Bucket::Flat, value)
    }

    fn aggregator_with(
        subsystems: Vec<Arc<dyn Subsystem>>,
        cache: Option<Arc<SnapshotCache>>,
    ) -> Aggregator {
        let registry = Arc::new(SubsystemRegistry::new());
        for subsystem in subsystems {
            registry.register(subsystem).unwrap();
        }
        Aggregator::new(
            Arc::new(CombinerRegistry::new()),
            Arc::new(CapsProvider::new(Arc::new(CapLayerRegistry::new()))),
            registry,
            cache,
        )
    }

    fn memory_cache() -> Arc<SnapshotCache> {
        Arc::new(MemoryCache::<Arc<Snapshot>>::new(16, EvictionPolicy::AllkeysLru))
    }

    #[test]
    fn test_sums_across_subsystems() {
        let aggregator = aggregator_with(
            vec![
                static_subsystem("a", 1, SubsystemOutput::new("a").with_primary(flat("a", "hp", 10.0))),
                static_subsystem("b", 2, SubsystemOutput::new("b").with_primary(flat("b", "hp", 15.0))),
            ],
            None,
        );
        let snapshot = aggregator.resolve(&Actor::new("hero", 1)).unwrap();
        assert_eq!(snapshot.primary_value("hp"), Some(25.0));
        assert!(snapshot.caps_used.is_empty());
    }

    #[test]
    fn test_primary_and_derived_are_separate() {
        let output = SubsystemOutput::new("a")
            .with_primary(flat("a", "str", 10.0))
            .with_derived(flat("a", "atk", 30.0));
        let aggregator = aggregator_with(vec![static_subsystem("a", 1, output)], None);
        let snapshot = aggregator.resolve(&Actor::new("hero", 1)).unwrap();
        assert_eq!(snapshot.primary_value("str"), Some(10.0));
        assert_eq!(snapshot.derived_value("atk"), Some(30.0));
        assert_eq!(snapshot.primary_value("atk"), None);
    }

    #[test]
    fn test_effective_cap_clamps_primary_and_derived() {
        let output = SubsystemOutput::new("a")
            .with_primary(flat("a", "hp", 500.0))
            .with_derived(flat("a", "hp", -5.0))
            .with_cap(CapContribution::new("a", "hp", CapMode::Baseline, 100.0, 2, Layer::World))
            .with_cap(CapContribution::new("a", "hp", CapMode::HardMin, 0.0, 1, Layer::World));
        let aggregator = aggregator_with(vec![static_subsystem("a", 1, output)], None);
        let snapshot = aggregator.resolve(&Actor::new("hero", 1)).unwrap();
        assert_eq!(snapshot.primary_value("hp"), Some(100.0));
        assert_eq!(snapshot.derived_value("hp"), Some(0.0));
        assert_eq!(snapshot.caps_used["hp"], Caps::new(0.0, 100.0));
    }

    #[test]
    fn test_overflowed_value_stays_inside_caps() {
        let overflow = || {
            SubsystemOutput::new("a")
                .with_primary(flat("a", "hp", 1e308))
                .with_primary(flat("a", "hp", 1e308))
                .with_primary(Contribution::new("a", "hp", Bucket::Mult, 0.0))
                .with_primary(flat("a", "mp", 1e308))
                .with_primary(flat("a", "mp", 1e308))
        };
        let capped = overflow()
            .with_cap(CapContribution::new("a", "hp", CapMode::Baseline, 100.0, 2, Layer::World))
            .with_cap(CapContribution::new("a", "hp", CapMode::HardMin, 0.0, 1, Layer::World))
            .with_cap(CapContribution::new("a", "mp", CapMode::Baseline, 50.0, 2, Layer::World));
        let aggregator = aggregator_with(vec![static_subsystem("a", 1, capped)], None);
        let snapshot = aggregator.resolve(&Actor::new("hero", 1)).unwrap();
        assert_eq!(snapshot.primary_value("hp"), Some(0.0));
        assert_eq!(snapshot.primary_value("mp"), Some(50.0));
        assert!(snapshot.same_values(&aggregator.resolve(&Actor::new("hero", 1)).unwrap()));

        let uncapped = aggregator_with(vec![static_subsystem("a", 1, overflow())], None);
        let snapshot = uncapped.resolve(&Actor::new("hero", 1)).unwrap();
        assert_eq!(snapshot.primary_value("hp"), None);
        assert_eq!(snapshot.primary_value("mp"), None);
    }

    #[test]
    fn test_rule_default_clamp_without_cap() {
        let aggregator = aggregator_with(
            vec![static_subsystem(
                "a",
                1,
                SubsystemOutput::new("a")
                    .with_primary(flat("a", "crit", 3.0))
                    .with_primary(flat("a", "free", 3.0)),
            )],
            None,
        );
        aggregator
            .combiners()
            .set_rule("crit", MergeRule::pipeline(Caps::new(0.0, 1.0)))
            .unwrap();
        let snapshot = aggregator.resolve(&Actor::new("hero", 1)).unwrap();
        assert_eq!(snapshot.primary_value("crit"), Some(1.0));
        assert_eq!(snapshot.primary_value("free"), Some(3.0));
        assert_eq!(snapshot.caps_used["crit"], Caps::new(0.0, 1.0));
        assert!(!snapshot.caps_used.contains_key("free"));
    }

    #[test]
    fn test_operator_rule() {
        let aggregator = aggregator_with(
            vec![
                static_subsystem("a", 1, SubsystemOutput::new("a").with_primary(flat("a", "speed", 4.0))),
                static_subsystem("b", 2, SubsystemOutput::new("b").with_primary(flat("b", "speed", 9.0))),
            ],
            None,
        );
        aggregator
            .combiners()
            .set_rule(
                "speed",
                MergeRule::operator(Operator::Max, Caps::new(0.0, 100.0)),
            )
            .unwrap();
        let snapshot = aggregator.resolve(&Actor::new("hero", 1)).unwrap();
        assert_eq!(snapshot.primary_value("speed"), Some(9.0));
    }

    #[test]
    fn test_failing_subsystem_skipped() {
        let aggregator = aggregator_with(
            vec![
                Arc::new(Failing) as Arc<dyn Subsystem>,
                static_subsystem("a", 1, SubsystemOutput::new("a").with_primary(flat("a", "hp", 10.0))),
            ],
            None,
        );
        let snapshot = aggregator.resolve(&Actor::new("hero", 1)).unwrap();
        assert_eq!(snapshot.primary_value("hp"), Some(10.0));
        assert_eq!(aggregator.metrics().skipped_subsystems, 1);
    }

    #[test]
    fn test_invalid_output_skipped() {
        let bad = SubsystemOutput::new("bad")
            .with_primary(flat("bad", "hp", 100.0))
            .with_primary(flat("bad", "", 1.0));
        let aggregator = aggregator_with(
            vec![
                static_subsystem("bad", 5, bad),
                static_subsystem("good", 1, SubsystemOutput::new("good").with_primary(flat("good", "hp", 7.0))),
            ],
            None,
        );
        let snapshot = aggregator.resolve(&Actor::new("hero", 1)).unwrap();
        assert_eq!(snapshot.primary_value("hp"), Some(7.0));
    }

    #[test]
    fn test_inactive_subsystem_skipped() {
        let aggregator = aggregator_with(vec![Arc::new(OnlyFor("hero")) as Arc<dyn Subsystem>], None);
        let hero = aggregator.resolve(&Actor::new("hero", 1)).unwrap();
        let villain = aggregator.resolve(&Actor::new("villain", 1)).unwrap();
        assert_eq!(hero.primary_value("hp"), Some(1.0));
        assert_eq!(villain.primary_value("hp"), None);
        assert_eq!(aggregator.metrics().skipped_subsystems, 0);
    }

    #[test]
    fn test_cache_hit_and_invalidate() {
        let aggregator = aggregator_with(
            vec![static_subsystem("a", 1, SubsystemOutput::new("a").with_primary(flat("a", "hp", 10.0)))],
            Some(memory_cache()),
        );
        let actor = Actor::new("hero", 1);
        let first = aggregator.resolve(&actor).unwrap();
        let second = aggregator.resolve(&actor).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(aggregator.cached_snapshot("hero").is_some());

        assert_eq!(aggregator.invalidate_cache("hero"), Ok(true));
        assert_eq!(aggregator.invalidate_cache("hero"), Ok(false));
        let third = aggregator.resolve(&actor).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert!(first.same_values(&third));

        let metrics = aggregator.metrics();
        assert_eq!(metrics.requests, 3);
        assert_eq!(metrics.cache_hits, 1);
        assert_eq!(metrics.cache_misses, 2);
    }

    #[test]
    fn test_stale_version_served_by_default() {
        let aggregator = aggregator_with(vec![], Some(memory_cache()));
        aggregator.resolve(&Actor::new("hero", 1)).unwrap();
        let snapshot = aggregator.resolve(&Actor::new("hero", 2)).unwrap();
        assert_eq!(snapshot.version, 1);
    }

    #[test]
    fn test_version_check_recomputes() {
        let aggregator = aggregator_with(vec![], Some(memory_cache()))
            .with_config(AggregatorConfig {
                check_actor_version: true,
                ..AggregatorConfig::default()
            })
            .unwrap();
        aggregator.resolve(&Actor::new("hero", 1)).unwrap();
        let snapshot = aggregator.resolve(&Actor::new("hero", 2)).unwrap();
        assert_eq!(snapshot.version, 2);
        assert_eq!(aggregator.cached_snapshot("hero").unwrap().version, 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = aggregator_with(vec![], None).with_config(AggregatorConfig {
            snapshot_ttl: "forever".to_string(),
            check_actor_version: false,
        });
        assert!(matches!(result, Err(StatError::InvalidTtl(_))));
    }

    #[test]
    fn test_cancelled_context_rejected_up_front() {
        let aggregator = aggregator_with(vec![], Some(memory_cache()));
        let ctx = ResolveContext::new();
        ctx.cancel();
        assert_eq!(
            aggregator
                .resolve_with_context(&ctx, &Actor::new("hero", 1))
                .unwrap_err(),
            StatError::Cancelled
        );
        assert!(aggregator.cached_snapshot("hero").is_none());
    }

    #[test]
    fn test_batch_skips_failures() {
        let aggregator = aggregator_with(vec![], None);
        let actors = vec![Actor::new("a", 1), Actor::new("", 1), Actor::new("c", 1)];
        let snapshots = aggregator.resolve_batch(&actors);
        let ids: Vec<&str> = snapshots.iter().map(|s| s.actor_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(aggregator.metrics().failed_resolutions, 1);
    }

    #[test]
    fn test_clear_cache_and_stats() {
        let aggregator = aggregator_with(vec![], Some(memory_cache()));
        aggregator.resolve(&Actor::new("a", 1)).unwrap();
        aggregator.resolve(&Actor::new("b", 1)).unwrap();
        assert_eq!(aggregator.cache_stats().unwrap().size, 2);
        aggregator.clear_cache();
        assert_eq!(aggregator.cache_stats().unwrap().size, 0);
        assert!(aggregator_with(vec![], None).cache_stats().is_none());
        assert!(aggregator.validate().is_ok());
    }
}
