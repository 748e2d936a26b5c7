//! Aggregation example: several subsystems feeding one actor
//!
//! This example shows:
//! - Registering subsystems with different priorities
//! - Bucket combination (FLAT, MULT, POST_ADD, OVERRIDE)
//! - Caps from two layers combined with the intersect policy
//! - Snapshot caching and invalidation

use actorstat::*;
use std::sync::Arc;

fn main() {
    let subsystems = Arc::new(SubsystemRegistry::new());

    // Equipment: base stats and a world-level HP cap
    subsystems
        .register(Arc::new(StaticSubsystem::new(
            "equipment",
            100,
            SubsystemOutput::new("equipment")
                .with_primary(Contribution::new("equipment", "hp", Bucket::Flat, 500.0))
                .with_primary(Contribution::new("equipment", "atk", Bucket::Flat, 80.0))
                .with_cap(CapContribution::new("equipment", "hp", CapMode::Baseline, 0.0, 10, Layer::World))
                .with_cap(CapContribution::new("equipment", "hp", CapMode::HardMax, 2000.0, 5, Layer::World)),
        )))
        .unwrap();

    // Buffs: percentage multipliers and a flat bonus after them
    subsystems
        .register(Arc::new(StaticSubsystem::new(
            "buffs",
            50,
            SubsystemOutput::new("buffs")
                .with_primary(Contribution::new("buffs", "hp", Bucket::Mult, 1.2))
                .with_primary(Contribution::new("buffs", "atk", Bucket::Mult, 1.5))
                .with_primary(Contribution::new("buffs", "atk", Bucket::PostAdd, 10.0)),
        )))
        .unwrap();

    // Event: a tighter HP cap while the event runs
    subsystems
        .register(Arc::new(StaticSubsystem::new(
            "event",
            10,
            SubsystemOutput::new("event")
                .with_cap(CapContribution::new("event", "hp", CapMode::Baseline, 100.0, 10, Layer::Event))
                .with_cap(CapContribution::new("event", "hp", CapMode::HardMax, 550.0, 5, Layer::Event)),
        )))
        .unwrap();

    println!("=== Subsystems by priority ===\n");
    for subsystem in subsystems.by_priority() {
        println!("{:>4}  {}", subsystem.priority(), subsystem.system_id());
    }

    let cache: Arc<actorstat::aggregator::SnapshotCache> =
        Arc::new(MemoryCache::<Arc<Snapshot>>::new(100, EvictionPolicy::AllkeysLru));
    let aggregator = Aggregator::new(
        Arc::new(CombinerRegistry::new()),
        Arc::new(CapsProvider::new(Arc::new(CapLayerRegistry::new()))),
        subsystems,
        Some(cache),
    );

    let hero = Actor::new("hero", 1);
    let snapshot = aggregator.resolve(&hero).unwrap();

    println!("\n=== Snapshot for {} (v{}) ===\n", snapshot.actor_id, snapshot.version);
    for (dimension, value) in &snapshot.primary {
        println!("{dimension:<6} {value}");
    }
    // hp: 500 * 1.2 = 600, capped by the event layer to 550
    // atk: 80 * 1.5 + 10 = 130
    println!("\nCaps used:");
    for (dimension, caps) in &snapshot.caps_used {
        println!("{dimension:<6} [{}, {}]", caps.min, caps.max);
    }

    println!("\n=== Cache ===\n");
    aggregator.resolve(&hero).unwrap();
    println!("after second resolve: {:?}", aggregator.metrics());
    aggregator.invalidate_cache("hero").unwrap();
    aggregator.resolve(&hero).unwrap();
    println!("after invalidation:   {:?}", aggregator.metrics());
    if let Some(stats) = aggregator.cache_stats() {
        println!("hit rate: {:.2}", stats.hit_rate());
    }
}
