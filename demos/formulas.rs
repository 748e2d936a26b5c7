//! Formula example: derived stats and cycle detection
//!
//! This example shows:
//! - Declaring formulas with FLAT, MULT and CLAMP steps
//! - Dependency-ordered evaluation
//! - What happens when a formula would create a cycle

use actorstat::*;

fn main() {
    let resolver = StatResolver::new();

    resolver
        .add_formulas([
            // atk = 2 * str + 10
            FormulaDefinition::new("atk")
                .with_dep("str")
                .flat(Term::scaled("str", 2.0))
                .flat(10.0),
            // crit = clamp(0.005 * agi, 0, 0.75)
            FormulaDefinition::new("crit")
                .with_dep("agi")
                .flat(Term::scaled("agi", 0.005))
                .clamp(0.0, 0.75),
            // dps = atk * (1 + crit)
            FormulaDefinition::new("dps")
                .with_deps(["atk", "crit"])
                .flat(1.0)
                .flat(Term::stat("crit"))
                .mult(Term::stat("atk")),
        ])
        .unwrap();

    println!("=== Calculation order ===\n");
    let order: Vec<String> = resolver
        .calculation_order()
        .iter()
        .map(ToString::to_string)
        .collect();
    println!("{}", order.join(" -> "));

    let primary = PrimaryStats::new().with("str", 40.0).with("agi", 60.0);
    let derived = resolver.resolve_stats(&primary).unwrap();

    println!("\n=== Derived stats (v{}) ===\n", derived.version());
    for (stat, value) in derived.all_stats() {
        println!("{stat:<5} {value}");
    }

    println!("\n=== Attempting a cycle ===\n");
    // str_bonus reads dps, and atk would read str_bonus: atk -> str_bonus -> dps -> atk
    resolver
        .add_formula(
            FormulaDefinition::new("str_bonus")
                .with_dep("dps")
                .flat(Term::scaled("dps", 0.01)),
        )
        .unwrap();
    resolver.remove_formula("atk").unwrap();
    let cyclic = FormulaDefinition::new("atk")
        .with_deps(["str", "str_bonus"])
        .flat(Term::scaled("str", 2.0))
        .flat(Term::stat("str_bonus"));

    match resolver.add_formula(cyclic) {
        Err(err @ StatError::Cycle { .. }) => println!("rejected: {err}"),
        Err(err) => println!("unexpected error: {err}"),
        Ok(()) => println!("cycle was not detected"),
    }
    println!("formulas still registered: {}", resolver.len());
}
