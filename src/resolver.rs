//! Stat resolver module.
//!
//! `StatResolver` owns a table of formulas behind a reader/writer lock and
//! keeps its evaluation order current: every accepted change rebuilds the
//! order, and a change that would leave the table unusable (an invalid
//! formula or a dependency cycle) is rejected without touching it.
//!
//! Single-stat results are memoized per table version and primary input, and
//! resolved stats can be checked against registered ranges with
//! [`StatResolver::validate_stats`].

use crate::caps::Caps;
use crate::context::ResolveContext;
use crate::dimension::Dimension;
use crate::error::StatError;
use crate::formula::{FormulaDefinition, FormulaPipeline};
use crate::stats::{DerivedStats, PrimaryStats};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// The value cache is dropped wholesale once it holds this many entries.
const MAX_CACHED_VALUES: usize = 4096;

/// Ranges for common combat stats: `crit_chance` in `[0, 1]`,
/// `crit_multi` at least `1` and `haste` at least `0.1`.
pub fn default_stat_bounds() -> BTreeMap<Dimension, Caps> {
    BTreeMap::from([
        (Dimension::new("crit_chance"), Caps::new(0.0, 1.0)),
        (Dimension::new("crit_multi"), Caps::new(1.0, f64::MAX)),
        (Dimension::new("haste"), Caps::new(0.1, f64::MAX)),
    ])
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ValueKey {
    stat: Dimension,
    version: u64,
    inputs: Vec<(Dimension, u64)>,
}

impl ValueKey {
    fn new(stat: Dimension, version: u64, primary: &PrimaryStats) -> Self {
        Self {
            stat,
            version,
            inputs: primary
                .iter()
                .map(|(input, value)| (input.clone(), value.to_bits()))
                .collect(),
        }
    }
}

/// Thread-safe formula table with dependency-ordered evaluation.
///
/// # Examples
///
/// ```rust
/// use actorstat::{FormulaDefinition, PrimaryStats, StatResolver, Term};
///
/// let resolver = StatResolver::new();
/// resolver
///     .add_formula(FormulaDefinition::new("atk").with_dep("str").flat(Term::scaled("str", 2.0)))
///     .unwrap();
/// resolver
///     .add_formula(
///         FormulaDefinition::new("dps")
///             .with_dep("atk")
///             .flat(Term::stat("atk"))
///             .mult(1.5),
///     )
///     .unwrap();
///
/// let primary = PrimaryStats::new().with("str", 10.0);
/// let derived = resolver.resolve_stats(&primary).unwrap();
/// assert_eq!(derived.get_stat("atk"), Some(20.0));
/// assert_eq!(derived.get_stat("dps"), Some(30.0));
///
/// // A formula closing a loop is refused and the table is unchanged.
/// resolver
///     .add_formula(FormulaDefinition::new("rage").with_dep("fury").flat(Term::stat("fury")))
///     .unwrap();
/// let fury = FormulaDefinition::new("fury").with_dep("rage").flat(Term::stat("rage"));
/// assert!(resolver.add_formula(fury).is_err());
/// assert_eq!(resolver.len(), 3);
/// ```
#[derive(Debug, Default)]
pub struct StatResolver {
    pipeline: RwLock<FormulaPipeline>,
    version: AtomicU64,
    values: RwLock<HashMap<ValueKey, f64>>,
    bounds: RwLock<BTreeMap<Dimension, Caps>>,
}

impl StatResolver {
    /// Create a resolver with no formulas.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a resolver from a set of formulas, rejecting the whole set if
    /// any formula is invalid or the set contains a cycle.
    pub fn from_formulas<I>(formulas: I) -> Result<Self, StatError>
    where
        I: IntoIterator<Item = FormulaDefinition>,
    {
        let resolver = Self::new();
        resolver.add_formulas(formulas)?;
        Ok(resolver)
    }

    /// Register one formula.
    ///
    /// # Errors
    ///
    /// * validation errors from [`FormulaDefinition::validate`]
    /// * `StatError::DuplicateFormula` if the name is taken
    /// * `StatError::Cycle` if the formula closes a dependency loop
    ///
    /// The table is unchanged on error.
    pub fn add_formula(&self, formula: FormulaDefinition) -> Result<(), StatError> {
        self.add_formulas(std::iter::once(formula))
    }

    /// Register several formulas at once. All or nothing.
    pub fn add_formulas<I>(&self, formulas: I) -> Result<(), StatError>
    where
        I: IntoIterator<Item = FormulaDefinition>,
    {
        self.update(|staged| {
            for formula in formulas {
                staged.add_formula(formula)?;
            }
            Ok(())
        })
    }

    /// Remove a formula and return its definition.
    ///
    /// Formulas that read the removed one fall back to a primary stat of the
    /// same name on the next resolution.
    pub fn remove_formula(&self, name: &str) -> Result<FormulaDefinition, StatError> {
        let mut removed = None;
        self.update(|staged| {
            removed = Some(staged.remove_formula(name)?);
            Ok(())
        })?;
        removed.ok_or_else(|| StatError::UnknownFormula(Dimension::new(name)))
    }

    fn update<F>(&self, change: F) -> Result<(), StatError>
    where
        F: FnOnce(&mut FormulaPipeline) -> Result<(), StatError>,
    {
        let mut pipeline = self.pipeline.write();
        let mut staged = pipeline.clone();
        change(&mut staged)?;
        staged.build_order()?;
        *pipeline = staged;
        self.values.write().clear();
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(version, formulas = pipeline.len(), "formula table updated");
        Ok(())
    }

    pub fn formula(&self, name: &str) -> Option<FormulaDefinition> {
        self.pipeline.read().formula(name).cloned()
    }

    pub fn has_formula(&self, name: &str) -> bool {
        self.pipeline.read().contains(name)
    }

    /// Formula names in registration order.
    pub fn formula_names(&self) -> Vec<Dimension> {
        self.pipeline
            .read()
            .formulas()
            .iter()
            .map(|formula| formula.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pipeline.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipeline.read().is_empty()
    }

    /// The order formulas are evaluated in.
    pub fn calculation_order(&self) -> Vec<Dimension> {
        self.pipeline
            .read()
            .order()
            .map(<[Dimension]>::to_vec)
            .unwrap_or_default()
    }

    /// Declared dependencies of a formula.
    pub fn check_dependencies(&self, name: &str) -> Result<Vec<Dimension>, StatError> {
        self.pipeline
            .read()
            .formula(name)
            .map(|formula| formula.deps.clone())
            .ok_or_else(|| StatError::UnknownFormula(Dimension::new(name)))
    }

    /// Number of accepted table changes.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Evaluate every formula into a fresh `DerivedStats`.
    pub fn resolve_stats(&self, primary: &PrimaryStats) -> Result<DerivedStats, StatError> {
        self.resolve_stats_from(primary, None)
    }

    /// Evaluate every formula on top of a previous result.
    ///
    /// `previous` is cloned, never modified.
    pub fn resolve_stats_from(
        &self,
        primary: &PrimaryStats,
        previous: Option<&DerivedStats>,
    ) -> Result<DerivedStats, StatError> {
        let pipeline = self.pipeline.read();
        let order = pipeline.order().unwrap_or(&[]);
        pipeline.evaluate(order, primary, previous)
    }

    /// Evaluate one formula and only the formulas it depends on.
    ///
    /// Results are cached by stat name, table version and the exact primary
    /// values, so a repeated call with the same input skips evaluation.
    ///
    /// # Errors
    ///
    /// `StatError::UnknownFormula` if `name` is not registered, or
    /// `StatError::MissingDependency` if an input stat is absent.
    pub fn resolve_stat(&self, name: &str, primary: &PrimaryStats) -> Result<f64, StatError> {
        let pipeline = self.pipeline.read();
        if !pipeline.contains(name) {
            return Err(StatError::UnknownFormula(Dimension::new(name)));
        }
        let target = Dimension::new(name);
        let key = ValueKey::new(target.clone(), self.version(), primary);
        if let Some(&value) = self.values.read().get(&key) {
            return Ok(value);
        }

        let order = pipeline
            .dependency_graph()
            .subgraph_for_targets(std::slice::from_ref(&target))
            .topological_order()?;
        let derived = pipeline.evaluate(&order, primary, None)?;
        let value = derived
            .get_stat(name)
            .ok_or(StatError::MissingDependency(target))?;

        let mut values = self.values.write();
        if values.len() >= MAX_CACHED_VALUES {
            values.clear();
        }
        values.insert(key, value);
        Ok(value)
    }

    /// Drop every memoized single-stat result.
    pub fn clear_cache(&self) {
        self.values.write().clear();
    }

    /// Number of memoized single-stat results.
    pub fn cache_size(&self) -> usize {
        self.values.read().len()
    }

    /// Allow `stat` to take values in `bounds` when validated.
    pub fn set_stat_bounds(
        &self,
        stat: impl Into<Dimension>,
        bounds: Caps,
    ) -> Result<(), StatError> {
        let stat = stat.into();
        if stat.is_blank() {
            return Err(StatError::EmptyDimension);
        }
        Caps::validated(stat.as_str(), bounds.min, bounds.max)?;
        self.bounds.write().insert(stat, bounds);
        Ok(())
    }

    pub fn remove_stat_bounds(&self, stat: &str) -> Option<Caps> {
        self.bounds.write().remove(stat)
    }

    pub fn stat_bounds(&self, stat: &str) -> Option<Caps> {
        self.bounds.read().get(stat).copied()
    }

    /// Check resolved stats.
    ///
    /// A stat with registered bounds must lie inside them. Any other stat
    /// must be finite and non-negative. The first offending stat, in name
    /// order, is reported.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use actorstat::{Caps, DerivedStats, StatError, StatResolver};
    ///
    /// let resolver = StatResolver::new();
    /// resolver.set_stat_bounds("crit_chance", Caps::new(0.0, 1.0)).unwrap();
    ///
    /// let mut stats = DerivedStats::new();
    /// stats.set_stat("atk", 120.0);
    /// stats.set_stat("crit_chance", 0.4);
    /// assert!(resolver.validate_stats(&stats).is_ok());
    ///
    /// stats.set_stat("crit_chance", 1.5);
    /// assert!(matches!(
    ///     resolver.validate_stats(&stats),
    ///     Err(StatError::InvalidStat { .. })
    /// ));
    /// ```
    pub fn validate_stats(&self, stats: &DerivedStats) -> Result<(), StatError> {
        let bounds = self.bounds.read();
        for (stat, &value) in stats.all_stats() {
            let reason = match bounds.get(stat) {
                Some(range) if !range.contains(value) => {
                    format!("outside [{}, {}]", range.min, range.max)
                }
                Some(_) => continue,
                None if !value.is_finite() => "not finite".to_string(),
                None if value < 0.0 => "negative".to_string(),
                None => continue,
            };
            return Err(StatError::InvalidStat {
                stat: stat.clone(),
                value,
                reason,
            });
        }
        Ok(())
    }

    pub fn validate_stats_with_context(
        &self,
        ctx: &ResolveContext,
        stats: &DerivedStats,
    ) -> Result<(), StatError> {
        ctx.check()?;
        self.validate_stats(stats)
    }

    /// [`resolve_stats`](Self::resolve_stats), refused up front if `ctx` is
    /// cancelled or past its deadline.
    pub fn resolve_stats_with_context(
        &self,
        ctx: &ResolveContext,
        primary: &PrimaryStats,
    ) -> Result<DerivedStats, StatError> {
        ctx.check()?;
        self.resolve_stats(primary)
    }

    pub fn resolve_stats_from_with_context(
        &self,
        ctx: &ResolveContext,
        primary: &PrimaryStats,
        previous: Option<&DerivedStats>,
    ) -> Result<DerivedStats, StatError> {
        ctx.check()?;
        self.resolve_stats_from(primary, previous)
    }

    pub fn resolve_stat_with_context(
        &self,
        ctx: &ResolveContext,
        name: &str,
        primary: &PrimaryStats,
    ) -> Result<f64, StatError> {
        ctx.check()?;
        self.resolve_stat(name, primary)
    }
}
