//! Formula pipeline: derived stats from primary stats.
//!
//! A formula names a derived stat, declares the stats it reads and lists
//! typed steps applied to a running value that starts at `0`:
//!
//! - `FLAT` adds its term,
//! - `MULT` multiplies by its term,
//! - `CLAMP` pulls the value into the step's own `[min, max]` window.
//!
//! [`FormulaPipeline::build_order`] sorts formulas by dependency before any
//! evaluation. A cycle fails the build and leaves the pipeline without an
//! order until it is fixed.

use crate::dimension::Dimension;
use crate::error::StatError;
use crate::graph::DependencyGraph;
use crate::stats::{DerivedStats, PrimaryStats};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Operand of a `FLAT` or `MULT` step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Term {
    /// A fixed number.
    Constant(f64),
    /// `factor * stat`, where `stat` must be a declared dependency.
    Scaled { stat: Dimension, factor: f64 },
}

impl Term {
    /// `factor * stat`.
    pub fn scaled(stat: impl Into<Dimension>, factor: f64) -> Self {
        Term::Scaled {
            stat: stat.into(),
            factor,
        }
    }

    /// `1 * stat`.
    pub fn stat(stat: impl Into<Dimension>) -> Self {
        Self::scaled(stat, 1.0)
    }

    /// The stat this term reads, if any.
    pub fn reads(&self) -> Option<&Dimension> {
        match self {
            Term::Constant(_) => None,
            Term::Scaled { stat, .. } => Some(stat),
        }
    }

    fn is_finite(&self) -> bool {
        match self {
            Term::Constant(value) => value.is_finite(),
            Term::Scaled { factor, .. } => factor.is_finite(),
        }
    }

    fn evaluate<F>(&self, lookup: &F) -> Result<f64, StatError>
    where
        F: Fn(&Dimension) -> Result<f64, StatError>,
    {
        match self {
            Term::Constant(value) => Ok(*value),
            Term::Scaled { stat, factor } => Ok(lookup(stat)? * factor),
        }
    }
}

impl From<f64> for Term {
    fn from(value: f64) -> Self {
        Term::Constant(value)
    }
}

/// Step type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    Flat,
    Mult,
    Clamp,
}

impl StepKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StepKind::Flat => "FLAT",
            StepKind::Mult => "MULT",
            StepKind::Clamp => "CLAMP",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Step {
    Flat(Term),
    Mult(Term),
    Clamp { min: f64, max: f64 },
}

impl Step {
    pub fn kind(&self) -> StepKind {
        match self {
            Step::Flat(_) => StepKind::Flat,
            Step::Mult(_) => StepKind::Mult,
            Step::Clamp { .. } => StepKind::Clamp,
        }
    }

    fn term(&self) -> Option<&Term> {
        match self {
            Step::Flat(term) | Step::Mult(term) => Some(term),
            Step::Clamp { .. } => None,
        }
    }
}

/// A named derived-stat formula.
///
/// # Examples
///
/// ```rust
/// use actorstat::{FormulaDefinition, Term};
///
/// // atk = clamp(10 + 2 * str, 0, 100)
/// let atk = FormulaDefinition::new("atk")
///     .with_dep("str")
///     .flat(10.0)
///     .flat(Term::scaled("str", 2.0))
///     .clamp(0.0, 100.0);
///
/// assert!(atk.validate().is_ok());
/// assert_eq!(atk.steps.len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaDefinition {
    pub name: Dimension,
    #[serde(default)]
    pub deps: Vec<Dimension>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl FormulaDefinition {
    pub fn new(name: impl Into<Dimension>) -> Self {
        Self {
            name: name.into(),
            deps: Vec::new(),
            steps: Vec::new(),
        }
    }

    pub fn with_dep(mut self, dep: impl Into<Dimension>) -> Self {
        self.deps.push(dep.into());
        self
    }

    pub fn with_deps<I, D>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<Dimension>,
    {
        self.deps.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn flat(mut self, term: impl Into<Term>) -> Self {
        self.steps.push(Step::Flat(term.into()));
        self
    }

    pub fn mult(mut self, term: impl Into<Term>) -> Self {
        self.steps.push(Step::Mult(term.into()));
        self
    }

    pub fn clamp(mut self, min: f64, max: f64) -> Self {
        self.steps.push(Step::Clamp { min, max });
        self
    }

    fn invalid(&self, reason: impl Into<String>) -> StatError {
        StatError::InvalidFormula {
            name: self.name.to_string(),
            reason: reason.into(),
        }
    }

    /// Check names, numbers and that every term reads a declared dependency.
    pub fn validate(&self) -> Result<(), StatError> {
        if self.name.is_blank() {
            return Err(StatError::EmptyDimension);
        }
        let mut declared = HashSet::new();
        for dep in &self.deps {
            if dep.is_blank() {
                return Err(self.invalid("dependency name cannot be empty"));
            }
            if !declared.insert(dep) {
                return Err(self.invalid(format!("dependency {dep} declared twice")));
            }
        }
        for (index, step) in self.steps.iter().enumerate() {
            if let Step::Clamp { min, max } = step {
                if !min.is_finite() || !max.is_finite() || min > max {
                    return Err(self.invalid(format!(
                        "step {index}: clamp window [{min}, {max}] is invalid"
                    )));
                }
            }
            if let Some(term) = step.term() {
                if !term.is_finite() {
                    return Err(self.invalid(format!("step {index}: term is not finite")));
                }
                if let Some(stat) = term.reads() {
                    if !declared.contains(stat) {
                        return Err(self.invalid(format!(
                            "step {index} reads {stat}, which is not a declared dependency"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Run the steps in order on a value starting at `0`.
    ///
    /// `lookup` resolves the stats read by `Scaled` terms.
    pub fn evaluate<F>(&self, lookup: F) -> Result<f64, StatError>
    where
        F: Fn(&Dimension) -> Result<f64, StatError>,
    {
        let mut value = 0.0;
        for step in &self.steps {
            value = match step {
                Step::Flat(term) => value + term.evaluate(&lookup)?,
                Step::Mult(term) => value * term.evaluate(&lookup)?,
                Step::Clamp { min, max } => value.min(*max).max(*min),
            };
        }
        Ok(value)
    }
}

/// Ordered set of formulas.
///
/// # Examples
///
/// ```rust
/// use actorstat::{FormulaDefinition, FormulaPipeline, PrimaryStats, Term};
///
/// let mut pipeline = FormulaPipeline::new();
/// pipeline
///     .add_formula(FormulaDefinition::new("dps").with_dep("atk").flat(Term::scaled("atk", 1.5)))
///     .unwrap();
/// pipeline
///     .add_formula(FormulaDefinition::new("atk").with_dep("str").flat(Term::scaled("str", 2.0)))
///     .unwrap();
/// pipeline.build_order().unwrap();
///
/// let primary = PrimaryStats::new().with("str", 10.0);
/// let derived = pipeline.resolve_derived_stats(&primary, None).unwrap();
/// assert_eq!(derived.get_stat("atk"), Some(20.0));
/// assert_eq!(derived.get_stat("dps"), Some(30.0));
/// ```
#[derive(Debug, Clone, Default)]
pub struct FormulaPipeline {
    formulas: Vec<FormulaDefinition>,
    index: HashMap<Dimension, usize>,
    order: Option<Vec<Dimension>>,
}

impl FormulaPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a formula. Invalidates the current order.
    pub fn add_formula(&mut self, formula: FormulaDefinition) -> Result<(), StatError> {
        formula.validate()?;
        if self.index.contains_key(&formula.name) {
            return Err(StatError::DuplicateFormula(formula.name));
        }
        self.index.insert(formula.name.clone(), self.formulas.len());
        self.formulas.push(formula);
        self.order = None;
        Ok(())
    }

    /// Remove a formula. Invalidates the current order.
    pub fn remove_formula(&mut self, name: &str) -> Result<FormulaDefinition, StatError> {
        let position = self
            .index
            .remove(name)
            .ok_or_else(|| StatError::UnknownFormula(Dimension::new(name)))?;
        let removed = self.formulas.remove(position);
        for slot in self.index.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }
        self.order = None;
        Ok(removed)
    }

    pub fn formula(&self, name: &str) -> Option<&FormulaDefinition> {
        self.index.get(name).map(|&position| &self.formulas[position])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Formulas in registration order.
    pub fn formulas(&self) -> &[FormulaDefinition] {
        &self.formulas
    }

    pub fn len(&self) -> usize {
        self.formulas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formulas.is_empty()
    }

    /// Graph of formula-to-formula dependencies.
    ///
    /// Dependencies that are not formulas are external inputs (primary
    /// stats) and get no node.
    pub fn dependency_graph(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for formula in &self.formulas {
            graph.add_node(formula.name.clone());
        }
        for formula in &self.formulas {
            for dep in &formula.deps {
                if self.contains(dep.as_str()) {
                    graph.add_dependency(formula.name.clone(), dep.clone());
                }
            }
        }
        graph
    }

    /// Sort formulas so every formula comes after the formulas it reads.
    ///
    /// # Errors
    ///
    /// `StatError::Cycle` if formulas depend on each other in a loop. The
    /// previous order is discarded either way.
    pub fn build_order(&mut self) -> Result<&[Dimension], StatError> {
        self.order = None;
        let order = self.dependency_graph().topological_order()?;
        debug!(formulas = order.len(), "built formula order");
        Ok(self.order.insert(order).as_slice())
    }

    /// The last successfully built order.
    pub fn order(&self) -> Option<&[Dimension]> {
        self.order.as_deref()
    }

    /// Evaluate every formula in order.
    ///
    /// Starts from a clone of `previous` (or an empty set), so the caller's
    /// stats are never modified. The result's version is bumped once more
    /// after all formulas have been written.
    ///
    /// # Errors
    ///
    /// * `StatError::OrderNotBuilt` if `build_order` has not succeeded since
    ///   the last change
    /// * `StatError::MissingDependency` if a formula reads a stat that is
    ///   neither a formula nor a primary stat
    pub fn resolve_derived_stats(
        &self,
        primary: &PrimaryStats,
        previous: Option<&DerivedStats>,
    ) -> Result<DerivedStats, StatError> {
        let order = self.order.as_deref().ok_or(StatError::OrderNotBuilt)?;
        self.evaluate(order, primary, previous)
    }

    /// Evaluate the formulas named in `order`, which must already be sorted.
    pub(crate) fn evaluate(
        &self,
        order: &[Dimension],
        primary: &PrimaryStats,
        previous: Option<&DerivedStats>,
    ) -> Result<DerivedStats, StatError> {
        let mut derived = previous.cloned().unwrap_or_default();
        for name in order {
            let formula = self
                .formula(name.as_str())
                .ok_or_else(|| StatError::UnknownFormula(name.clone()))?;
            let value = formula.evaluate(|stat: &Dimension| {
                let found = if self.contains(stat.as_str()) {
                    derived.get_stat(stat.as_str())
                } else {
                    primary.get(stat.as_str())
                };
                found.ok_or_else(|| StatError::MissingDependency(stat.clone()))
            })?;
            derived.set_stat(name.clone(), value);
        }
        derived.touch();
        Ok(derived)
    }
}
