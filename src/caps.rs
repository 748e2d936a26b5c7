//! Cap ranges, cap modes and layered cap resolution.
//!
//! Caps are resolved in two passes:
//!
//! 1. **Within a layer**: cap contributions scoped to the layer are grouped
//!    by dimension, sorted by descending priority and folded. The first
//!    contribution seeds `{value, value}`, every later one is applied by its
//!    [`CapMode`].
//! 2. **Across layers**: the per-layer results for a dimension are combined
//!    with the [`AcrossLayerPolicy`] (`intersect` or `union`).
//!
//! Whenever a fold leaves `min > max` the range collapses to `min = max`
//! instead of failing.

use crate::contribution::CapContribution;
use crate::dimension::Dimension;
use crate::error::StatError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Effective `{min, max}` range per dimension.
pub type EffectiveCaps = BTreeMap<Dimension, Caps>;

/// A closed `[min, max]` range.
///
/// # Examples
///
/// ```rust
/// use actorstat::Caps;
///
/// let caps = Caps::new(10.0, 100.0);
/// assert_eq!(caps.clamp(150.0), 100.0);
/// assert_eq!(caps.clamp(5.0), 10.0);
///
/// // Conflicting bounds collapse onto the maximum.
/// assert_eq!(Caps::new(50.0, 10.0).normalized(), Caps::new(10.0, 10.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Caps {
    pub min: f64,
    pub max: f64,
}

impl Caps {
    /// Create a range. No ordering check is made; see [`Caps::validated`].
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// A range pinned to one value.
    pub fn fixed(value: f64) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    /// Create a range from caller input, rejecting `min > max` and
    /// non-finite bounds.
    pub fn validated(dimension: &str, min: f64, max: f64) -> Result<Self, StatError> {
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(StatError::InvalidCaps {
                dimension: dimension.to_string(),
                min,
                max,
            });
        }
        Ok(Self { min, max })
    }

    /// Collapse `min` onto `max` when the bounds conflict.
    pub fn normalized(self) -> Self {
        if self.min > self.max {
            Self::fixed(self.max)
        } else {
            self
        }
    }

    /// Clamp a value into the range.
    ///
    /// Applies the lower bound first and the upper bound second, so a
    /// conflicting range yields `max`. NaN is treated as below the range.
    pub fn clamp(&self, value: f64) -> f64 {
        let mut v = if value.is_nan() { self.min } else { value };
        if v < self.min {
            v = self.min;
        }
        if v > self.max {
            v = self.max;
        }
        v
    }

    /// `true` if `value` lies inside the range.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Stricter of the two ranges, without collapsing.
    pub fn intersect(&self, other: &Caps) -> Caps {
        Caps::new(self.min.max(other.min), self.max.min(other.max))
    }

    /// Looser of the two ranges.
    pub fn union(&self, other: &Caps) -> Caps {
        Caps::new(self.min.min(other.min), self.max.max(other.max))
    }

    /// Apply one cap contribution to the running range.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use actorstat::{CapMode, Caps};
    ///
    /// let caps = Caps::fixed(100.0);
    /// assert_eq!(caps.apply(CapMode::Additive, 20.0), Caps::new(120.0, 120.0));
    /// assert_eq!(caps.apply(CapMode::HardMin, 0.0), Caps::new(0.0, 100.0));
    /// assert_eq!(caps.apply(CapMode::HardMax, 250.0), Caps::new(100.0, 250.0));
    /// ```
    pub fn apply(self, mode: CapMode, value: f64) -> Caps {
        match mode {
            CapMode::Baseline | CapMode::Override => Caps::fixed(value),
            CapMode::Additive => Caps::new(self.min + value, self.max + value),
            CapMode::HardMax => Caps::new(self.min, value),
            CapMode::HardMin => Caps::new(value, self.max),
        }
    }
}

/// How a cap contribution folds into the running range of its layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CapMode {
    /// Reset both bounds to the value.
    Baseline,
    /// Shift both bounds by the value.
    Additive,
    /// Set the upper bound.
    HardMax,
    /// Set the lower bound.
    HardMin,
    /// Reset both bounds to the value. Same math as `Baseline`, kept apart
    /// so audits can tell an admin override from a baseline.
    Override,
}

impl CapMode {
    pub const ALL: [CapMode; 5] = [
        CapMode::Baseline,
        CapMode::Additive,
        CapMode::HardMax,
        CapMode::HardMin,
        CapMode::Override,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CapMode::Baseline => "BASELINE",
            CapMode::Additive => "ADDITIVE",
            CapMode::HardMax => "HARD_MAX",
            CapMode::HardMin => "HARD_MIN",
            CapMode::Override => "OVERRIDE",
        }
    }
}

impl FromStr for CapMode {
    type Err = StatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CapMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| StatError::unknown("cap mode", s))
    }
}

impl std::fmt::Display for CapMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authority scope of a cap contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Layer {
    Realm,
    World,
    Event,
    Guild,
    Total,
}

impl Layer {
    /// Every layer, in the default layer order.
    pub const ALL: [Layer; 5] = [
        Layer::Realm,
        Layer::World,
        Layer::Event,
        Layer::Guild,
        Layer::Total,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Layer::Realm => "REALM",
            Layer::World => "WORLD",
            Layer::Event => "EVENT",
            Layer::Guild => "GUILD",
            Layer::Total => "TOTAL",
        }
    }
}

impl FromStr for Layer {
    type Err = StatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Layer::ALL
            .into_iter()
            .find(|layer| layer.as_str() == s)
            .ok_or_else(|| StatError::unknown("layer", s))
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How per-layer caps for one dimension are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcrossLayerPolicy {
    /// `min = max(mins)`, `max = min(maxes)`. Caps only get stricter.
    #[default]
    Intersect,
    /// `min = min(mins)`, `max = max(maxes)`. Caps only get looser.
    Union,
}

impl AcrossLayerPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            AcrossLayerPolicy::Intersect => "intersect",
            AcrossLayerPolicy::Union => "union",
        }
    }

    fn combine(self, a: &Caps, b: &Caps) -> Caps {
        match self {
            AcrossLayerPolicy::Intersect => a.intersect(b),
            AcrossLayerPolicy::Union => a.union(b),
        }
    }
}

impl FromStr for AcrossLayerPolicy {
    type Err = StatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "intersect" => Ok(AcrossLayerPolicy::Intersect),
            "union" => Ok(AcrossLayerPolicy::Union),
            other => Err(StatError::unknown("across-layer policy", other)),
        }
    }
}

impl std::fmt::Display for AcrossLayerPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fold the cap contributions scoped to `layer` into one range per dimension.
///
/// Contributions for a dimension are sorted by descending priority before
/// folding. The sort is stable, so equal priorities keep their input order.
pub fn fold_within_layer<'a, I>(contributions: I, layer: Layer) -> EffectiveCaps
where
    I: IntoIterator<Item = &'a CapContribution>,
{
    let mut grouped: BTreeMap<Dimension, Vec<&CapContribution>> = BTreeMap::new();
    for cap in contributions {
        if cap.scope == layer {
            grouped.entry(cap.dimension.clone()).or_default().push(cap);
        }
    }

    grouped
        .into_iter()
        .filter_map(|(dimension, mut group)| {
            group.sort_by(|a, b| b.priority.cmp(&a.priority));
            let folded = group.iter().fold(None, |acc: Option<Caps>, cap| {
                Some(match acc {
                    None => Caps::fixed(cap.value),
                    Some(running) => running.apply(cap.mode, cap.value),
                })
            })?;
            Some((dimension, folded.normalized()))
        })
        .collect()
}

/// Combine per-layer results into one range per dimension.
///
/// Layers are visited in the given order. Only layers that cap a dimension
/// take part in its result; the result is normalized once at the end.
///
/// # Examples
///
/// ```rust
/// use actorstat::caps::{combine_across_layers, EffectiveCaps};
/// use actorstat::{AcrossLayerPolicy, Caps, Dimension};
///
/// let mut world = EffectiveCaps::new();
/// world.insert(Dimension::new("hp"), Caps::new(10.0, 100.0));
/// let mut guild = EffectiveCaps::new();
/// guild.insert(Dimension::new("hp"), Caps::new(20.0, 80.0));
///
/// let layers = [world, guild];
/// let strict = combine_across_layers(&layers, AcrossLayerPolicy::Intersect);
/// assert_eq!(strict["hp"], Caps::new(20.0, 80.0));
///
/// let loose = combine_across_layers(&layers, AcrossLayerPolicy::Union);
/// assert_eq!(loose["hp"], Caps::new(10.0, 100.0));
/// ```
pub fn combine_across_layers(per_layer: &[EffectiveCaps], policy: AcrossLayerPolicy) -> EffectiveCaps {
    let mut result = EffectiveCaps::new();
    for layer_caps in per_layer {
        for (dimension, caps) in layer_caps {
            result
                .entry(dimension.clone())
                .and_modify(|running| *running = policy.combine(running, caps))
                .or_insert(*caps);
        }
    }
    for caps in result.values_mut() {
        *caps = caps.normalized();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cap(dim: &str, mode: CapMode, value: f64, priority: i64, scope: Layer) -> CapContribution {
        CapContribution::new("test", dim, mode, value, priority, scope)
    }

    #[test]
    fn test_clamp_non_finite() {
        let caps = Caps::new(0.0, 100.0);
        assert_eq!(caps.clamp(f64::NAN), 0.0);
        assert_eq!(caps.clamp(f64::INFINITY), 100.0);
        assert_eq!(caps.clamp(f64::NEG_INFINITY), 0.0);
        // Conflicting range: NaN lands on max like any other value.
        assert_eq!(Caps::new(10.0, 5.0).clamp(f64::NAN), 5.0);
    }

    #[test]
    fn test_first_contribution_seeds_range() {
        let caps = vec![cap("hp", CapMode::HardMax, 500.0, 10, Layer::World)];
        let folded = fold_within_layer(&caps, Layer::World);
        assert_eq!(folded["hp"], Caps::fixed(500.0));
    }

    #[test]
    fn test_fold_sorted_by_descending_priority() {
        // Highest priority seeds, then HARD_MIN lowers the floor, then ADDITIVE shifts.
        let caps = vec![
            cap("hp", CapMode::Additive, 50.0, 1, Layer::World),
            cap("hp", CapMode::Baseline, 1000.0, 100, Layer::World),
            cap("hp", CapMode::HardMin, 0.0, 50, Layer::World),
        ];
        let folded = fold_within_layer(&caps, Layer::World);
        assert_eq!(folded["hp"], Caps::new(50.0, 1050.0));
    }

    #[test]
    fn test_fold_ignores_other_layers() {
        let caps = vec![
            cap("hp", CapMode::Baseline, 100.0, 1, Layer::World),
            cap("mp", CapMode::Baseline, 30.0, 1, Layer::Guild),
        ];
        let folded = fold_within_layer(&caps, Layer::World);
        assert_eq!(folded.len(), 1);
        assert!(folded.contains_key("hp"));
    }

    #[test]
    fn test_fold_collapses_conflict() {
        let caps = vec![
            cap("hp", CapMode::Baseline, 50.0, 10, Layer::Event),
            cap("hp", CapMode::HardMax, 10.0, 5, Layer::Event),
        ];
        let folded = fold_within_layer(&caps, Layer::Event);
        assert_eq!(folded["hp"], Caps::new(10.0, 10.0));
    }

    #[test]
    fn test_override_resets_range() {
        let caps = vec![
            cap("hp", CapMode::Baseline, 50.0, 10, Layer::Total),
            cap("hp", CapMode::HardMin, 0.0, 9, Layer::Total),
            cap("hp", CapMode::Override, 75.0, 1, Layer::Total),
        ];
        let folded = fold_within_layer(&caps, Layer::Total);
        assert_eq!(folded["hp"], Caps::fixed(75.0));
    }

    #[test]
    fn test_equal_priority_keeps_input_order() {
        let caps = vec![
            cap("hp", CapMode::Baseline, 10.0, 1, Layer::Realm),
            cap("hp", CapMode::Baseline, 20.0, 1, Layer::Realm),
        ];
        let folded = fold_within_layer(&caps, Layer::Realm);
        assert_eq!(folded["hp"], Caps::fixed(20.0));
    }

    #[test]
    fn test_intersect_collapse_across_layers() {
        let mut a = EffectiveCaps::new();
        a.insert(Dimension::new("hp"), Caps::new(0.0, 10.0));
        let mut b = EffectiveCaps::new();
        b.insert(Dimension::new("hp"), Caps::new(20.0, 30.0));
        let combined = combine_across_layers(&[a, b], AcrossLayerPolicy::Intersect);
        assert_eq!(combined["hp"], Caps::new(10.0, 10.0));
    }

    #[test]
    fn test_dimension_only_in_one_layer() {
        let mut a = EffectiveCaps::new();
        a.insert(Dimension::new("hp"), Caps::new(0.0, 10.0));
        let mut b = EffectiveCaps::new();
        b.insert(Dimension::new("mp"), Caps::new(5.0, 6.0));
        let combined = combine_across_layers(&[a, b], AcrossLayerPolicy::Intersect);
        assert_eq!(combined["hp"], Caps::new(0.0, 10.0));
        assert_eq!(combined["mp"], Caps::new(5.0, 6.0));
    }

    #[test]
    fn test_validated_caps() {
        assert!(Caps::validated("hp", 0.0, 1.0).is_ok());
        assert!(matches!(
            Caps::validated("hp", 2.0, 1.0),
            Err(StatError::InvalidCaps { .. })
        ));
        assert!(Caps::validated("hp", f64::NAN, 1.0).is_err());
    }

    #[test]
    fn test_enum_strings() {
        assert_eq!("HARD_MAX".parse::<CapMode>().unwrap(), CapMode::HardMax);
        assert!("hard_max".parse::<CapMode>().is_err());
        assert_eq!("GUILD".parse::<Layer>().unwrap(), Layer::Guild);
        assert!("PLANET".parse::<Layer>().is_err());
        assert_eq!(
            "union".parse::<AcrossLayerPolicy>().unwrap(),
            AcrossLayerPolicy::Union
        );
        assert_eq!(AcrossLayerPolicy::default(), AcrossLayerPolicy::Intersect);
        assert_eq!(serde_json::to_string(&Layer::Event).unwrap(), "\"EVENT\"");
        assert_eq!(
            serde_json::to_string(&AcrossLayerPolicy::Union).unwrap(),
            "\"union\""
        );
    }
}
