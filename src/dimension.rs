//! Stat dimension identifiers.
//!
//! A `Dimension` names one stat (`hp_max`, `crit_chance`, ...). It is an
//! interned `Arc<str>`, so cloning it into contributions, caps and snapshots
//! is cheap and comparison is a plain string compare.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::Arc;

/// Interned name of a stat dimension.
///
/// Dimensions order lexicographically, which is what keeps snapshot maps
/// and cap tables in a stable iteration order.
///
/// # Examples
///
/// ```rust
/// use actorstat::Dimension;
///
/// let hp = Dimension::new("hp_max");
/// let hp2: Dimension = "hp_max".into();
/// let hp3: Dimension = String::from("hp_max").into();
///
/// assert_eq!(hp, hp2);
/// assert_eq!(hp, hp3);
/// assert!(Dimension::new("atk") < hp);
/// ```
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Dimension(Arc<str>);

impl Serialize for Dimension {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.as_ref().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Dimension {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Dimension::from(s))
    }
}

impl Dimension {
    /// Create a dimension from a string slice.
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    /// The dimension name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `true` when the name is empty or only whitespace.
    ///
    /// Blank dimensions are rejected everywhere a dimension enters the
    /// engine (contributions, rules, formulas).
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for Dimension {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Dimension {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl AsRef<str> for Dimension {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for Dimension {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
