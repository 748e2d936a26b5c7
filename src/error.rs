//! Error types for stat aggregation and formula resolution.
//!
//! Every fallible operation in the crate returns `StatError`. Each variant
//! belongs to one `ErrorCategory`, which tells the caller whether the input
//! was rejected, an operation hit a missing or conflicting registration, or
//! a resource (cache, deadline, file) failed.

use crate::caps::Layer;
use crate::dimension::Dimension;
use thiserror::Error;

/// Format a cycle path as a readable string.
fn format_cycle_path(path: &[Dimension]) -> String {
    if path.is_empty() {
        return String::from("(empty cycle)");
    }
    path.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Origin of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed rule, config or input. Rejected before any state changes.
    Validation,
    /// Missing or conflicting registration, unknown name, dependency cycle.
    System,
    /// Cache failure, cancellation, deadline or I/O.
    Resource,
}

/// Errors produced by the engine.
///
/// # Examples
///
/// ```rust
/// use actorstat::{ErrorCategory, StatError};
///
/// let err = StatError::DuplicateSubsystem("equipment".into());
/// assert_eq!(err.to_string(), "Subsystem already registered: equipment");
/// assert_eq!(err.category(), ErrorCategory::System);
/// ```
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StatError {
    /// A dimension name was empty.
    #[error("Dimension name cannot be empty")]
    EmptyDimension,

    /// A string did not name a known bucket, cap mode, layer, policy or operator.
    #[error("Unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },

    /// A caller-supplied cap range had `min > max` or a non-finite bound.
    #[error("Invalid caps for {dimension}: min {min} > max {max}")]
    InvalidCaps {
        dimension: String,
        min: f64,
        max: f64,
    },

    /// A merge rule failed validation.
    #[error("Invalid merge rule for {dimension}: {reason}")]
    InvalidRule { dimension: String, reason: String },

    /// A formula definition failed validation.
    #[error("Invalid formula {name}: {reason}")]
    InvalidFormula { name: String, reason: String },

    /// A resolved stat value is outside its allowed range.
    #[error("Invalid value for {stat}: {value} ({reason})")]
    InvalidStat {
        stat: Dimension,
        value: f64,
        reason: String,
    },

    /// Any other rejected input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A configuration document could not be parsed.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A subsystem with the same ID is already registered.
    #[error("Subsystem already registered: {0}")]
    DuplicateSubsystem(String),

    /// No subsystem is registered under this ID.
    #[error("Subsystem not found: {0}")]
    SubsystemNotFound(String),

    /// A subsystem reported a failure while contributing.
    #[error("Subsystem {system} failed: {reason}")]
    Subsystem { system: String, reason: String },

    /// Caps were requested for a layer that is not part of the layer order.
    #[error("Layer {0} is not in the layer order")]
    LayerNotRegistered(Layer),

    /// No formula is registered under this name.
    #[error("Unknown formula: {0}")]
    UnknownFormula(Dimension),

    /// A formula with the same name is already registered.
    #[error("Formula already registered: {0}")]
    DuplicateFormula(Dimension),

    /// A formula read a stat that is neither derived nor primary.
    #[error("Missing dependency: {0}")]
    MissingDependency(Dimension),

    /// A dependency cycle was detected among formulas.
    ///
    /// The path is closed: if A depends on B, B on C and C on A, the path
    /// is `[A, B, C, A]`.
    #[error("Cycle detected: {}", format_cycle_path(.path))]
    Cycle { path: Vec<Dimension> },

    /// Evaluation was requested before a dependency order was built.
    #[error("Formula order has not been built")]
    OrderNotBuilt,

    /// The cache is at capacity and its policy forbids eviction.
    #[error("Cache is full (max size {max_size})")]
    CacheFull { max_size: usize },

    /// A key was not present in the cache.
    #[error("Cache key not found: {0}")]
    CacheKeyNotFound(String),

    /// A TTL string could not be parsed.
    #[error("Invalid TTL: {0}")]
    InvalidTtl(String),

    /// The resolution context was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// The resolution context's deadline passed.
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// Reading or writing a document failed.
    #[error("I/O error: {0}")]
    Io(String),
}

impl StatError {
    /// The failure category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            StatError::EmptyDimension
            | StatError::UnknownVariant { .. }
            | StatError::InvalidCaps { .. }
            | StatError::InvalidRule { .. }
            | StatError::InvalidFormula { .. }
            | StatError::InvalidStat { .. }
            | StatError::InvalidInput(_)
            | StatError::Config(_) => ErrorCategory::Validation,
            StatError::DuplicateSubsystem(_)
            | StatError::SubsystemNotFound(_)
            | StatError::Subsystem { .. }
            | StatError::LayerNotRegistered(_)
            | StatError::UnknownFormula(_)
            | StatError::DuplicateFormula(_)
            | StatError::MissingDependency(_)
            | StatError::Cycle { .. }
            | StatError::OrderNotBuilt => ErrorCategory::System,
            StatError::CacheFull { .. }
            | StatError::CacheKeyNotFound(_)
            | StatError::InvalidTtl(_)
            | StatError::Cancelled
            | StatError::DeadlineExceeded
            | StatError::Io(_) => ErrorCategory::Resource,
        }
    }

    pub(crate) fn unknown(kind: &'static str, value: impl Into<String>) -> Self {
        StatError::UnknownVariant {
            kind,
            value: value.into(),
        }
    }
}

impl From<std::io::Error> for StatError {
    fn from(err: std::io::Error) -> Self {
        StatError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StatError {
    fn from(err: serde_json::Error) -> Self {
        StatError::Config(err.to_string())
    }
}
