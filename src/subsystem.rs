//! Subsystems: pluggable stat contributors.
//!
//! A subsystem (equipment, buffs, cultivation, guild bonuses, ...) looks at
//! an actor and returns a [`SubsystemOutput`]. The aggregator only needs
//! the three required methods; `is_active` and `validate` are optional hooks
//! with permissive defaults.

use crate::actor::Actor;
use crate::context::ResolveContext;
use crate::contribution::SubsystemOutput;
use crate::error::StatError;

/// A stat contributor.
///
/// Implementations must be deterministic for a given actor and context:
/// the aggregator's output is only as reproducible as its subsystems.
///
/// # Examples
///
/// ```rust
/// use actorstat::{Actor, Bucket, Contribution, ResolveContext, StatError, Subsystem, SubsystemOutput};
///
/// struct Equipment;
///
/// impl Subsystem for Equipment {
///     fn system_id(&self) -> &str {
///         "equipment"
///     }
///
///     fn priority(&self) -> i64 {
///         100
///     }
///
///     fn contribute(
///         &self,
///         _ctx: &ResolveContext,
///         _actor: &Actor,
///     ) -> Result<Option<SubsystemOutput>, StatError> {
///         Ok(Some(SubsystemOutput::new("equipment").with_primary(
///             Contribution::new("equipment", "atk", Bucket::Flat, 40.0),
///         )))
///     }
/// }
///
/// let output = Equipment
///     .contribute(&ResolveContext::new(), &Actor::new("hero", 1))
///     .unwrap()
///     .unwrap();
/// assert_eq!(output.primary[0].value, 40.0);
/// ```
pub trait Subsystem: Send + Sync {
    /// Unique ID used for registration.
    fn system_id(&self) -> &str;

    /// Higher priorities contribute first.
    fn priority(&self) -> i64;

    /// Produce this subsystem's contributions for `actor`.
    ///
    /// `Ok(None)` means "nothing to contribute". Errors are logged and the
    /// subsystem is skipped for this resolution.
    fn contribute(
        &self,
        ctx: &ResolveContext,
        actor: &Actor,
    ) -> Result<Option<SubsystemOutput>, StatError>;

    /// Conditional hook. Inactive subsystems are not asked to contribute.
    fn is_active(&self, _actor: &Actor) -> bool {
        true
    }

    /// Validating hook, run before `contribute`. A failure skips the subsystem.
    fn validate(&self, _actor: &Actor) -> Result<(), StatError> {
        Ok(())
    }
}

/// A subsystem that returns the same output for every actor.
///
/// Useful for data-driven contributors loaded from configuration and for
/// tests.
#[derive(Debug, Clone)]
pub struct StaticSubsystem {
    id: String,
    priority: i64,
    output: SubsystemOutput,
}

impl StaticSubsystem {
    pub fn new(id: impl Into<String>, priority: i64, output: SubsystemOutput) -> Self {
        Self {
            id: id.into(),
            priority,
            output,
        }
    }

    pub fn output(&self) -> &SubsystemOutput {
        &self.output
    }
}

impl Subsystem for StaticSubsystem {
    fn system_id(&self) -> &str {
        &self.id
    }

    fn priority(&self) -> i64 {
        self.priority
    }

    fn contribute(
        &self,
        _ctx: &ResolveContext,
        _actor: &Actor,
    ) -> Result<Option<SubsystemOutput>, StatError> {
        if self.output.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.output.clone()))
    }
}
