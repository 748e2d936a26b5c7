//! The actor being resolved.

use serde::{Deserialize, Serialize};

/// Identity of an actor: its ID and the version stamped onto snapshots.
///
/// Actors are owned by the host; the engine only reads them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    #[serde(default)]
    pub version: i64,
}

impl Actor {
    pub fn new(id: impl Into<String>, version: i64) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }
}
