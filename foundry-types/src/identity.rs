//! Writer identities.
//!
//! Every remote write is stamped with the identity of the installation that
//! produced it, so conflict detection can tell "my last write" apart from
//! "another device's write".

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one installation of the planner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriterIdentity {
    /// Stable random id of this installation.
    pub instance_id: String,
    /// Human-readable device label shown in conflict prompts.
    pub display_id: String,
}

impl WriterIdentity {
    /// Creates a fresh identity with a random instance id.
    pub fn generate(display_id: impl Into<String>) -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
            display_id: display_id.into(),
        }
    }

    /// Restores a persisted identity, validating the instance id.
    pub fn parse(instance_id: &str, display_id: impl Into<String>) -> crate::Result<Self> {
        let uuid = Uuid::parse_str(instance_id)?;
        Ok(Self {
            instance_id: uuid.to_string(),
            display_id: display_id.into(),
        })
    }

    /// Returns true if `instance_id` names this installation.
    #[must_use]
    pub fn is_self(&self, instance_id: &str) -> bool {
        self.instance_id == instance_id
    }
}
