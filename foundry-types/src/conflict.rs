//! Conflict descriptions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Describes a remote copy written by another device after this client's last
/// known sync point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictInfo {
    /// The factory in conflict.
    pub entity_name: String,
    /// When the remote copy was written.
    pub cloud_timestamp: DateTime<Utc>,
    /// Instance id of the device that wrote the remote copy.
    pub cloud_instance_id: String,
    /// Human-readable label of that device.
    pub cloud_display_id: String,
    /// This client's last known sync point, if it ever synced the factory.
    pub local_timestamp: Option<DateTime<Utc>>,
}

impl fmt::Display for ConflictInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\"{}\" was modified on {} at {}",
            self.entity_name,
            self.cloud_display_id,
            self.cloud_timestamp.to_rfc3339()
        )
    }
}
