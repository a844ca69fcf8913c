use crate::domain::value_objects::{EntityId, EntityKind, EntitySyncState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Local materialized view of one entity. `local_version` advances on every
/// local edit, `remote_version` only once the backend confirms.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityRecord {
    pub entity_kind: EntityKind,
    pub entity_id: EntityId,
    pub local_version: i64,
    pub remote_version: Option<i64>,
    pub snapshot: Value,
    pub sync_state: EntitySyncState,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl EntityRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        entity_kind: EntityKind,
        entity_id: EntityId,
        local_version: i64,
        remote_version: Option<i64>,
        snapshot: Value,
        sync_state: EntitySyncState,
        last_synced_at: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            entity_kind,
            entity_id,
            local_version,
            remote_version,
            snapshot,
            sync_state,
            last_synced_at,
            updated_at,
        }
    }

    pub fn has_unsynced_changes(&self) -> bool {
        matches!(
            self.sync_state,
            EntitySyncState::Pending | EntitySyncState::InFlight | EntitySyncState::Conflicted
        )
    }
}
