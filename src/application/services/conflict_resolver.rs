use crate::application::ports::RemoteConflict;
use crate::domain::entities::{SyncConflict, SyncTask};
use crate::domain::value_objects::{ConflictResolution, EntityId, TaskOperation, TaskPayload};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// What the engine should do with a task after resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanOutcome {
    /// Some fields survived locally; push them again.
    Resend,
    /// The backend won outright; the task is superseded.
    AcceptRemote,
    /// No automatic answer; park the task for a user decision.
    Manual,
}

/// Resolution result. Pure data so the same inputs always produce the same
/// plan, making retried resolutions harmless.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionPlan {
    pub outcome: PlanOutcome,
    pub resend: TaskPayload,
    pub accept_remote: Vec<(String, Value)>,
    pub records: Vec<SyncConflict>,
    pub remap_to: Option<EntityId>,
    pub remote_version: i64,
}

impl ResolutionPlan {
    fn new(outcome: PlanOutcome, remote_version: i64) -> Self {
        Self {
            outcome,
            resend: TaskPayload::default(),
            accept_remote: Vec::new(),
            records: Vec::new(),
            remap_to: None,
            remote_version,
        }
    }
}

/// Field-level last-write-wins resolution against the server state returned
/// with a conflict rejection.
#[derive(Debug, Clone, Default)]
pub struct ConflictResolver;

impl ConflictResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(
        &self,
        task: &SyncTask,
        remote: &RemoteConflict,
        detected_at: DateTime<Utc>,
    ) -> ResolutionPlan {
        // A create that collided with an entity the server already has is
        // never pushed as a duplicate. The server copy wins and the local
        // identity moves over.
        if task.operation == TaskOperation::Create {
            if let Some(existing) = &remote.existing_entity_id {
                let mut plan = self.accept_remote_plan(task, remote, detected_at);
                plan.remap_to = Some(existing.clone());
                return plan;
            }
        }

        if remote.server_state.is_null() {
            // Entity vanished remotely while we edited it.
            if task.operation == TaskOperation::Delete {
                // Both sides deleted; nothing left to do.
                return ResolutionPlan::new(PlanOutcome::AcceptRemote, remote.remote_version);
            }
            return self.manual_plan(task, remote, detected_at);
        }

        let Some(server_fields) = remote.server_state.as_object() else {
            // Server snapshot in a shape we cannot compare field by field.
            return self.manual_plan(task, remote, detected_at);
        };

        if task.operation == TaskOperation::Delete {
            return self.resolve_delete(task, remote, detected_at);
        }

        let mut plan = ResolutionPlan::new(PlanOutcome::Resend, remote.remote_version);
        for (field, write) in task.payload.fields() {
            let Some(remote_value) = server_fields.get(field) else {
                // Field unknown to the server; nothing to fight over.
                plan.resend.insert(field.clone(), write.clone());
                continue;
            };
            if *remote_value == write.value {
                continue;
            }

            let remote_ts = remote
                .server_field_modified
                .get(field)
                .copied()
                .or(remote.server_modified_at);
            let (local_wins, needs_review) = match remote_ts {
                Some(remote_ts) if write.modified_at > remote_ts => (true, false),
                Some(remote_ts) if write.modified_at < remote_ts => (false, false),
                // Equal timestamps or no remote timestamp at all: fall back
                // to ownership, flagged for review either way.
                _ => (remote.local_actor_is_owner, true),
            };

            let resolution = if local_wins {
                ConflictResolution::LocalWins
            } else {
                ConflictResolution::RemoteWins
            };
            let mut record = SyncConflict::new(
                task.id.clone(),
                task.entity_kind.clone(),
                task.entity_id.clone(),
                field.clone(),
                write.value.clone(),
                remote_value.clone(),
                Some(write.modified_at),
                remote_ts,
                Some(resolution),
                needs_review,
                detected_at,
            );
            record.resolved_at = Some(detected_at);
            plan.records.push(record);

            if local_wins {
                plan.resend.insert(field.clone(), write.clone());
            } else {
                plan.accept_remote
                    .push((field.clone(), remote_value.clone()));
            }
        }

        if plan.resend.is_empty() {
            plan.outcome = PlanOutcome::AcceptRemote;
        }
        plan
    }

    fn resolve_delete(
        &self,
        task: &SyncTask,
        remote: &RemoteConflict,
        detected_at: DateTime<Utc>,
    ) -> ResolutionPlan {
        let newest_remote = remote
            .server_field_modified
            .values()
            .max()
            .copied()
            .or(remote.server_modified_at);
        match newest_remote {
            // Deleting under an edit someone made after the delete intent is
            // not safe to automate.
            Some(remote_ts) if remote_ts >= task.created_at => {
                self.manual_plan(task, remote, detected_at)
            }
            Some(_) => {
                let mut plan = ResolutionPlan::new(PlanOutcome::Resend, remote.remote_version);
                plan.resend = task.payload.clone();
                plan
            }
            None => self.manual_plan(task, remote, detected_at),
        }
    }

    fn accept_remote_plan(
        &self,
        task: &SyncTask,
        remote: &RemoteConflict,
        detected_at: DateTime<Utc>,
    ) -> ResolutionPlan {
        let mut plan = ResolutionPlan::new(PlanOutcome::AcceptRemote, remote.remote_version);
        let server_fields = remote.server_state.as_object();
        for (field, write) in task.payload.fields() {
            let remote_value = server_fields
                .and_then(|fields| fields.get(field))
                .cloned()
                .unwrap_or(Value::Null);
            if remote_value == write.value {
                continue;
            }
            let mut record = SyncConflict::new(
                task.id.clone(),
                task.entity_kind.clone(),
                task.entity_id.clone(),
                field.clone(),
                write.value.clone(),
                remote_value.clone(),
                Some(write.modified_at),
                remote
                    .server_field_modified
                    .get(field)
                    .copied()
                    .or(remote.server_modified_at),
                Some(ConflictResolution::RemoteWins),
                false,
                detected_at,
            );
            record.resolved_at = Some(detected_at);
            plan.records.push(record);
            plan.accept_remote.push((field.clone(), remote_value));
        }
        plan
    }

    fn manual_plan(
        &self,
        task: &SyncTask,
        remote: &RemoteConflict,
        detected_at: DateTime<Utc>,
    ) -> ResolutionPlan {
        let mut plan = ResolutionPlan::new(PlanOutcome::Manual, remote.remote_version);
        let server_fields = remote.server_state.as_object();
        if task.payload.is_empty() {
            // Delete with no field data still needs one record to surface.
            plan.records.push(SyncConflict::new(
                task.id.clone(),
                task.entity_kind.clone(),
                task.entity_id.clone(),
                "_deleted".to_string(),
                Value::Null,
                remote.server_state.clone(),
                Some(task.created_at),
                remote.server_modified_at,
                None,
                true,
                detected_at,
            ));
            return plan;
        }
        for (field, write) in task.payload.fields() {
            let remote_value = server_fields
                .and_then(|fields| fields.get(field))
                .cloned()
                .unwrap_or(Value::Null);
            plan.records.push(SyncConflict::new(
                task.id.clone(),
                task.entity_kind.clone(),
                task.entity_id.clone(),
                field.clone(),
                write.value.clone(),
                remote_value,
                Some(write.modified_at),
                remote
                    .server_field_modified
                    .get(field)
                    .copied()
                    .or(remote.server_modified_at),
                None,
                true,
                detected_at,
            ));
        }
        plan
    }
}
