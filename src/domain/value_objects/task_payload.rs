use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A single field edit together with the moment the user made it. The
/// timestamp travels with the payload so conflict resolution can compare
/// per-field recency instead of whole-record recency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldWrite {
    pub value: Value,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub modified_at: DateTime<Utc>,
}

/// Field-level payload of a queued mutation. Empty payloads are valid for
/// deletes, which carry no field data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPayload(BTreeMap<String, FieldWrite>);

impl TaskPayload {
    pub fn new(fields: BTreeMap<String, FieldWrite>) -> Self {
        Self(fields)
    }

    /// Builds a payload from a plain JSON object, stamping every field with
    /// the same modification time.
    pub fn from_object(value: &Value, modified_at: DateTime<Utc>) -> Result<Self, String> {
        let object = value
            .as_object()
            .ok_or_else(|| "Payload must be a JSON object".to_string())?;
        let mut fields = BTreeMap::new();
        for (name, field_value) in object {
            fields.insert(
                name.clone(),
                FieldWrite {
                    value: field_value.clone(),
                    modified_at,
                },
            );
        }
        Ok(Self(fields))
    }

    pub fn from_json_str(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| format!("Invalid task payload: {e}"))
    }

    pub fn insert(&mut self, field: impl Into<String>, write: FieldWrite) {
        self.0.insert(field.into(), write);
    }

    pub fn get(&self, field: &str) -> Option<&FieldWrite> {
        self.0.get(field)
    }

    pub fn remove(&mut self, field: &str) -> Option<FieldWrite> {
        self.0.remove(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &FieldWrite)> {
        self.0.iter()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Folds another payload in, keeping the newest write per field. An
    /// incoming write wins a timestamp tie because it was enqueued later.
    pub fn merge_newer(&mut self, other: &TaskPayload) {
        for (name, incoming) in &other.0 {
            match self.0.get(name) {
                Some(existing) if existing.modified_at > incoming.modified_at => {}
                _ => {
                    self.0.insert(name.clone(), incoming.clone());
                }
            }
        }
    }

    /// Plain `{field: value}` object, as the backend expects it on the wire.
    pub fn values_json(&self) -> Value {
        let mut object = Map::new();
        for (name, write) in &self.0 {
            object.insert(name.clone(), write.value.clone());
        }
        Value::Object(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write(value: Value, millis: i64) -> FieldWrite {
        FieldWrite {
            value,
            modified_at: DateTime::from_timestamp_millis(millis).unwrap(),
        }
    }

    #[test]
    fn test_from_object_stamps_every_field() {
        let at = Utc::now();
        let payload =
            TaskPayload::from_object(&json!({"status": "passed", "note": "ok"}), at).unwrap();
        assert_eq!(payload.len(), 2);
        assert_eq!(payload.get("status").unwrap().modified_at, at);
        assert_eq!(payload.get("note").unwrap().value, json!("ok"));
    }

    #[test]
    fn test_from_object_rejects_non_objects() {
        let at = Utc::now();
        assert!(TaskPayload::from_object(&json!(null), at).is_err());
        assert!(TaskPayload::from_object(&json!([1, 2]), at).is_err());
        assert!(TaskPayload::from_object(&json!("text"), at).is_err());
    }

    #[test]
    fn test_merge_newer_keeps_newest_per_field() {
        let mut base = TaskPayload::default();
        base.insert("status", write(json!("failed"), 1_000));
        base.insert("note", write(json!("crack in wall"), 3_000));

        let mut incoming = TaskPayload::default();
        incoming.insert("status", write(json!("passed"), 2_000));
        incoming.insert("note", write(json!("stale note"), 2_000));

        base.merge_newer(&incoming);

        assert_eq!(base.get("status").unwrap().value, json!("passed"));
        assert_eq!(base.get("note").unwrap().value, json!("crack in wall"));
    }

    #[test]
    fn test_merge_newer_tie_takes_incoming() {
        let mut base = TaskPayload::default();
        base.insert("status", write(json!("old"), 5_000));
        let mut incoming = TaskPayload::default();
        incoming.insert("status", write(json!("new"), 5_000));

        base.merge_newer(&incoming);
        assert_eq!(base.get("status").unwrap().value, json!("new"));
    }

    #[test]
    fn test_merge_newer_adds_unknown_fields() {
        let mut base = TaskPayload::default();
        base.insert("status", write(json!("passed"), 1_000));
        let mut incoming = TaskPayload::default();
        incoming.insert("score", write(json!(87), 1_000));

        base.merge_newer(&incoming);
        assert_eq!(base.len(), 2);
        assert_eq!(base.get("score").unwrap().value, json!(87));
    }

    #[test]
    fn test_values_json_strips_timestamps() {
        let mut payload = TaskPayload::default();
        payload.insert("status", write(json!("passed"), 1_000));
        payload.insert("score", write(json!(87), 2_000));
        assert_eq!(
            payload.values_json(),
            json!({"status": "passed", "score": 87})
        );
    }

    #[test]
    fn test_round_trips_through_json() {
        let mut payload = TaskPayload::default();
        payload.insert("status", write(json!("passed"), 1_000));
        let encoded = serde_json::to_string(&payload).unwrap();
        let decoded = TaskPayload::from_json_str(&encoded).unwrap();
        assert_eq!(decoded, payload);
    }
}
