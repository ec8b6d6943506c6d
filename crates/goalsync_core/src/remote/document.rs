//! JSON document codec for remote collections.
//!
//! Documents use camelCase keys and never carry the local-only
//! `isSynced`/`isDeleted` flags; the remote holds no tombstones.

use crate::model::entity::EntityKind;
use crate::model::record::Record;
use crate::remote::{RemoteError, RemoteResult};
use serde_json::{Map, Value};

pub const UPDATED_AT_KEY: &str = "updatedAt";
const LOCAL_ONLY_KEYS: [&str; 2] = ["isSynced", "isDeleted"];

/// Field holding the owning parent id in a document of `kind`.
pub fn scope_key(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::User => "id",
        EntityKind::Profile => "userId",
        EntityKind::Goal => "profileId",
        EntityKind::Task => "goalId",
    }
}

pub fn encode(record: &Record) -> RemoteResult<Map<String, Value>> {
    let value = match record {
        Record::User(user) => serde_json::to_value(user)?,
        Record::Profile(profile) => serde_json::to_value(profile)?,
        Record::Goal(goal) => serde_json::to_value(goal)?,
        Record::Task(task) => serde_json::to_value(task)?,
    };
    let Value::Object(mut document) = value else {
        return Err(RemoteError::Codec(format!(
            "{} did not encode to a JSON object",
            record.kind()
        )));
    };
    for key in LOCAL_ONLY_KEYS {
        document.remove(key);
    }
    Ok(document)
}

/// Decodes a stored document; the result is marked synced and live.
pub fn decode(kind: EntityKind, document: &Map<String, Value>) -> RemoteResult<Record> {
    let value = Value::Object(document.clone());
    let mut record = match kind {
        EntityKind::User => Record::User(serde_json::from_value(value)?),
        EntityKind::Profile => Record::Profile(serde_json::from_value(value)?),
        EntityKind::Goal => Record::Goal(serde_json::from_value(value)?),
        EntityKind::Task => Record::Task(serde_json::from_value(value)?),
    };
    let meta = record.meta_mut();
    meta.is_synced = true;
    meta.is_deleted = false;
    Ok(record)
}

pub fn updated_at(document: &Map<String, Value>) -> Option<i64> {
    document.get(UPDATED_AT_KEY).and_then(Value::as_i64)
}

pub fn scope_id(kind: EntityKind, document: &Map<String, Value>) -> Option<&str> {
    document.get(scope_key(kind)).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::{decode, encode, scope_id, updated_at};
    use crate::model::entity::{EntityKind, Status};
    use crate::model::goal::Goal;
    use crate::model::record::Record;

    #[test]
    fn encoded_documents_hide_local_flags() {
        let mut goal = Goal::new("p1", "Ship v1", "first release");
        goal.meta.updated_at = 1_000;
        goal.meta.is_deleted = true;
        goal.status = Status::Closed;

        let document = encode(&Record::from(goal)).expect("goal should encode");
        assert!(!document.contains_key("isSynced"));
        assert!(!document.contains_key("isDeleted"));
        assert_eq!(document.get("order").and_then(|v| v.as_i64()), Some(0));
        assert_eq!(document.get("status").and_then(|v| v.as_str()), Some("closed"));
        assert_eq!(updated_at(&document), Some(1_000));
        assert_eq!(scope_id(EntityKind::Goal, &document), Some("p1"));
    }

    #[test]
    fn decoded_documents_are_synced() {
        let mut goal = Goal::new("p1", "Ship v1", "");
        goal.meta.updated_at = 7;
        let document = encode(&Record::from(goal.clone())).expect("goal should encode");

        let Record::Goal(decoded) = decode(EntityKind::Goal, &document).expect("decode") else {
            panic!("expected goal record");
        };
        assert_eq!(decoded.id, goal.id);
        assert_eq!(decoded.meta.updated_at, 7);
        assert!(decoded.meta.is_synced);
        assert!(!decoded.meta.is_deleted);
    }

    #[test]
    fn decode_rejects_wrong_shape() {
        let mut document = serde_json::Map::new();
        document.insert("id".to_string(), serde_json::Value::from("g1"));
        assert!(decode(EntityKind::Goal, &document).is_err());
    }
}
