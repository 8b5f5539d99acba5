use std::fmt;

use serde::de::DeserializeOwned;

use crate::{
    reconcile::Identified,
    store::{decode_row, RawChange, StoreError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

impl ChangeKind {
    /// Classify a feed event tag. Unknown tags yield `None`.
    pub fn from_event_type(event_type: &str) -> Option<Self> {
        match event_type {
            "INSERT" => Some(ChangeKind::Created),
            "UPDATE" => Some(ChangeKind::Modified),
            "DELETE" => Some(ChangeKind::Removed),
            _ => None,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeKind::Created => "INSERT",
            ChangeKind::Modified => "UPDATE",
            ChangeKind::Removed => "DELETE",
        })
    }
}

/// A row change, decoded once at the feed boundary.
///
/// Creates and updates carry the new row; a removal carries only the id of
/// the row that went away.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent<T: Identified> {
    Created(T),
    Modified(T),
    Removed(T::Id),
}

impl<T: Identified> ChangeEvent<T> {
    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeEvent::Created(_) => ChangeKind::Created,
            ChangeEvent::Modified(_) => ChangeKind::Modified,
            ChangeEvent::Removed(_) => ChangeKind::Removed,
        }
    }

    pub fn id(&self) -> &T::Id {
        match self {
            ChangeEvent::Created(row) | ChangeEvent::Modified(row) => row.id(),
            ChangeEvent::Removed(id) => id,
        }
    }
}

impl<T: Identified + DeserializeOwned> ChangeEvent<T> {
    /// Decode a raw payload. Returns `Ok(None)` for event kinds the feed may
    /// add later.
    pub fn decode(raw: RawChange) -> Result<Option<Self>, StoreError> {
        let Some(kind) = ChangeKind::from_event_type(&raw.event_type) else {
            return Ok(None);
        };

        let event = match kind {
            ChangeKind::Created => ChangeEvent::Created(decode_row(raw.new)?),
            ChangeKind::Modified => ChangeEvent::Modified(decode_row(raw.new)?),
            ChangeKind::Removed => {
                let id = raw
                    .old
                    .get("id")
                    .cloned()
                    .filter(|value| !value.is_null())
                    .ok_or_else(|| {
                        StoreError::decode(format!("{} DELETE payload carries no id", raw.table))
                    })?;
                ChangeEvent::Removed(serde_json::from_value::<T::Id>(id)?)
            }
        };
        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::{
        models::{Movement, ThroughputCounter},
        store::{Row, Table},
    };

    fn as_row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => Row::new(),
        }
    }

    fn movement_row(id: &str) -> Row {
        as_row(json!({
            "id": id,
            "saree_id": "S-1001",
            "from_station": "Inspection",
            "to_station": "Dyeing",
            "timestamp": "2024-03-01T10:00:00Z",
            "created_at": "2024-03-01T10:00:00Z",
        }))
    }

    #[test]
    fn decodes_each_known_kind() {
        let created = ChangeEvent::<Movement>::decode(RawChange::insert(
            Table::Movements,
            movement_row("m-1"),
        ))
        .unwrap()
        .unwrap();
        assert_eq!(created.kind(), ChangeKind::Created);
        assert_eq!(created.id(), "m-1");

        let modified = ChangeEvent::<Movement>::decode(RawChange::update(
            Table::Movements,
            movement_row("m-1"),
            movement_row("m-1"),
        ))
        .unwrap()
        .unwrap();
        assert_eq!(modified.kind(), ChangeKind::Modified);

        let removed = ChangeEvent::<Movement>::decode(RawChange::delete(
            Table::Movements,
            as_row(json!({ "id": "m-1" })),
        ))
        .unwrap()
        .unwrap();
        assert_eq!(removed, ChangeEvent::Removed("m-1".to_string()));
    }

    #[test]
    fn numeric_ids_decode_for_counter_rows() {
        let removed = ChangeEvent::<ThroughputCounter>::decode(RawChange::delete(
            Table::Throughput,
            as_row(json!({ "id": 7 })),
        ))
        .unwrap()
        .unwrap();
        assert_eq!(removed, ChangeEvent::Removed(7));
    }

    #[test]
    fn unknown_event_types_are_skipped() {
        let mut raw = RawChange::insert(Table::Movements, movement_row("m-1"));
        raw.event_type = "TRUNCATE".into();
        assert_eq!(ChangeEvent::<Movement>::decode(raw).unwrap(), None);
    }

    #[test]
    fn malformed_rows_are_decode_errors() {
        let raw = RawChange::insert(Table::Movements, as_row(json!({ "id": "m-2" })));
        let err = ChangeEvent::<Movement>::decode(raw).unwrap_err();
        assert!(matches!(err, StoreError::Decode { .. }));

        let raw = RawChange::delete(Table::Movements, Row::new());
        assert!(ChangeEvent::<Movement>::decode(raw).is_err());
    }
}
