//! Records as received from the remote side

use crate::error::{SyncError, SyncResult};
use serde_json::{Map, Value};

/// An immutable remote record keyed by its origin id.
#[derive(Debug, Clone, PartialEq)]
pub struct OriginRecord {
    origin_id: String,
    fields: Map<String, Value>,
}

impl OriginRecord {
    /// Build a record from a JSON value.
    ///
    /// The origin id is read from `id` (string or integer) or, failing that,
    /// from a JSON-LD `@id` URL.
    pub fn from_value(value: Value) -> SyncResult<Self> {
        match value {
            Value::Object(fields) => Self::from_map(fields),
            other => Err(SyncError::InvalidRecord(format!(
                "expected an object, got {}",
                other
            ))),
        }
    }

    pub fn from_map(fields: Map<String, Value>) -> SyncResult<Self> {
        let origin_id = fields
            .get("id")
            .and_then(scalar_id)
            .or_else(|| {
                fields
                    .get("@id")
                    .and_then(Value::as_str)
                    .and_then(parse_jsonld_id)
            })
            .ok_or_else(|| SyncError::InvalidRecord("record has no id".to_string()))?;
        Ok(Self { origin_id, fields })
    }

    pub fn origin_id(&self) -> &str {
        &self.origin_id
    }

    /// Raw field value, if present
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Raw field value, `Null` when absent
    pub fn value(&self, field: &str) -> &Value {
        self.fields.get(field).unwrap_or(&Value::Null)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Origin id of the relation stored in `field`, if any
    pub fn relation_id(&self, field: &str) -> SyncResult<Option<String>> {
        relation_id(self.value(field))
    }
}

/// A nested relation inside an origin record.
#[derive(Debug, Clone, PartialEq)]
pub enum Relation {
    /// The related record is embedded in full
    Embedded(OriginRecord),
    /// Only the related record's id is known (bare id or JSON-LD `@id`)
    Reference(String),
}

impl Relation {
    /// Interpret a raw field value as a relation.
    ///
    /// `Null` and the empty string mean no relation. A value that names no
    /// usable id is an [`SyncError::InvalidRecord`].
    pub fn from_value(value: &Value) -> SyncResult<Option<Self>> {
        let relation = match value {
            Value::Null => return Ok(None),
            Value::String(s) if s.is_empty() => return Ok(None),
            Value::Object(map) if map.contains_key("id") => {
                return OriginRecord::from_map(map.clone()).map(|r| Some(Self::Embedded(r)));
            }
            Value::Object(map) => map
                .get("@id")
                .and_then(Value::as_str)
                .and_then(parse_jsonld_id)
                .map(Self::Reference),
            Value::String(s) if s.starts_with("http://") || s.starts_with("https://") => {
                parse_jsonld_id(s).map(Self::Reference)
            }
            other => scalar_id(other).map(Self::Reference),
        };
        relation
            .map(Some)
            .ok_or_else(|| SyncError::InvalidRecord(format!("unusable relation {}", value)))
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Embedded(record) => record.origin_id(),
            Self::Reference(id) => id,
        }
    }

    pub fn embedded(&self) -> Option<&OriginRecord> {
        match self {
            Self::Embedded(record) => Some(record),
            Self::Reference(_) => None,
        }
    }
}

/// Origin id of a relation value
pub fn relation_id(value: &Value) -> SyncResult<Option<String>> {
    Ok(Relation::from_value(value)?.map(|r| r.id().to_string()))
}

/// Extract the id from a JSON-LD resource URL.
///
/// `https://api.example/linkedevents/v1/place/tprek:8100/` → `tprek:8100`
fn parse_jsonld_id(url: &str) -> Option<String> {
    url.split('?')
        .next()
        .unwrap_or(url)
        .split('/')
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
}

fn scalar_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
