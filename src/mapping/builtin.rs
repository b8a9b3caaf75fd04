//! Built-in field mappers

use super::mapper::{PostMapContext, PostMapper, PreMapper};
use crate::entity::{Attributes, EntityKind, LocalEntity, LocalId, Relation};
use crate::error::{SyncError, SyncResult};
use crate::identity::IdentityMap;
use crate::storage::{EntityFilter, PredicateOp};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use serde_json::Value;

/// Resolves a relation through a completed identity map and writes `<field>_id`.
pub struct MapToLocalId {
    identity: IdentityMap,
}

impl MapToLocalId {
    pub fn new(identity: IdentityMap) -> Self {
        Self { identity }
    }
}

impl PreMapper for MapToLocalId {
    fn map(&self, field: &str, value: &Value, mut target: Attributes) -> SyncResult<Attributes> {
        let local = match Relation::from_value(value)? {
            Some(relation) => Value::String(self.identity.resolve(field, &relation)?.to_string()),
            None => Value::Null,
        };
        target.insert(format!("{field}_id"), local);
        Ok(target)
    }
}

/// Flattens `{lang: text}` into `<field>_<lang>` columns plus `<field>`.
///
/// `<field>` holds the first configured language's text, falling back to the
/// next configured language that has one.
pub struct Multilingual {
    languages: Vec<String>,
}

impl Multilingual {
    pub fn new<S: Into<String>>(languages: impl IntoIterator<Item = S>) -> Self {
        Self {
            languages: languages.into_iter().map(Into::into).collect(),
        }
    }
}

impl PreMapper for Multilingual {
    fn map(&self, field: &str, value: &Value, mut target: Attributes) -> SyncResult<Attributes> {
        let translations = value.as_object();
        let text = |lang: &str| {
            translations
                .and_then(|t| t.get(lang))
                .filter(|v| !v.is_null())
                .cloned()
        };

        for lang in &self.languages {
            target.insert(format!("{field}_{lang}"), text(lang.as_str()).unwrap_or(Value::Null));
        }
        let default = self.languages.iter().find_map(|lang| text(lang.as_str()));
        target.insert(field.to_string(), default.unwrap_or(Value::Null));
        Ok(target)
    }
}

/// Normalizes a timestamp to UTC RFC 3339 with second precision.
///
/// Offset-less values are read as UTC; a bare date is midnight UTC.
pub struct Timestamp;

impl Timestamp {
    fn normalize(field: &str, raw: &str) -> SyncResult<String> {
        let parsed = DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|_| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|dt| dt.and_utc())
            })
            .or_else(|_| {
                NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .map(|d| d.and_time(NaiveTime::MIN).and_utc())
            })
            .map_err(|e| SyncError::InvalidRecord(format!("{field}: cannot parse '{raw}': {e}")))?;
        Ok(parsed.to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

impl PreMapper for Timestamp {
    fn map(&self, field: &str, value: &Value, mut target: Attributes) -> SyncResult<Attributes> {
        let normalized = match value {
            Value::Null => Value::Null,
            Value::String(raw) => Value::String(Self::normalize(field, raw)?),
            other => {
                return Err(SyncError::InvalidRecord(format!(
                    "{field}: expected a timestamp string, got {other}"
                )))
            }
        };
        target.insert(field.to_string(), normalized);
        Ok(target)
    }
}

/// Resolves an array of relations into a de-duplicated list of local ids.
pub struct MapToLocalIds {
    identity: IdentityMap,
}

impl MapToLocalIds {
    pub fn new(identity: IdentityMap) -> Self {
        Self { identity }
    }
}

impl PostMapper for MapToLocalIds {
    fn map(
        &self,
        field: &str,
        value: &Value,
        mut target: Attributes,
        _ctx: &PostMapContext<'_>,
    ) -> SyncResult<Attributes> {
        let mut ids: Vec<LocalId> = Vec::new();
        for item in value.as_array().into_iter().flatten() {
            let Some(relation) = Relation::from_value(item)? else {
                continue;
            };
            let id = self.identity.resolve(field, &relation)?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        target.insert(
            field.to_string(),
            Value::Array(ids.into_iter().map(|id| Value::String(id.to_string())).collect()),
        );
        Ok(target)
    }
}

/// Replaces the child entities of the saved entity with one child per
/// element of the field's array.
///
/// Children carry `<parent_attribute>` = parent id and `position` = index.
/// When the stored children already match, nothing is rewritten.
pub struct RecreateChildren {
    child_kind: EntityKind,
    parent_attribute: String,
    allowed_fields: Vec<String>,
}

impl RecreateChildren {
    pub fn new<S: Into<String>>(
        child_kind: EntityKind,
        parent_attribute: impl Into<String>,
        allowed_fields: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            child_kind,
            parent_attribute: parent_attribute.into(),
            allowed_fields: allowed_fields.into_iter().map(Into::into).collect(),
        }
    }

    fn desired_children(&self, field: &str, value: &Value, parent: &LocalId) -> SyncResult<Vec<Attributes>> {
        let items = match value {
            Value::Null => return Ok(Vec::new()),
            Value::Array(items) => items,
            other => {
                return Err(SyncError::InvalidRecord(format!(
                    "{field}: expected an array, got {other}"
                )))
            }
        };

        items
            .iter()
            .enumerate()
            .map(|(position, item)| {
                let mut attributes = item.as_object().cloned().ok_or_else(|| {
                    SyncError::InvalidRecord(format!("{field}[{position}]: expected an object"))
                })?;
                attributes.insert(self.parent_attribute.clone(), Value::String(parent.to_string()));
                attributes.insert("position".to_string(), Value::from(position));
                Ok(attributes)
            })
            .collect()
    }
}

impl PostMapper for RecreateChildren {
    fn map(
        &self,
        field: &str,
        value: &Value,
        target: Attributes,
        ctx: &PostMapContext<'_>,
    ) -> SyncResult<Attributes> {
        if !self.allowed_fields.iter().any(|f| f == field) {
            return Err(SyncError::RecreateNotAllowed {
                field: field.to_string(),
            });
        }

        let parent = ctx.entity;
        let filter = EntityFilter::new(self.child_kind)
            .with_data_source(parent.data_source.clone())
            .with_predicate(
                self.parent_attribute.clone(),
                PredicateOp::Eq,
                Value::String(parent.id.to_string()),
            );

        let desired = self.desired_children(field, value, &parent.id)?;
        let mut current = ctx.store.query(&filter)?;
        current.sort_by_key(|child| child.attribute("position").and_then(Value::as_u64));
        let unchanged = current.len() == desired.len()
            && current.iter().zip(&desired).all(|(c, d)| &c.attributes == d);
        if unchanged {
            return Ok(target);
        }

        ctx.store.delete(&filter)?;
        for attributes in desired {
            let child = LocalEntity::new(self.child_kind, LocalId::generate(), parent.data_source.clone())
                .with_attributes(attributes);
            ctx.store.create(&child)?;
        }
        Ok(target)
    }
}

/// Resolves a parent reference through the kind's own completed map and
/// writes `<field>_id`.
pub struct MapToSelfId;

impl PostMapper for MapToSelfId {
    fn map(
        &self,
        field: &str,
        value: &Value,
        mut target: Attributes,
        ctx: &PostMapContext<'_>,
    ) -> SyncResult<Attributes> {
        let local = match Relation::from_value(value)? {
            Some(relation) => Value::String(ctx.identity.resolve(field, &relation)?.to_string()),
            None => Value::Null,
        };
        target.insert(format!("{field}_id"), local);
        Ok(target)
    }
}
