//! Persisted entities

use super::id::{DataSourceId, LocalId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Entity attributes: field name to JSON value
pub type Attributes = Map<String, Value>;

/// How the reconciler removes an entity that disappeared remotely
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletePolicy {
    /// Remove the row
    Hard,
    /// Keep the row and set its `deleted` attribute to `true`
    Soft,
}

/// Entity types known to the synchronizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Organization,
    Place,
    Keyword,
    Event,
    Offer,
    ExternalLink,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Organization => "organization",
            Self::Place => "place",
            Self::Keyword => "keyword",
            Self::Event => "event",
            Self::Offer => "offer",
            Self::ExternalLink => "external_link",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "organization" => Some(Self::Organization),
            "place" => Some(Self::Place),
            "keyword" => Some(Self::Keyword),
            "event" => Some(Self::Event),
            "offer" => Some(Self::Offer),
            "external_link" => Some(Self::ExternalLink),
            _ => None,
        }
    }

    /// Kinds whose local ids are generated rather than reused from the origin id.
    pub fn uses_auto_pk(&self) -> bool {
        matches!(self, Self::Organization | Self::Offer | Self::ExternalLink)
    }

    pub fn delete_policy(&self) -> DeletePolicy {
        match self {
            Self::Event => DeletePolicy::Soft,
            _ => DeletePolicy::Hard,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityMetadata {
    /// When the entity was created locally
    pub created_at: Option<DateTime<Utc>>,
    /// When the entity attributes last changed
    pub modified_at: Option<DateTime<Utc>>,
}

/// A record in the local store, owned by one data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalEntity {
    /// Unique identifier within the entity kind
    pub id: LocalId,
    pub kind: EntityKind,
    /// Owning data source
    pub data_source: DataSourceId,
    /// Identifier on the remote side; `None` for entities the synchronizer did not create
    pub origin_id: Option<String>,
    /// Kind-specific fields
    pub attributes: Attributes,
    pub metadata: EntityMetadata,
}

impl LocalEntity {
    /// Create a new entity with empty attributes
    pub fn new(kind: EntityKind, id: LocalId, data_source: DataSourceId) -> Self {
        Self {
            id,
            kind,
            data_source,
            origin_id: None,
            attributes: Attributes::new(),
            metadata: EntityMetadata {
                created_at: Some(Utc::now()),
                ..Default::default()
            },
        }
    }

    pub fn with_origin_id(mut self, origin_id: impl Into<String>) -> Self {
        self.origin_id = Some(origin_id.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes.extend(attributes);
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// String value of an attribute, if it is a string
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    /// True if every attribute in `update` already holds the same value.
    pub fn has_attributes(&self, update: &Attributes) -> bool {
        update
            .iter()
            .all(|(k, v)| self.attributes.get(k).unwrap_or(&Value::Null) == v)
    }

    /// True if the entity was soft-deleted
    pub fn is_deleted(&self) -> bool {
        self.attributes.get("deleted") == Some(&Value::Bool(true))
    }
}
