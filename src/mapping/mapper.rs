//! Field mapper traits and registry

use crate::entity::{Attributes, LocalEntity};
use crate::error::SyncResult;
use crate::identity::IdentityMap;
use crate::storage::EntityStore;
use serde_json::Value;

/// A phase-1 mapper bound to one field.
///
/// Receives the raw field value (`Null` when absent) and the attributes
/// accumulated so far, and returns the new accumulation.
pub trait PreMapper: Send + Sync {
    fn map(&self, field: &str, value: &Value, target: Attributes) -> SyncResult<Attributes>;
}

impl<F> PreMapper for F
where
    F: Fn(&str, &Value, Attributes) -> SyncResult<Attributes> + Send + Sync,
{
    fn map(&self, field: &str, value: &Value, target: Attributes) -> SyncResult<Attributes> {
        self(field, value, target)
    }
}

/// What a post-mapper can see besides the raw value.
pub struct PostMapContext<'a> {
    /// The entity as saved by phase 1
    pub entity: &'a LocalEntity,
    /// The completed identity map of the entity's own kind
    pub identity: &'a IdentityMap,
    pub store: &'a dyn EntityStore,
}

/// A phase-2 mapper bound to one field.
///
/// Called with an empty attribute map; the returned attributes are applied
/// to the saved entity as a second write.
pub trait PostMapper: Send + Sync {
    fn map(
        &self,
        field: &str,
        value: &Value,
        target: Attributes,
        ctx: &PostMapContext<'_>,
    ) -> SyncResult<Attributes>;
}

impl<F> PostMapper for F
where
    F: Fn(&str, &Value, Attributes, &PostMapContext<'_>) -> SyncResult<Attributes> + Send + Sync,
{
    fn map(
        &self,
        field: &str,
        value: &Value,
        target: Attributes,
        ctx: &PostMapContext<'_>,
    ) -> SyncResult<Attributes> {
        self(field, value, target, ctx)
    }
}

/// Ordered field name → mapper table.
///
/// Registering a field twice replaces the earlier mapper but keeps its
/// position.
pub struct FieldMappers<M: ?Sized> {
    entries: Vec<(String, Box<M>)>,
}

impl<M: ?Sized> FieldMappers<M> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn register(&mut self, field: impl Into<String>, mapper: Box<M>) {
        let field = field.into();
        match self.entries.iter_mut().find(|(f, _)| *f == field) {
            Some(entry) => entry.1 = mapper,
            None => self.entries.push((field, mapper)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &M)> {
        self.entries.iter().map(|(f, m)| (f.as_str(), m.as_ref()))
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(f, _)| f.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<M: ?Sized> Default for FieldMappers<M> {
    fn default() -> Self {
        Self::new()
    }
}
