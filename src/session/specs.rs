//! Field mappings of the LinkedEvents resources

use crate::entity::{Attributes, EntityKind};
use crate::error::SyncResult;
use crate::identity::IdentityMap;
use crate::mapping::{
    ImportSpec, MapToLocalId, MapToLocalIds, MapToSelfId, Multilingual, RecreateChildren, Timestamp,
};
use serde_json::Value;

/// Fields whose child rows may be destroyed and recreated on every run
pub const RECREATE_FIELDS: [&str; 2] = ["offers", "external_links"];

const PLACE_TEXT_FIELDS: [&str; 5] = [
    "name",
    "description",
    "street_address",
    "address_locality",
    "info_url",
];

const EVENT_TEXT_FIELDS: [&str; 9] = [
    "name",
    "description",
    "short_description",
    "info_url",
    "location_extra_info",
    "headline",
    "secondary_headline",
    "provider",
    "provider_contact_info",
];

const EVENT_TIME_FIELDS: [&str; 4] = ["start_time", "end_time", "date_published", "last_modified_time"];

fn multilingual(spec: ImportSpec, fields: &[&str], languages: &[String]) -> ImportSpec {
    fields
        .iter()
        .fold(spec, |spec, field| spec.pre(*field, Multilingual::new(languages.iter().cloned())))
}

pub(crate) fn organization() -> ImportSpec {
    ImportSpec::new(EntityKind::Organization).copy(&[
        "name",
        "classification",
        "founding_date",
        "dissolution_date",
    ])
}

pub(crate) fn place(languages: &[String], organizations: &IdentityMap) -> ImportSpec {
    let spec = ImportSpec::new(EntityKind::Place).copy(&["postal_code", "email", "telephone", "position"]);
    multilingual(spec, &PLACE_TEXT_FIELDS, languages)
        .pre("publisher", MapToLocalId::new(organizations.clone()))
}

pub(crate) fn keyword(languages: &[String], organizations: &IdentityMap) -> ImportSpec {
    ImportSpec::new(EntityKind::Keyword)
        .pre("name", Multilingual::new(languages.iter().cloned()))
        .pre("publisher", MapToLocalId::new(organizations.clone()))
}

pub(crate) fn event(
    languages: &[String],
    organizations: &IdentityMap,
    places: &IdentityMap,
    keywords: &IdentityMap,
) -> ImportSpec {
    let spec = ImportSpec::new(EntityKind::Event).copy(&["super_event_type", "event_status"]);
    let spec = multilingual(spec, &EVENT_TEXT_FIELDS, languages);
    let spec = EVENT_TIME_FIELDS
        .iter()
        .fold(spec, |spec, field| spec.pre(*field, Timestamp));

    spec.pre("location", MapToLocalId::new(places.clone()))
        .pre("publisher", MapToLocalId::new(organizations.clone()))
        // A reappearing event is no longer deleted
        .pre(
            "deleted",
            |field: &str, _: &Value, mut target: Attributes| -> SyncResult<Attributes> {
                target.insert(field.to_string(), Value::Bool(false));
                Ok(target)
            },
        )
        .post("keywords", MapToLocalIds::new(keywords.clone()))
        .post("audience", MapToLocalIds::new(keywords.clone()))
        .post("super_event", MapToSelfId)
        .post(
            "offers",
            RecreateChildren::new(EntityKind::Offer, "event_id", RECREATE_FIELDS),
        )
        .post(
            "external_links",
            RecreateChildren::new(EntityKind::ExternalLink, "event_id", RECREATE_FIELDS),
        )
}
