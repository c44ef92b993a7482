//! Resource catalog
//!
//! Static descriptions of the collections the service exposes.

use crate::validation::{FieldRule, FieldSpec, Schema};

/// Field every resource uses as its natural key.
pub const NAME: &str = "name";
pub const STATE_CODE: &str = "state_code";
pub const ISO_CODE: &str = "iso_code";
pub const CAPITAL: &str = "capital";
pub const POPULATION: &str = "population";

const NAME_RULE: FieldRule = FieldRule::Text { max: 100 };

const CITY_SCHEMA: Schema = Schema {
    fields: &[
        FieldSpec::required(NAME, NAME_RULE),
        FieldSpec::required(STATE_CODE, FieldRule::Code { min: 2, max: 2 }),
        FieldSpec::optional(POPULATION, FieldRule::PositiveInt),
    ],
};

const COUNTRY_SCHEMA: Schema = Schema {
    fields: &[
        FieldSpec::required(NAME, NAME_RULE),
        FieldSpec::required(ISO_CODE, FieldRule::Code { min: 2, max: 3 }),
        FieldSpec::optional(CAPITAL, NAME_RULE),
        FieldSpec::optional(POPULATION, FieldRule::PositiveInt),
    ],
};

const STATE_SCHEMA: Schema = Schema {
    fields: &[
        FieldSpec::required(NAME, NAME_RULE),
        FieldSpec::required(STATE_CODE, FieldRule::Code { min: 2, max: 2 }),
        FieldSpec::optional(CAPITAL, NAME_RULE),
        FieldSpec::optional(POPULATION, FieldRule::PositiveInt),
    ],
};

// == Resource ==
/// One collection addressed by natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resource {
    /// Path segment and display name
    pub name: &'static str,
    pub collection: &'static str,
    /// Natural key used for all addressing after creation
    pub key_field: &'static str,
    /// Short code looked up case-insensitively
    pub code_field: &'static str,
    /// Optional third text field searched by substring
    pub extra_field: Option<&'static str>,
    pub schema: &'static Schema,
}

pub const CITIES: Resource = Resource {
    name: "cities",
    collection: "cities",
    key_field: NAME,
    code_field: STATE_CODE,
    extra_field: None,
    schema: &CITY_SCHEMA,
};

pub const COUNTRIES: Resource = Resource {
    name: "countries",
    collection: "countries",
    key_field: NAME,
    code_field: ISO_CODE,
    extra_field: Some(CAPITAL),
    schema: &COUNTRY_SCHEMA,
};

pub const STATES: Resource = Resource {
    name: "states",
    collection: "states",
    key_field: NAME,
    code_field: STATE_CODE,
    extra_field: Some(CAPITAL),
    schema: &STATE_SCHEMA,
};

pub const ALL_RESOURCES: [Resource; 3] = [CITIES, COUNTRIES, STATES];

impl Resource {
    /// Finds a resource by its path segment.
    pub fn lookup(name: &str) -> Option<Resource> {
        ALL_RESOURCES.iter().copied().find(|r| r.name == name)
    }
}
