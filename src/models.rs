use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fields of one `<page>` element, as buffered by the page assembler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPage {
    pub id: String,
    pub title: String,
    /// Raw wikitext for page dumps, raw entity JSON for entity dumps
    pub body: String,
}

/// Output of the wikitext pipeline. `title` is the unique key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedPageRecord {
    pub id: String,
    pub title: String,
    pub infobox: Option<String>,
    pub raw_wikitext: String,
    pub templates: Vec<String>,
    pub categories: Vec<String>,
    pub general: Vec<String>,
}

/// Output of the structured-data pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedEntityRecord {
    pub wikipedia_title: String,
    pub entity_id: String,
    pub title: String,
    pub labels: Vec<String>,
    pub sitelinks: Vec<String>,
    pub description: Option<String>,
    pub properties: BTreeMap<String, PropertyEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rank {
    Preferred,
    Normal,
    Deprecated,
}

impl Rank {
    /// Resolution order, highest priority first.
    pub const PRIORITY: [Rank; 3] = [Rank::Preferred, Rank::Normal, Rank::Deprecated];

    /// Missing or unrecognized ranks count as normal.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("preferred") => Rank::Preferred,
            Some("deprecated") => Rank::Deprecated,
            _ => Rank::Normal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coordinate {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub globe: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
}

/// A resolved statement value, tagged by the kind it was decoded from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    String(String),
    /// Label of the referenced entity
    Entity(String),
    /// `YYYY-MM-DDTHH:MM:SS`
    Time(String),
    Quantity(f64),
    Monolingual(String),
    Coordinate(Coordinate),
}

impl PropertyValue {
    pub fn is_entity(&self) -> bool {
        matches!(self, PropertyValue::Entity(_))
    }

    /// Structured values have no meaningful order and are never collapsed into lists.
    pub fn is_structured(&self) -> bool {
        matches!(self, PropertyValue::Coordinate(_))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s)
            | PropertyValue::Entity(s)
            | PropertyValue::Time(s)
            | PropertyValue::Monolingual(s) => Some(s),
            _ => None,
        }
    }
}

/// Final value of one property: a scalar, or a sorted list when several
/// values share the winning rank.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyEntry {
    Single(PropertyValue),
    Many(Vec<PropertyValue>),
}
