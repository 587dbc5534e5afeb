//! Typed value resolution for Wikidata snak `datavalue`s.
//!
//! Every function here returns `None` for values that cannot be resolved
//! (unknown entity, malformed time, incomplete coordinate, ...). These gaps are
//! not errors; the value simply does not take part in aggregation.

use crate::labels::LabelIndex;
use crate::models::{Coordinate, PropertyValue};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static TIME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([-+]?[0-9]+)-([0-9][0-9])-([0-9][0-9])T([0-9][0-9]):([0-9][0-9]):([0-9][0-9])Z?")
        .unwrap()
});

/// Globe id of Earth. Earth coordinates carry no `globe` field.
const EARTH: &str = "Q2";

/// Resolves one `{"type": ..., "value": ...}` datavalue.
pub fn resolve(datavalue: &Value, labels: &LabelIndex) -> Option<PropertyValue> {
    let kind = datavalue.get("type")?.as_str()?;
    let value = datavalue.get("value")?;

    match kind {
        "string" => non_empty(value.as_str()?).map(PropertyValue::String),
        "wikibase-entityid" => {
            let id = entity_id(value)?;
            labels
                .get(&id)
                .and_then(non_empty)
                .map(PropertyValue::Entity)
        }
        "time" => normalize_time(value.get("time")?.as_str()?).map(PropertyValue::Time),
        "quantity" => parse_amount(value.get("amount")?).map(PropertyValue::Quantity),
        "monolingualtext" => {
            non_empty(value.get("text")?.as_str()?).map(PropertyValue::Monolingual)
        }
        "globecoordinate" => resolve_coordinate(value, labels).map(PropertyValue::Coordinate),
        _ => None,
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// `id`, or for older dumps `entity-type` + `numeric-id`.
fn entity_id(value: &Value) -> Option<String> {
    if let Some(id) = value.get("id").and_then(Value::as_str) {
        return Some(id.to_string());
    }
    let prefix = match value.get("entity-type")?.as_str()? {
        "item" => 'Q',
        "property" => 'P',
        "lexeme" => 'L',
        _ => return None,
    };
    let numeric = value.get("numeric-id")?.as_u64()?;
    Some(format!("{}{}", prefix, numeric))
}

/// `+1999-00-00T00:00:00Z` → `1999-01-01T00:00:00`. Zero month/day become 1.
pub fn normalize_time(raw: &str) -> Option<String> {
    let caps = TIME_REGEX.captures(raw)?;
    let year: i64 = caps[1].parse().ok()?;
    let field = |i: usize| caps[i].parse::<u32>().ok();
    let month = field(2)?.max(1);
    let day = field(3)?.max(1);
    let (hour, minute, second) = (field(4)?, field(5)?, field(6)?);

    Some(format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
        year, month, day, hour, minute, second
    ))
}

/// Quantity amounts are signed decimal strings ("+1234.5"); bare numbers are accepted too.
fn parse_amount(amount: &Value) -> Option<f64> {
    let parsed = match amount {
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    parsed.is_finite().then_some(parsed)
}

fn resolve_coordinate(value: &Value, labels: &LabelIndex) -> Option<Coordinate> {
    let lat = value.get("latitude").and_then(Value::as_f64);
    let lng = value.get("longitude").and_then(Value::as_f64);
    if lat.is_none() && lng.is_none() {
        return None;
    }

    let globe = value
        .get("globe")
        .and_then(Value::as_str)
        .and_then(|uri| uri.rsplit('/').next())
        .filter(|id| *id != EARTH && labels.contains(id))
        .map(str::to_string);

    let altitude = value
        .get("altitude")
        .and_then(Value::as_f64)
        .filter(|a| *a != 0.0);

    Some(Coordinate {
        lat,
        lng,
        globe,
        altitude,
    })
}
