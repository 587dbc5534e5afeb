//! Rank-aware aggregation of Wikidata statements into property values.

use crate::labels::LabelIndex;
use crate::models::{PropertyEntry, PropertyValue, Rank};
use crate::values;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::warn;

/// Resolved values of one rank. Entity references win over other kinds:
/// once one arrives, non-entity values are discarded and no longer accepted.
#[derive(Debug, Default, Clone)]
struct Bucket {
    values: Vec<PropertyValue>,
    has_entity: bool,
}

impl Bucket {
    fn push(&mut self, value: PropertyValue) {
        if value.is_entity() {
            if !self.has_entity {
                self.values.clear();
                self.has_entity = true;
            }
            self.values.push(value);
        } else if !self.has_entity {
            self.values.push(value);
        }
    }
}

/// Statements of one property, partitioned by rank.
#[derive(Debug, Default, Clone)]
pub struct RankedClaimSet {
    buckets: [Bucket; 3],
}

impl RankedClaimSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves each statement's main value and files it under its rank.
    /// Statements without a resolvable `mainsnak.datavalue` are skipped.
    pub fn from_statements(statements: &[Value], labels: &LabelIndex) -> Self {
        let mut set = Self::new();
        for statement in statements {
            let Some(datavalue) = statement.get("mainsnak").and_then(|s| s.get("datavalue"))
            else {
                continue;
            };
            if let Some(value) = values::resolve(datavalue, labels) {
                let rank = Rank::parse(statement.get("rank").and_then(Value::as_str));
                set.push(rank, value);
            }
        }
        set
    }

    pub fn push(&mut self, rank: Rank, value: PropertyValue) {
        self.buckets[rank as usize].push(value);
    }

    pub fn values(&self, rank: Rank) -> &[PropertyValue] {
        &self.buckets[rank as usize].values
    }

    /// Values of the highest-priority non-empty rank.
    pub fn winner(mut self) -> Option<Vec<PropertyValue>> {
        Rank::PRIORITY
            .into_iter()
            .map(|rank| std::mem::take(&mut self.buckets[rank as usize].values))
            .find(|v| !v.is_empty())
    }

    pub fn resolve(self, property: &str) -> Option<PropertyEntry> {
        self.winner().map(|values| collapse(values, property))
    }
}

/// One value stays a scalar; several scalars become a sorted list.
/// Structured values (coordinates) have no order, so only the first is kept.
pub fn collapse(mut values: Vec<PropertyValue>, property: &str) -> PropertyEntry {
    if values.len() == 1 {
        return PropertyEntry::Single(values.remove(0));
    }
    if values.iter().any(PropertyValue::is_structured) {
        warn!(
            property = property,
            count = values.len(),
            "Several structured values share the winning rank, keeping the first"
        );
        return PropertyEntry::Single(values.remove(0));
    }
    values.sort_by(compare_scalars);
    PropertyEntry::Many(values)
}

/// Numbers first (total order), then text lexicographically.
fn compare_scalars(a: &PropertyValue, b: &PropertyValue) -> Ordering {
    match (a, b) {
        (PropertyValue::Quantity(x), PropertyValue::Quantity(y)) => x.total_cmp(y),
        (PropertyValue::Quantity(_), _) => Ordering::Less,
        (_, PropertyValue::Quantity(_)) => Ordering::Greater,
        _ => a.as_text().cmp(&b.as_text()),
    }
}

/// Builds the `properties` mapping of an entity from its raw `claims` object.
/// Properties without a label are skipped, as are those left with no value.
pub fn aggregate(
    claims: &Map<String, Value>,
    labels: &LabelIndex,
) -> BTreeMap<String, PropertyEntry> {
    let mut properties = BTreeMap::new();
    for (property_id, statements) in claims {
        let Some(name) = labels.get(property_id) else {
            continue;
        };
        let Some(statements) = statements.as_array() else {
            continue;
        };
        if let Some(entry) = RankedClaimSet::from_statements(statements, labels).resolve(name) {
            properties.insert(name.to_string(), entry);
        }
    }
    properties
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Coordinate;
    use serde_json::json;

    fn string(s: &str) -> PropertyValue {
        PropertyValue::String(s.to_string())
    }

    fn entity(s: &str) -> PropertyValue {
        PropertyValue::Entity(s.to_string())
    }

    fn statement(rank: &str, value: &str) -> Value {
        json!({
            "mainsnak": {"snaktype": "value", "datavalue": {"type": "string", "value": value}},
            "rank": rank
        })
    }

    fn entity_statement(rank: &str, id: &str) -> Value {
        json!({
            "mainsnak": {"datavalue": {"type": "wikibase-entityid", "value": {"id": id}}},
            "rank": rank
        })
    }

    fn labels() -> LabelIndex {
        [
            ("P1", "motto"),
            ("P2", "color"),
            ("P3", "unlabelled target"),
            ("Q10", "X"),
            ("Q11", "Blue"),
            ("Q12", "Red"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn preferred_beats_normal() {
        let set = RankedClaimSet::from_statements(
            &[statement("normal", "A"), statement("preferred", "B")],
            &labels(),
        );
        assert_eq!(set.resolve("motto"), Some(PropertyEntry::Single(string("B"))));
    }

    #[test]
    fn multiple_preferred_are_sorted() {
        let set = RankedClaimSet::from_statements(
            &[
                statement("preferred", "C"),
                statement("normal", "A"),
                statement("preferred", "B"),
            ],
            &labels(),
        );
        assert_eq!(
            set.resolve("motto"),
            Some(PropertyEntry::Many(vec![string("B"), string("C")]))
        );
    }

    #[test]
    fn deprecated_is_last_resort() {
        let set = RankedClaimSet::from_statements(&[statement("deprecated", "Old")], &labels());
        assert_eq!(set.resolve("motto"), Some(PropertyEntry::Single(string("Old"))));
    }

    #[test]
    fn entity_references_take_precedence() {
        let set = RankedClaimSet::from_statements(
            &[entity_statement("normal", "Q10"), statement("normal", "raw string")],
            &labels(),
        );
        assert_eq!(set.values(Rank::Normal), &[entity("X")]);
        assert_eq!(set.resolve("color"), Some(PropertyEntry::Single(entity("X"))));
    }

    #[test]
    fn entity_precedence_discards_earlier_plain_values() {
        let mut set = RankedClaimSet::new();
        set.push(Rank::Normal, string("raw"));
        set.push(Rank::Normal, entity("Red"));
        set.push(Rank::Normal, entity("Blue"));
        set.push(Rank::Normal, string("late"));
        assert_eq!(set.values(Rank::Normal), &[entity("Red"), entity("Blue")]);
        assert_eq!(
            set.resolve("color"),
            Some(PropertyEntry::Many(vec![entity("Blue"), entity("Red")]))
        );
    }

    #[test]
    fn precedence_is_per_rank() {
        let mut set = RankedClaimSet::new();
        set.push(Rank::Preferred, string("kept"));
        set.push(Rank::Normal, entity("Red"));
        assert_eq!(set.resolve("color"), Some(PropertyEntry::Single(string("kept"))));
    }

    #[test]
    fn unresolved_values_are_excluded() {
        let set = RankedClaimSet::from_statements(
            &[entity_statement("preferred", "Q999"), statement("normal", "A")],
            &labels(),
        );
        assert_eq!(set.resolve("motto"), Some(PropertyEntry::Single(string("A"))));

        let empty = RankedClaimSet::from_statements(
            &[entity_statement("normal", "Q999"), json!({"rank": "normal"})],
            &labels(),
        );
        assert_eq!(empty.resolve("motto"), None);
    }

    #[test]
    fn coordinates_keep_first() {
        let coord = |lat: f64| {
            PropertyValue::Coordinate(Coordinate {
                lat: Some(lat),
                lng: Some(0.5),
                globe: None,
                altitude: None,
            })
        };
        let entry = collapse(vec![coord(2.0), coord(1.0)], "coordinate location");
        assert_eq!(entry, PropertyEntry::Single(coord(2.0)));
    }

    #[test]
    fn quantities_sort_numerically_before_text() {
        let entry = collapse(
            vec![
                PropertyValue::Quantity(10.0),
                string("b"),
                PropertyValue::Quantity(9.5),
                string("a"),
            ],
            "mixed",
        );
        assert_eq!(
            entry,
            PropertyEntry::Many(vec![
                PropertyValue::Quantity(9.5),
                PropertyValue::Quantity(10.0),
                string("a"),
                string("b"),
            ])
        );
    }

    #[test]
    fn aggregate_skips_unlabelled_properties() {
        let claims = json!({
            "P1": [statement("normal", "Fluctuat nec mergitur")],
            "P2": [entity_statement("normal", "Q12"), entity_statement("normal", "Q11")],
            "P9": [statement("normal", "no label for P9")],
            "P3": [entity_statement("normal", "Q404")],
            "P4": "not a list"
        });
        let properties = aggregate(claims.as_object().unwrap(), &labels());

        assert_eq!(properties.len(), 2);
        assert_eq!(
            properties["motto"],
            PropertyEntry::Single(string("Fluctuat nec mergitur"))
        );
        assert_eq!(
            properties["color"],
            PropertyEntry::Many(vec![entity("Blue"), entity("Red")])
        );
        assert!(!properties.contains_key("unlabelled target"));
    }
}
