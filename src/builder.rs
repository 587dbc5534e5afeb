use crate::claims;
use crate::config::{DEFAULT_LANGUAGE, MAX_FIELD_CHARS};
use crate::content;
use crate::error::{check_length, Built, RecordError};
use crate::labels::LabelIndex;
use crate::models::{NormalizedEntityRecord, NormalizedPageRecord, RawPage};
use serde_json::{Map, Value};

/// Turns one completed raw page into a normalized record.
pub trait RecordBuilder {
    type Record;

    fn build(&self, page: RawPage) -> Built<Self::Record>;
}

/// Wikitext pipeline: tags from templates and category links.
#[derive(Debug, Default, Clone, Copy)]
pub struct PageRecordBuilder;

impl PageRecordBuilder {
    fn try_build(&self, page: RawPage) -> Result<Option<NormalizedPageRecord>, RecordError> {
        if page.title.is_empty() {
            return Ok(None);
        }
        check_length("title", &page.title, MAX_FIELD_CHARS)?;

        let facts = content::analyze(&page.body)?;

        Ok(Some(NormalizedPageRecord {
            id: page.id,
            title: page.title,
            infobox: facts.infobox,
            raw_wikitext: page.body,
            templates: facts.templates,
            categories: facts.categories,
            general: facts.general,
        }))
    }
}

impl RecordBuilder for PageRecordBuilder {
    type Record = NormalizedPageRecord;

    fn build(&self, page: RawPage) -> Built<Self::Record> {
        self.try_build(page).into()
    }
}

#[derive(Debug, Clone)]
pub struct EntityOptions {
    /// Language of the title, description and `<language>wiki` sitelink
    pub language: String,
}

impl Default for EntityOptions {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

impl EntityOptions {
    pub fn sitelink_key(&self) -> String {
        format!("{}wiki", self.language)
    }
}

/// Structured-data pipeline: entity JSON plus rank-resolved claims.
pub struct EntityRecordBuilder<'a> {
    labels: &'a LabelIndex,
    options: EntityOptions,
    sitelink_key: String,
}

impl<'a> EntityRecordBuilder<'a> {
    pub fn new(labels: &'a LabelIndex, options: EntityOptions) -> Self {
        let sitelink_key = options.sitelink_key();
        Self {
            labels,
            options,
            sitelink_key,
        }
    }

    fn try_build(&self, page: RawPage) -> Result<Option<NormalizedEntityRecord>, RecordError> {
        let doc: Value = serde_json::from_str(&page.body)?;
        let Some(entity) = doc.as_object() else {
            return Err(RecordError::Shape("entity body is not a JSON object"));
        };

        let labels = match entity.get("labels").and_then(Value::as_object) {
            Some(labels) if !labels.is_empty() => labels,
            _ => return Ok(None),
        };
        let language = self.options.language.as_str();

        let title = localized_value(labels, language);
        let sitelinks = entity.get("sitelinks").and_then(Value::as_object);
        let wikipedia_title = sitelinks
            .and_then(|s| s.get(&self.sitelink_key))
            .and_then(|link| link.get("title"))
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty());
        let claims = entity.get("claims").and_then(Value::as_object);

        let (Some(wikipedia_title), Some(title), Some(claims)) = (wikipedia_title, title, claims)
        else {
            return Ok(None);
        };
        check_length("title", title, MAX_FIELD_CHARS)?;

        let description = entity
            .get("descriptions")
            .and_then(Value::as_object)
            .and_then(|d| localized_value(d, language))
            .map(str::to_string);

        let entity_id = entity
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or(&page.title)
            .to_string();

        Ok(Some(NormalizedEntityRecord {
            wikipedia_title: wikipedia_title.to_string(),
            entity_id,
            title: title.to_string(),
            labels: labels.values().filter_map(text_of("value")).collect(),
            sitelinks: sitelinks
                .map(|s| s.values().filter_map(text_of("title")).collect())
                .unwrap_or_default(),
            description,
            properties: claims::aggregate(claims, self.labels),
        }))
    }
}

impl RecordBuilder for EntityRecordBuilder<'_> {
    type Record = NormalizedEntityRecord;

    fn build(&self, page: RawPage) -> Built<Self::Record> {
        self.try_build(page).into()
    }
}

/// `{"en": {"language": "en", "value": "..."}}` → the `value` for `language`.
fn localized_value<'v>(terms: &'v Map<String, Value>, language: &str) -> Option<&'v str> {
    terms
        .get(language)
        .and_then(|t| t.get("value"))
        .and_then(Value::as_str)
        .filter(|v| !v.is_empty())
}

fn text_of(key: &'static str) -> impl Fn(&Value) -> Option<String> {
    move |v| v.get(key).and_then(Value::as_str).map(str::to_string)
}
