use crate::config::PROGRESS_INTERVAL;
use crate::parser::DumpReader;
use anyhow::{bail, Context, Result};
use indicatif::ProgressBar;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use tracing::{debug, info};

/// Read-only entity id → display label snapshot (e.g. `P31` → "instance of").
#[derive(Debug, Default, Clone)]
pub struct LabelIndex {
    labels: FxHashMap<String, String>,
}

/// Just enough of an entity document to pick its label.
#[derive(Deserialize)]
struct EntityLabels {
    id: Option<String>,
    #[serde(default)]
    labels: serde_json::Value,
}

impl LabelIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(labels: FxHashMap<String, String>) -> Self {
        Self { labels }
    }

    /// First pass over an entity dump, collecting `labels.<language>.value`.
    pub fn build(path: &str, language: &str) -> Result<Self> {
        let reader = DumpReader::open(path)
            .with_context(|| format!("Failed to open entity dump at: {}", path))?;
        let pb = ProgressBar::new_spinner();
        let mut labels = FxHashMap::default();
        let mut pages: u64 = 0;

        info!("Building label index from: {}", path);

        for page in reader {
            let page = page?;
            pages += 1;
            match serde_json::from_str::<EntityLabels>(&page.body) {
                Ok(entity) => {
                    let label = entity
                        .labels
                        .get(language)
                        .and_then(|l| l.get("value"))
                        .and_then(|v| v.as_str());
                    if let (Some(id), Some(label)) = (entity.id, label) {
                        labels.insert(id, label.to_string());
                    }
                }
                Err(e) => debug!(title = %page.title, error = %e, "Skipping undecodable entity"),
            }
            if pages % PROGRESS_INTERVAL == 0 {
                pb.set_message(format!("{} pages, {} labels", pages, labels.len()));
                pb.tick();
            }
        }

        pb.finish_and_clear();

        info!(pages = pages, labels = labels.len(), "Label index built");

        Ok(Self { labels })
    }

    /// Loads a flat JSON object such as `{"P31": "instance of", "Q5": "human"}`.
    pub fn from_json_file(path: &str) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("Failed to open label file: {}", path))?;
        let value: serde_json::Value = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse label file: {}", path))?;

        let Some(object) = value.as_object() else {
            bail!("Label file must contain a JSON object: {}", path);
        };

        let labels: FxHashMap<String, String> = object
            .iter()
            .filter_map(|(id, label)| label.as_str().map(|l| (id.clone(), l.to_string())))
            .collect();

        info!(labels = labels.len(), path = path, "Label file loaded");
        Ok(Self { labels })
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.labels.get(id).map(String::as_str)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.labels.contains_key(id)
    }

    pub fn insert(&mut self, id: impl Into<String>, label: impl Into<String>) {
        self.labels.insert(id.into(), label.into());
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub(crate) fn map(&self) -> &FxHashMap<String, String> {
        &self.labels
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LabelIndex {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            labels: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lookup_and_missing() {
        let index: LabelIndex = [("P31", "instance of"), ("Q5", "human")].into_iter().collect();
        assert_eq!(index.get("P31"), Some("instance of"));
        assert_eq!(index.get("Q6"), None);
        assert!(index.contains("Q5"));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn empty_index() {
        let index = LabelIndex::new();
        assert!(index.is_empty());
        assert_eq!(index.get("P31"), None);
    }

    #[test]
    fn build_from_plain_dump() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entities.xml");
        let xml = r#"<mediawiki>
  <page><title>Q5</title><id>1</id><revision><text>{"id":"Q5","labels":{"en":{"language":"en","value":"human"},"fr":{"language":"fr","value":"humain"}}}</text></revision></page>
  <page><title>Property:P31</title><id>2</id><revision><text>{"id":"P31","labels":{"en":{"language":"en","value":"instance of"}}}</text></revision></page>
  <page><title>Q9</title><id>3</id><revision><text>{"id":"Q9","labels":[]}</text></revision></page>
  <page><title>Broken</title><id>4</id><revision><text>{not json</text></revision></page>
</mediawiki>"#;
        std::fs::write(&path, xml).unwrap();

        let index = LabelIndex::build(path.to_str().unwrap(), "en").unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("Q5"), Some("human"));
        assert_eq!(index.get("P31"), Some("instance of"));

        let french = LabelIndex::build(path.to_str().unwrap(), "fr").unwrap();
        assert_eq!(french.get("Q5"), Some("humain"));
        assert_eq!(french.get("P31"), None);
    }

    #[test]
    fn load_json_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("properties.json");
        std::fs::write(&path, r#"{"P31": "instance of", "P17": "country", "bad": 3}"#).unwrap();

        let index = LabelIndex::from_json_file(path.to_str().unwrap()).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("P17"), Some("country"));
    }

    #[test]
    fn json_file_must_be_object() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("properties.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(LabelIndex::from_json_file(path.to_str().unwrap()).is_err());
    }
}
