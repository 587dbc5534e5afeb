//! Record sinks: where normalized records end up.
//!
//! A sink stores records, applies its [`ConflictPolicy`] and makes writes
//! durable on [`RecordSink::flush`]. The driver flushes every commit
//! interval and once more at the end of input.

use crate::models::{NormalizedEntityRecord, NormalizedPageRecord};
use anyhow::{Context, Result};
use rustc_hash::FxHashSet;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::marker::PhantomData;
use std::path::Path;

pub trait RecordSink<R> {
    /// Stores one record. Returns `false` when the conflict policy ignored it.
    fn write(&mut self, record: &R) -> Result<bool>;

    fn flush(&mut self) -> Result<()>;
}

/// What a record needs to provide to be written by the bundled sinks.
pub trait SinkRecord: Serialize {
    /// Identity used by [`ConflictPolicy::IgnoreDuplicates`].
    fn key(&self) -> &str;

    fn csv_header() -> &'static [&'static str];

    fn csv_row(&self) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Keep the first record per key
    IgnoreDuplicates,
    Append,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Jsonl,
    Csv,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jsonl => "jsonl",
            OutputFormat::Csv => "csv",
        }
    }
}

/// Tracks seen keys for [`ConflictPolicy::IgnoreDuplicates`].
#[derive(Debug)]
struct KeyFilter {
    policy: ConflictPolicy,
    seen: FxHashSet<String>,
}

impl KeyFilter {
    fn new(policy: ConflictPolicy) -> Self {
        Self {
            policy,
            seen: FxHashSet::default(),
        }
    }

    fn admit(&mut self, key: &str) -> bool {
        match self.policy {
            ConflictPolicy::Append => true,
            ConflictPolicy::IgnoreDuplicates => {
                if self.seen.contains(key) {
                    false
                } else {
                    self.seen.insert(key.to_string());
                    true
                }
            }
        }
    }
}

/// One JSON object per line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    filter: KeyFilter,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W, policy: ConflictPolicy) -> Self {
        Self {
            writer,
            filter: KeyFilter::new(policy),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write, R: SinkRecord> RecordSink<R> for JsonLinesSink<W> {
    fn write(&mut self, record: &R) -> Result<bool> {
        if !self.filter.admit(record.key()) {
            return Ok(false);
        }
        serde_json::to_writer(&mut self.writer, record).context("Failed to encode record")?;
        self.writer
            .write_all(b"\n")
            .context("Failed to write record")?;
        Ok(true)
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush JSON lines output")
    }
}

/// CSV with a header row, loadable with `COPY ... FROM ... CSV HEADER`.
pub struct CsvSink<W: Write, R> {
    writer: csv::Writer<W>,
    filter: KeyFilter,
    _record: PhantomData<fn(&R)>,
}

impl<W: Write, R: SinkRecord> CsvSink<W, R> {
    /// `with_header` is false when appending to an existing file.
    pub fn new(writer: W, policy: ConflictPolicy, with_header: bool) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        if with_header {
            writer
                .write_record(R::csv_header())
                .context("Failed to write CSV header")?;
        }
        Ok(Self {
            writer,
            filter: KeyFilter::new(policy),
            _record: PhantomData,
        })
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to finish CSV output: {}", e.error()))
    }
}

impl<W: Write, R: SinkRecord> RecordSink<R> for CsvSink<W, R> {
    fn write(&mut self, record: &R) -> Result<bool> {
        if !self.filter.admit(record.key()) {
            return Ok(false);
        }
        self.writer
            .write_record(record.csv_row()?)
            .context("Failed to write CSV row")?;
        Ok(true)
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush CSV output")
    }
}

/// Keeps records in memory.
#[derive(Debug)]
pub struct MemorySink<R> {
    pub records: Vec<R>,
    pub flushes: usize,
    filter: KeyFilter,
}

impl<R> MemorySink<R> {
    pub fn new(policy: ConflictPolicy) -> Self {
        Self {
            records: Vec::new(),
            flushes: 0,
            filter: KeyFilter::new(policy),
        }
    }
}

impl<R: SinkRecord + Clone> RecordSink<R> for MemorySink<R> {
    fn write(&mut self, record: &R) -> Result<bool> {
        if !self.filter.admit(record.key()) {
            return Ok(false);
        }
        self.records.push(record.clone());
        Ok(true)
    }

    fn flush(&mut self) -> Result<()> {
        self.flushes += 1;
        Ok(())
    }
}

/// Opens `<output_dir>/<name>.<ext>` as a buffered file sink.
/// With `append` the file is extended and no CSV header is repeated.
pub fn open_file_sink<R: SinkRecord + 'static>(
    output_dir: &str,
    name: &str,
    format: OutputFormat,
    policy: ConflictPolicy,
    append: bool,
) -> Result<Box<dyn RecordSink<R>>> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir))?;
    let path = Path::new(output_dir).join(format!("{}.{}", name, format.extension()));

    let file = open_output(&path, append)?;
    let is_empty = file.metadata().map(|m| m.len() == 0).unwrap_or(true);
    let writer = BufWriter::with_capacity(256 * 1024, file);

    Ok(match format {
        OutputFormat::Jsonl => Box::new(JsonLinesSink::new(writer, policy)),
        OutputFormat::Csv => Box::new(CsvSink::<_, R>::new(writer, policy, is_empty)?),
    })
}

fn open_output(path: &Path, append: bool) -> Result<File> {
    let mut options = OpenOptions::new();
    if append {
        options.create(true).append(true);
    } else {
        options.create(true).write(true).truncate(true);
    }
    options
        .open(path)
        .with_context(|| format!("Failed to open output file: {:?}", path))
}

/// PostgreSQL array literal: `{"a","b \"c\""}`.
pub fn pg_array(items: &[String]) -> String {
    let mut out = String::from("{");
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push('"');
        for c in item.chars() {
            if c == '"' || c == '\\' {
                out.push('\\');
            }
            out.push(c);
        }
        out.push('"');
    }
    out.push('}');
    out
}

impl SinkRecord for NormalizedPageRecord {
    fn key(&self) -> &str {
        &self.title
    }

    fn csv_header() -> &'static [&'static str] {
        &[
            "id",
            "title",
            "infobox",
            "raw_wikitext",
            "templates",
            "categories",
            "general",
        ]
    }

    fn csv_row(&self) -> Result<Vec<String>> {
        Ok(vec![
            self.id.clone(),
            self.title.clone(),
            self.infobox.clone().unwrap_or_default(),
            self.raw_wikitext.clone(),
            pg_array(&self.templates),
            pg_array(&self.categories),
            pg_array(&self.general),
        ])
    }
}

impl SinkRecord for NormalizedEntityRecord {
    fn key(&self) -> &str {
        &self.entity_id
    }

    fn csv_header() -> &'static [&'static str] {
        &[
            "wikipedia_title",
            "entity_id",
            "title",
            "labels",
            "sitelinks",
            "description",
            "properties",
        ]
    }

    fn csv_row(&self) -> Result<Vec<String>> {
        Ok(vec![
            self.wikipedia_title.clone(),
            self.entity_id.clone(),
            self.title.clone(),
            serde_json::to_string(&self.labels)?,
            serde_json::to_string(&self.sitelinks)?,
            self.description.clone().unwrap_or_default(),
            serde_json::to_string(&self.properties)?,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PropertyEntry, PropertyValue};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn page(title: &str, templates: &[&str]) -> NormalizedPageRecord {
        NormalizedPageRecord {
            id: "7".to_string(),
            title: title.to_string(),
            infobox: None,
            raw_wikitext: "{{Stub}}".to_string(),
            templates: templates.iter().map(|t| t.to_string()).collect(),
            categories: Vec::new(),
            general: Vec::new(),
        }
    }

    fn entity() -> NormalizedEntityRecord {
        let mut properties = BTreeMap::new();
        properties.insert(
            "population".to_string(),
            PropertyEntry::Single(PropertyValue::Quantity(2148271.0)),
        );
        NormalizedEntityRecord {
            wikipedia_title: "Paris".to_string(),
            entity_id: "Q90".to_string(),
            title: "Paris".to_string(),
            labels: vec!["Paris".to_string(), "Lutetia".to_string()],
            sitelinks: vec!["Paris".to_string()],
            description: Some("capital of France".to_string()),
            properties,
        }
    }

    #[test]
    fn pg_array_quotes_and_escapes() {
        assert_eq!(pg_array(&[]), "{}");
        assert_eq!(
            pg_array(&["a".to_string(), "say \"hi\"".to_string(), "back\\slash".to_string()]),
            r#"{"a","say \"hi\"","back\\slash"}"#
        );
    }

    #[test]
    fn ignore_duplicates_keeps_first_title() {
        let mut sink: MemorySink<NormalizedPageRecord> =
            MemorySink::new(ConflictPolicy::IgnoreDuplicates);
        assert!(sink.write(&page("Paris", &["first"])).unwrap());
        assert!(!sink.write(&page("Paris", &["second"])).unwrap());
        assert!(sink.write(&page("Lyon", &[])).unwrap());
        assert_eq!(sink.records.len(), 2);
        assert_eq!(sink.records[0].templates, vec!["first"]);
    }

    #[test]
    fn append_keeps_everything() {
        let mut sink: MemorySink<NormalizedPageRecord> = MemorySink::new(ConflictPolicy::Append);
        sink.write(&page("Paris", &[])).unwrap();
        sink.write(&page("Paris", &[])).unwrap();
        sink.flush().unwrap();
        assert_eq!(sink.records.len(), 2);
        assert_eq!(sink.flushes, 1);
    }

    #[test]
    fn json_lines_output() {
        let mut sink = JsonLinesSink::new(Vec::new(), ConflictPolicy::Append);
        sink.write(&entity()).unwrap();
        RecordSink::<NormalizedEntityRecord>::flush(&mut sink).unwrap();

        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(out.lines().count(), 1);
        let value: serde_json::Value = serde_json::from_str(out.trim_end()).unwrap();
        assert_eq!(value["entity_id"], "Q90");
        assert_eq!(value["properties"]["population"], 2148271.0);
    }

    #[test]
    fn csv_page_output() {
        let mut sink: CsvSink<_, NormalizedPageRecord> =
            CsvSink::new(Vec::new(), ConflictPolicy::IgnoreDuplicates, true).unwrap();
        sink.write(&page("Paris", &["infobox settlement", "cite web"]))
            .unwrap();
        sink.flush().unwrap();

        let out = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        let mut rows = csv::Reader::from_reader(out.as_bytes());
        let headers = rows.headers().unwrap().clone();
        assert_eq!(headers.get(4), Some("templates"));

        let row = rows.records().next().unwrap().unwrap();
        assert_eq!(row.get(1), Some("Paris"));
        assert_eq!(row.get(2), Some(""));
        assert_eq!(row.get(4), Some(r#"{"infobox settlement","cite web"}"#));
    }

    #[test]
    fn csv_entity_output_uses_json_columns() {
        let mut sink: CsvSink<_, NormalizedEntityRecord> =
            CsvSink::new(Vec::new(), ConflictPolicy::Append, true).unwrap();
        sink.write(&entity()).unwrap();

        let out = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        let mut rows = csv::Reader::from_reader(out.as_bytes());
        let row = rows.records().next().unwrap().unwrap();
        assert_eq!(row.get(3), Some(r#"["Paris","Lutetia"]"#));
        assert_eq!(row.get(6), Some(r#"{"population":2148271.0}"#));
    }

    #[test]
    fn file_sink_append_skips_header() {
        let dir = TempDir::new().unwrap();
        let output_dir = dir.path().to_str().unwrap();

        let mut sink = open_file_sink::<NormalizedPageRecord>(
            output_dir,
            "pages",
            OutputFormat::Csv,
            ConflictPolicy::IgnoreDuplicates,
            false,
        )
        .unwrap();
        sink.write(&page("Paris", &[])).unwrap();
        sink.flush().unwrap();
        drop(sink);

        let mut sink = open_file_sink::<NormalizedPageRecord>(
            output_dir,
            "pages",
            OutputFormat::Csv,
            ConflictPolicy::IgnoreDuplicates,
            true,
        )
        .unwrap();
        sink.write(&page("Lyon", &[])).unwrap();
        sink.flush().unwrap();
        drop(sink);

        let content = fs::read_to_string(dir.path().join("pages.csv")).unwrap();
        assert_eq!(content.matches("raw_wikitext").count(), 1);
        let mut rows = csv::Reader::from_reader(content.as_bytes());
        assert_eq!(rows.records().count(), 2);
    }
}
