//! Wikifacts: streaming fact extraction from Wikipedia and Wikidata dumps
//!
//! A MediaWiki XML dump is read one page at a time, each page is turned into a
//! normalized record, and records are handed to a sink. Two record kinds share
//! the same driver:
//!
//! 1. **Pages** -- wikitext articles become a title, an infobox type and
//!    normalized template, category and general-category tags
//! 2. **Entities** -- Wikidata entity JSON becomes labels, sitelinks and a
//!    property map where each property resolves to its best-ranked values,
//!    with entity references replaced by their labels
//!
//! # Architecture
//!
//! - **Streaming XML parsing** -- one page in flight, constant memory
//! - **Explicit per-page outcome** -- a record, dropped by rule, or rejected with a reason
//! - **Read-only label snapshot** -- built in a first pass, cached with bincode
//! - **Resumable runs** -- checkpoints after every sink flush
//!
//! # Key Modules
//!
//! - [`source`] -- Byte-stream source with BZ2 decompression
//! - [`parser`] -- Page assembler over quick-xml events
//! - [`wikitext`] -- Template and link scanner
//! - [`content`] -- Tag normalization and infobox/category/general extraction
//! - [`values`] -- Typed Wikidata value resolution
//! - [`claims`] -- Rank-aware statement aggregation
//! - [`labels`] -- Id-to-label index
//! - [`builder`] -- Page and entity record builders
//! - [`pipeline`] -- The driver loop
//! - [`sink`] -- JSON lines, CSV and in-memory sinks
//! - [`cache`] -- Label index persistence
//! - [`checkpoint`] -- Run progress checkpointing
//! - [`stats`] -- Pipeline counters
//! - [`config`] -- Limits and defaults
//!
//! # Example Usage
//!
//! ```bash
//! # Wikitext pages to JSON lines
//! wikifacts pages -i enwiki-latest-pages-articles.xml.bz2 -o output/
//!
//! # Build the label index once, then extract entities as CSV
//! wikifacts labels -i wikidata-latest-pages-articles.xml.bz2 -o output/
//! wikifacts entities -i wikidata-latest-pages-articles.xml.bz2 -o output/ --format csv
//! ```

pub mod builder;
pub mod cache;
pub mod checkpoint;
pub mod claims;
pub mod config;
pub mod content;
pub mod error;
pub mod labels;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod stats;
pub mod values;
pub mod wikitext;
