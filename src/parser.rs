use crate::models::RawPage;
use crate::source;
use anyhow::{Context, Result};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::io::BufRead;

/// The three markup events the page assembler understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkupEvent<'a> {
    Open(&'a [u8]),
    Close(&'a [u8]),
    Text(&'a str),
}

/// Page-level elements whose text we keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    Id,
    Text,
}

impl Field {
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Field::Title),
            b"id" => Some(Field::Id),
            b"text" => Some(Field::Text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    #[default]
    Idle,
    Capturing(Field),
}

/// Rebuilds one [`RawPage`] at a time from a flat event sequence.
///
/// Only one field is captured at a time. The first occurrence of a field wins,
/// so the page `<id>` is kept over revision and contributor ids, and the
/// first revision's `<text>` over later ones. Later occurrences are not
/// buffered at all.
#[derive(Debug, Default)]
pub struct PageAssembler {
    state: State,
    buffer: String,
    title: Option<String>,
    id: Option<String>,
    body: Option<String>,
}

impl PageAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self.state, State::Capturing(_))
    }

    /// Feeds one event; returns the page when its `</page>` arrives.
    pub fn handle(&mut self, event: MarkupEvent<'_>) -> Option<RawPage> {
        match event {
            MarkupEvent::Open(name) => {
                if self.state == State::Idle {
                    if let Some(field) = Field::from_name(name) {
                        if self.slot(field).is_none() {
                            self.state = State::Capturing(field);
                        }
                    }
                }
                None
            }
            MarkupEvent::Text(text) => {
                if self.is_capturing() {
                    self.buffer.push_str(text);
                }
                None
            }
            MarkupEvent::Close(name) => {
                if let State::Capturing(field) = self.state {
                    if Field::from_name(name) == Some(field) {
                        let value = std::mem::take(&mut self.buffer);
                        *self.slot(field) = Some(value);
                        self.state = State::Idle;
                    }
                }
                if name == b"page" {
                    Some(self.take_page())
                } else {
                    None
                }
            }
        }
    }

    fn slot(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::Title => &mut self.title,
            Field::Id => &mut self.id,
            Field::Text => &mut self.body,
        }
    }

    fn take_page(&mut self) -> RawPage {
        self.state = State::Idle;
        self.buffer.clear();
        RawPage {
            id: self.id.take().unwrap_or_default(),
            title: self.title.take().unwrap_or_default(),
            body: self.body.take().unwrap_or_default(),
        }
    }
}

/// Streams [`RawPage`]s out of a MediaWiki XML export.
///
/// XML syntax and read errors end the stream; they are not recoverable.
pub struct DumpReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    assembler: PageAssembler,
    finished: bool,
}

impl DumpReader<Box<dyn BufRead>> {
    pub fn open(path: &str) -> Result<Self> {
        Ok(Self::new(source::open_dump(path)?))
    }
}

impl<R: BufRead> DumpReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            reader: Reader::from_reader(input),
            buf: Vec::with_capacity(64 * 1024),
            assembler: PageAssembler::new(),
            finished: false,
        }
    }

    /// Reads events until the next page completes, or returns `None` at EOF.
    pub fn next_page(&mut self) -> Result<Option<RawPage>> {
        loop {
            self.buf.clear();
            let page = match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(e)) => self
                    .assembler
                    .handle(MarkupEvent::Open(e.local_name().as_ref())),
                Ok(Event::Empty(e)) => {
                    let name = e.local_name();
                    self.assembler.handle(MarkupEvent::Open(name.as_ref()));
                    self.assembler.handle(MarkupEvent::Close(name.as_ref()))
                }
                Ok(Event::End(e)) => self
                    .assembler
                    .handle(MarkupEvent::Close(e.local_name().as_ref())),
                Ok(Event::Text(e)) => {
                    if self.assembler.is_capturing() {
                        let text = e.unescape().context("Invalid escape in XML text")?;
                        self.assembler.handle(MarkupEvent::Text(&text))
                    } else {
                        None
                    }
                }
                Ok(Event::CData(e)) => {
                    if self.assembler.is_capturing() {
                        let text = String::from_utf8_lossy(&e);
                        self.assembler.handle(MarkupEvent::Text(&text))
                    } else {
                        None
                    }
                }
                Ok(Event::Eof) => return Ok(None),
                Ok(_) => None,
                Err(e) => {
                    let position = self.reader.buffer_position();
                    return Err(anyhow::Error::new(e)
                        .context(format!("XML parse error at byte {}", position)));
                }
            };

            if page.is_some() {
                return Ok(page);
            }
        }
    }
}

impl<R: BufRead> Iterator for DumpReader<R> {
    type Item = Result<RawPage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_page() {
            Ok(Some(page)) => Some(Ok(page)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
