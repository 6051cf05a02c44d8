//! Stanza sections: named blocks of ordered field/value pairs, stored as XML.
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <stanzas>
//!   <stanza name="metadata">
//!     <value name="name">Physics</value>
//!   </stanza>
//! </stanzas>
//! ```
//!
//! Reading is a single forward pass over the file: [`XmlReader::find_stanza`]
//! skips ahead, [`XmlReader::next_value`] yields one [`Value`] at a time and
//! returns `None` once the stanza ends.  Nothing is buffered beyond the
//! current value.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use super::{Bag, BagError};

const ROOT: &str = "stanzas";
const STANZA: &str = "stanza";
const VALUE: &str = "value";
const NAME_ATTR: &str = "name";

/// One field read back from a stanza.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    pub name: String,
    pub val:  String,
}

// ── Writer ───────────────────────────────────────────────────────────────────

/// Borrows its bag until [`XmlWriter::close`], like [`super::FlatWriter`].
///
/// ```compile_fail
/// # use aipbag::bag::{Bag, BagError};
/// # use aipbag::config::BagOptions;
/// # fn main() -> Result<(), BagError> {
/// let mut bag = Bag::create("/tmp/aips", "late", &BagOptions::default())?;
/// let mut meta = bag.xml_writer("metadata.xml")?;
/// meta.start_stanza("metadata")?;
/// bag.close()?;
/// meta.write_value("name", Some("Physics"))?;
/// # Ok(())
/// # }
/// ```
pub struct XmlWriter<'a> {
    writer: Writer<BufWriter<File>>,
    open:   Vec<String>,
    _bag:   PhantomData<&'a mut Bag>,
}

impl XmlWriter<'_> {
    pub(super) fn create(path: &Path) -> Result<Self, BagError> {
        let mut writer = Writer::new_with_indent(BufWriter::new(File::create(path)?), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::Start(BytesStart::new(ROOT)))?;
        Ok(Self { writer, open: Vec::new(), _bag: PhantomData })
    }

    pub fn start_stanza(&mut self, name: &str) -> Result<(), BagError> {
        let start = BytesStart::new(STANZA).with_attributes([(NAME_ATTR, name)]);
        self.writer.write_event(Event::Start(start))?;
        self.open.push(name.to_owned());
        Ok(())
    }

    /// Append a field to the innermost open stanza.  `None` writes nothing.
    pub fn write_value(&mut self, field: &str, value: Option<&str>) -> Result<(), BagError> {
        if self.open.is_empty() {
            return Err(BagError::NoOpenStanza);
        }
        let Some(value) = value else {
            return Ok(());
        };
        let start = BytesStart::new(VALUE).with_attributes([(NAME_ATTR, field)]);
        self.writer.write_event(Event::Start(start))?;
        self.writer.write_event(Event::Text(BytesText::new(value)))?;
        self.writer.write_event(Event::End(BytesEnd::new(VALUE)))?;
        Ok(())
    }

    pub fn end_stanza(&mut self) -> Result<(), BagError> {
        if self.open.pop().is_none() {
            return Err(BagError::NoOpenStanza);
        }
        self.writer.write_event(Event::End(BytesEnd::new(STANZA)))?;
        Ok(())
    }

    /// Close any stanzas left open, end the document and flush.
    pub fn close(mut self) -> Result<(), BagError> {
        while !self.open.is_empty() {
            self.end_stanza()?;
        }
        self.writer.write_event(Event::End(BytesEnd::new(ROOT)))?;
        self.writer.into_inner().flush()?;
        Ok(())
    }
}

// ── Reader ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Searching,
    InStanza,
    Finished,
}

pub struct XmlReader {
    reader: Reader<BufReader<File>>,
    buf:    Vec<u8>,
    state:  ScanState,
}

impl XmlReader {
    pub(super) fn open(path: &Path) -> Result<Self, BagError> {
        Ok(Self {
            reader: Reader::from_reader(BufReader::new(File::open(path)?)),
            buf:    Vec::new(),
            state:  ScanState::Searching,
        })
    }

    /// Advance to the next stanza called `name`.  Returns `false` when the
    /// section holds no further stanza of that name.
    pub fn find_stanza(&mut self, name: &str) -> Result<bool, BagError> {
        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(e) if e.name().as_ref() == STANZA.as_bytes() => {
                    if name_attr(&e)?.as_deref() == Some(name) {
                        self.state = ScanState::InStanza;
                        return Ok(true);
                    }
                }
                Event::Empty(e) if e.name().as_ref() == STANZA.as_bytes() => {
                    if name_attr(&e)?.as_deref() == Some(name) {
                        self.state = ScanState::Finished;
                        return Ok(true);
                    }
                }
                Event::Eof => {
                    self.state = ScanState::Finished;
                    return Ok(false);
                }
                _ => {}
            }
        }
    }

    /// Next value of the current stanza, or `None` once it is exhausted.
    /// Nested stanzas are skipped.
    pub fn next_value(&mut self) -> Result<Option<Value>, BagError> {
        if self.state != ScanState::InStanza {
            return Ok(None);
        }
        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(e) if e.name().as_ref() == VALUE.as_bytes() => {
                    let name = name_attr(&e)?.ok_or(BagError::MalformedStanza("value without name"))?;
                    let val = read_text(&mut self.reader)?;
                    return Ok(Some(Value { name, val }));
                }
                Event::Empty(e) if e.name().as_ref() == VALUE.as_bytes() => {
                    let name = name_attr(&e)?.ok_or(BagError::MalformedStanza("value without name"))?;
                    return Ok(Some(Value { name, val: String::new() }));
                }
                Event::Start(e) if e.name().as_ref() == STANZA.as_bytes() => {
                    let end = e.to_end().into_owned();
                    let mut skip = Vec::new();
                    self.reader.read_to_end_into(end.name(), &mut skip)?;
                }
                Event::End(e) if e.name().as_ref() == STANZA.as_bytes() => {
                    self.state = ScanState::Finished;
                    return Ok(None);
                }
                Event::Eof => {
                    self.state = ScanState::Finished;
                    return Err(BagError::MalformedStanza("unterminated stanza"));
                }
                _ => {}
            }
        }
    }

    pub fn close(self) {}
}

fn name_attr(e: &BytesStart<'_>) -> Result<Option<String>, BagError> {
    let attr = e.try_get_attribute(NAME_ATTR).map_err(quick_xml::Error::from)?;
    match attr {
        Some(a) => Ok(Some(a.unescape_value().map_err(quick_xml::Error::from)?.into_owned())),
        None => Ok(None),
    }
}

/// Collect character data up to the closing `</value>`.
fn read_text(reader: &mut Reader<BufReader<File>>) -> Result<String, BagError> {
    let mut text = String::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_event_into(&mut buf)? {
            Event::Text(t) => text.push_str(&t.unescape().map_err(quick_xml::Error::from)?),
            Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c)),
            Event::End(e) if e.name().as_ref() == VALUE.as_bytes() => return Ok(text),
            Event::Eof => return Err(BagError::MalformedStanza("unterminated value")),
            _ => return Err(BagError::MalformedStanza("unexpected markup inside value")),
        }
    }
}
