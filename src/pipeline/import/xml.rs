//! Pull reader over a dump stream yielding one event per attributed element.

use std::io::BufRead;

use quick_xml::events::Event;
use quick_xml::reader::Reader;

/// An element and its attributes in document order, values unescaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementEvent {
    pub name: String,
    pub attributes: Vec<(String, String)>,
}

pub struct ElementReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
}

impl<R: BufRead> ElementReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: Reader::from_reader(inner),
            buf: Vec::with_capacity(8192),
        }
    }

    /// Next element carrying at least one attribute, `None` at end of stream.
    /// Elements without attributes (the dump's root wrapper) are skipped.
    pub fn next_element(&mut self) -> Result<Option<ElementEvent>, quick_xml::Error> {
        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let mut attributes = Vec::new();
                    for attr in e.attributes() {
                        let attr = attr?;
                        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                        let value = attr.unescape_value()?.into_owned();
                        attributes.push((key, value));
                    }
                    if attributes.is_empty() {
                        continue;
                    }
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    return Ok(Some(ElementEvent { name, attributes }));
                }
                Event::Eof => return Ok(None),
                _ => {}
            }
        }
    }
}
