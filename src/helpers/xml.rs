//! quick-xml wrapper and helper traits for the packaged-XML workbook parts.

use crate::error::SheetFrameError;
use quick_xml::escape::resolve_xml_entity;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesRef, BytesStart, Event};
use quick_xml::Reader;
use std::borrow::Cow;
use std::io::BufRead;

/// XML event reader configured for worksheet-scale streaming.
pub(crate) struct XmlReader<R: BufRead> {
    reader: Reader<R>,
    buffer: Vec<u8>,
}

impl<R: BufRead> XmlReader<R> {
    pub(crate) fn new(buf_reader: R) -> XmlReader<R> {
        let mut reader = Reader::from_reader(buf_reader);
        let config = reader.config_mut();
        config.check_comments = false;
        config.check_end_names = false;
        config.expand_empty_elements = true;
        config.trim_text(false);

        XmlReader {
            reader,
            buffer: Vec::with_capacity(1024),
        }
    }

    /// Next event, or None at end of document.
    pub(crate) fn next(&mut self) -> Result<Option<Event<'_>>, SheetFrameError> {
        self.buffer.clear();
        match self.reader.read_event_into(&mut self.buffer) {
            Ok(Event::Eof) => Ok(None),
            Ok(event) => Ok(Some(event)),
            Err(error) => Err(SheetFrameError::Xml(error)),
        }
    }
}

/// Attribute access on start tags.
pub(crate) trait XmlNodeHelper<'a> {
    fn attribute(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, SheetFrameError>;
}

impl<'a> XmlNodeHelper<'a> for BytesStart<'a> {
    fn attribute(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, SheetFrameError> {
        self.try_get_attribute(name)?
            .map(|attribute: Attribute<'a>| Ok(attribute.unescape_value()?))
            .transpose()
    }
}

/// Accumulating text content across text, CDATA, and entity-reference events.
pub(crate) trait XmlTextHelper {
    fn push_entity_ref(&mut self, bytes: &BytesRef) -> Result<(), SheetFrameError>;
}

impl XmlTextHelper for String {
    fn push_entity_ref(&mut self, bytes: &BytesRef) -> Result<(), SheetFrameError> {
        let raw = bytes.xml_content()?;
        if let Some(number) = raw.strip_prefix('#') {
            let code = if let Some(hex) = number.strip_prefix('x') {
                u32::from_str_radix(hex, 16)?
            } else {
                number.parse::<u32>()?
            };
            if let Some(character) = std::char::from_u32(code) {
                self.push_str(character.encode_utf8(&mut [0u8; 4]));
            }
        } else if let Some(entity) = resolve_xml_entity(&raw) {
            self.push_str(entity);
        } else {
            return Err(SheetFrameError::Format(format!(
                "unresolvable XML entity '{raw}'"
            )));
        }
        Ok(())
    }
}

#[macro_export]
macro_rules! match_xml_events {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(result) = $reader.next()? {
            match result {
                Event::Eof => break,
                $($arms)*
                _ => (),
            }
        }
    };
}
