//! Thin wrapper over `quick_xml::Writer` that keeps element nesting and error mapping in one
//! place.

use crate::{E2bError, E2bResult};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

pub(crate) struct XmlOut {
    inner: Writer<Cursor<Vec<u8>>>,
}

fn xml_err(e: impl std::fmt::Display) -> E2bError {
    E2bError::Xml(e.to_string())
}

impl XmlOut {
    pub(crate) fn new() -> E2bResult<Self> {
        let mut inner = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        inner
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_err)?;
        Ok(Self { inner })
    }

    pub(crate) fn start(&mut self, name: &str, attrs: &[(&str, &str)]) -> E2bResult<()> {
        let element = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.inner
            .write_event(Event::Start(element))
            .map_err(xml_err)
    }

    pub(crate) fn end(&mut self, name: &str) -> E2bResult<()> {
        self.inner
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(xml_err)
    }

    pub(crate) fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> E2bResult<()> {
        let element = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.inner
            .write_event(Event::Empty(element))
            .map_err(xml_err)
    }

    /// `<name attrs>text</name>`; the text is escaped.
    pub(crate) fn text_element(
        &mut self,
        name: &str,
        attrs: &[(&str, &str)],
        text: &str,
    ) -> E2bResult<()> {
        self.start(name, attrs)?;
        self.inner
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(xml_err)?;
        self.end(name)
    }

    pub(crate) fn finish(self) -> Vec<u8> {
        self.inner.into_inner().into_inner()
    }
}
