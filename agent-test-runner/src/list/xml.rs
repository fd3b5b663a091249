// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A minimal element tree built on top of `quick-xml`.
//!
//! Definition and test-set files are small, so they're read into memory in full. Each element
//! records the zero-based line its start tag ends on, which is used for go-to-definition.

use crate::{errors::ParseDefinitionErrorKind, helpers::LineCounter};
use quick_xml::{Reader, events::Event};

#[derive(Clone, Debug, Default)]
pub(super) struct XmlElement {
    pub(super) name: String,
    pub(super) line: usize,
    text: String,
    pub(super) children: Vec<XmlElement>,
}

impl XmlElement {
    /// Returns the trimmed text content of this element.
    pub(super) fn text(&self) -> &str {
        self.text.trim()
    }

    /// Returns the first child with the given name.
    pub(super) fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Returns all children with the given name, in document order.
    pub(super) fn children_named<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// Returns the text of the first child with the given name, if it is non-empty.
    pub(super) fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name)
            .map(|child| child.text())
            .filter(|text| !text.is_empty())
    }
}

/// Parses `contents` into its root element.
pub(super) fn parse_document(contents: &str) -> Result<XmlElement, ParseDefinitionErrorKind> {
    let mut reader = Reader::from_str(contents);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root = None;
    let mut lines = LineCounter::new(contents);

    loop {
        let event = reader
            .read_event()
            .map_err(|error| ParseDefinitionErrorKind::Xml {
                position: reader.error_position() as u64,
                error,
            })?;
        let position = reader.buffer_position() as usize;

        match event {
            Event::Start(start) => {
                stack.push(XmlElement {
                    name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
                    line: lines.line_at(position),
                    ..Default::default()
                });
            }
            Event::Empty(start) => {
                let element = XmlElement {
                    name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
                    line: lines.line_at(position),
                    ..Default::default()
                };
                attach(&mut stack, &mut root, element);
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    let unescaped =
                        text.unescape()
                            .map_err(|error| ParseDefinitionErrorKind::Xml {
                                position: position as u64,
                                error,
                            })?;
                    current.text.push_str(&unescaped);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current
                        .text
                        .push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::End(_) => {
                // quick-xml checks that end tags match their start tags.
                if let Some(element) = stack.pop() {
                    attach(&mut stack, &mut root, element);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.pop() {
        return Err(ParseDefinitionErrorKind::UnclosedElement { name: open.name });
    }
    root.ok_or(ParseDefinitionErrorKind::MissingRoot)
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            // Only the first top-level element is kept.
            root.get_or_insert(element);
        }
    }
}
