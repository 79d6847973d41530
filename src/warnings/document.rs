/// Warning document tree.
///
/// The warnings XML is read into a small owned element tree that keeps
/// children in document order. Only element names, text content and
/// nesting are kept; attributes and namespaces are not used by the feed.

use crate::model::DocumentError;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    /// Local name, namespace prefix stripped.
    pub name: String,
    /// Concatenated text content directly inside this element, trimmed.
    pub text: Option<String>,
    pub children: Vec<Element>,
}

impl Element {
    fn new(name: String) -> Self {
        Element {
            name,
            text: None,
            children: Vec::new(),
        }
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Every element below this one, depth-first in document order.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: vec![self.children.iter()],
        }
    }

    fn push_text(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        match &mut self.text {
            Some(existing) => existing.push_str(text),
            None => self.text = Some(text.to_string()),
        }
    }
}

pub struct Descendants<'a> {
    stack: Vec<std::slice::Iter<'a, Element>>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<&'a Element> {
        while let Some(siblings) = self.stack.last_mut() {
            if let Some(element) = siblings.next() {
                self.stack.push(element.children.iter());
                return Some(element);
            }
            self.stack.pop();
        }
        None
    }
}

/// A parsed warning document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    pub root: Element,
}

impl RawDocument {
    pub fn from_path(path: &Path) -> Result<RawDocument, DocumentError> {
        let xml = fs::read_to_string(path).map_err(|source| DocumentError::Io {
            path: path.display().to_string(),
            source,
        })?;
        RawDocument::parse_str(&xml)
    }

    pub fn parse_str(xml: &str) -> Result<RawDocument, DocumentError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let position = reader.buffer_position() as u64;
            let event = reader.read_event().map_err(|e| DocumentError::Parse {
                position,
                message: e.to_string(),
            })?;

            match event {
                Event::Start(start) => {
                    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
                    stack.push(Element::new(name));
                }
                Event::Empty(empty) => {
                    let name = String::from_utf8_lossy(empty.local_name().as_ref()).into_owned();
                    attach(&mut stack, &mut root, Element::new(name));
                }
                Event::End(_) => {
                    if let Some(done) = stack.pop() {
                        attach(&mut stack, &mut root, done);
                    }
                }
                Event::Text(text) => {
                    let text = text.unescape().map_err(|e| DocumentError::Parse {
                        position,
                        message: e.to_string(),
                    })?;
                    if let Some(current) = stack.last_mut() {
                        current.push_text(&text);
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = stack.last_mut() {
                        current.push_text(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(DocumentError::Parse {
                position: xml.len() as u64,
                message: format!("unexpected end of document inside <{}>", open.name),
            });
        }

        root.map(|root| RawDocument { root }).ok_or(DocumentError::Empty)
    }

    /// Timeslice elements at `data/cube/timeslice` anywhere below the root,
    /// in document order.
    pub fn timeslices(&self) -> Vec<&Element> {
        self.root
            .descendants()
            .filter(|e| e.name == "data")
            .flat_map(|data| data.children_named("cube"))
            .flat_map(|cube| cube.children_named("timeslice"))
            .collect()
    }
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}
