//! Minimal owned element tree over `quick-xml` events.
//!
//! Only what the body walk needs is kept: local element names, child order,
//! and text nodes. Attributes, namespaces and processing instructions are
//! dropped.

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("xml syntax error at byte {pos}: {msg}")]
    Syntax { pos: u64, msg: String },
    #[error("unbalanced element structure: {0}")]
    Structure(String),
}

#[derive(Debug, Clone)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct Element {
    /// Local name, without namespace prefix.
    pub name: String,
    pub children: Vec<Node>,
}

impl Element {
    fn new(name: String) -> Self {
        Self {
            name,
            children: Vec::new(),
        }
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// Concatenation of all descendant text nodes in document order.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for n in &self.children {
            match n {
                Node::Text(t) => out.push_str(t),
                Node::Element(e) => e.collect_text(out),
            }
        }
    }

    /// Pre-order search, starting with `self`.
    pub fn find_first<F>(&self, pred: &F) -> Option<&Element>
    where
        F: Fn(&Element) -> bool,
    {
        if pred(self) {
            return Some(self);
        }
        self.child_elements().find_map(|c| c.find_first(pred))
    }
}

pub fn parse_tree(xml: &str) -> Result<Element, XmlError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader.read_event().map_err(|e| XmlError::Syntax {
            pos: reader.buffer_position() as u64,
            msg: e.to_string(),
        })?;
        match event {
            Event::Start(e) => {
                stack.push(Element::new(local_name(e.local_name().as_ref())));
            }
            Event::Empty(e) => {
                let el = Element::new(local_name(e.local_name().as_ref()));
                attach(&mut stack, &mut root, el)?;
            }
            Event::End(_) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| XmlError::Structure("closing tag without opening tag".into()))?;
                attach(&mut stack, &mut root, el)?;
            }
            Event::Text(t) => {
                if let Some(top) = stack.last_mut() {
                    let s = t.unescape().map_err(|e| XmlError::Syntax {
                        pos: reader.buffer_position() as u64,
                        msg: e.to_string(),
                    })?;
                    top.children.push(Node::Text(s.into_owned()));
                }
            }
            Event::CData(c) => {
                if let Some(top) = stack.last_mut() {
                    let raw = c.into_inner();
                    top.children
                        .push(Node::Text(String::from_utf8_lossy(&raw).into_owned()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(XmlError::Structure(format!(
            "unexpected end of document inside <{}>",
            open.name
        )));
    }
    root.ok_or_else(|| XmlError::Structure("document has no root element".into()))
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, el: Element) -> Result<(), XmlError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(Node::Element(el));
        return Ok(());
    }
    if root.is_some() {
        return Err(XmlError::Structure(format!(
            "second root element <{}>",
            el.name
        )));
    }
    *root = Some(el);
    Ok(())
}

fn local_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}
