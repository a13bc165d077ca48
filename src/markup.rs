//! Span-bearing markup tree built from `quick-xml` events.
//!
//! Every node remembers the byte span it came from, so callers can edit the
//! original text in place instead of re-serializing a tree. Spans are taken
//! from the reader's position before and after each event.

use std::borrow::Cow;
use std::ops::Range;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;

const COMMENT_OPEN: &str = "<!--";
const COMMENT_CLOSE: &str = "-->";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at line {line}, column {column}")]
pub struct MarkupError {
    pub message: String,
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl MarkupError {
    fn at(text: &str, offset: usize, message: impl Into<String>) -> Self {
        let (line, column) = line_column(text, offset);
        Self {
            message: message.into(),
            offset,
            line,
            column,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    /// Entity-decoded value.
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
    /// From `<` of the start tag through the end of `/>` or the end tag.
    pub span: Range<usize>,
    pub self_closing: bool,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.value.as_str())
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.child_elements()
            .filter(move |element| element.name == name)
    }

    pub fn comments(&self) -> impl Iterator<Item = &Comment> {
        self.children.iter().filter_map(|node| match node {
            Node::Comment(comment) => Some(comment),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    /// From `<!--` through `-->`.
    pub span: Range<usize>,
    /// Text between the markers.
    pub body: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Comment(Comment),
    Text(Range<usize>),
    /// Declarations, processing instructions, CDATA and doctypes.
    Other(Range<usize>),
}

impl Node {
    pub fn span(&self) -> Range<usize> {
        match self {
            Node::Element(element) => element.span.clone(),
            Node::Comment(comment) => comment.span.clone(),
            Node::Text(span) | Node::Other(span) => span.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub prolog: Vec<Node>,
    pub root: Element,
    pub epilog: Vec<Node>,
}

impl Document {
    pub fn parse(text: &str) -> Result<Self, MarkupError> {
        let mut reader = Reader::from_str(text);
        // End tags are matched against the tree below so errors carry our positions.
        reader.config_mut().check_end_names = false;
        let mut tree = TreeBuilder::new(text);

        loop {
            let start = reader.buffer_position() as usize;
            let event = reader.read_event().map_err(|err| {
                MarkupError::at(text, reader.error_position() as usize, err.to_string())
            })?;
            let span = start..reader.buffer_position() as usize;

            match event {
                Event::Start(tag) => tree.open(element(text, &tag, span, false)?)?,
                Event::Empty(tag) => tree.push(Node::Element(element(text, &tag, span, true)?))?,
                Event::End(tag) => {
                    let name = String::from_utf8_lossy(tag.name().as_ref()).into_owned();
                    tree.close(&name, span)?;
                }
                Event::Comment(_) => tree.push(comment(text, span)?)?,
                Event::Text(content) => {
                    content
                        .unescape()
                        .map_err(|err| MarkupError::at(text, span.start, err.to_string()))?;
                    tree.push(Node::Text(span))?;
                }
                Event::DocType(_) if tree.root_started() => {
                    return Err(MarkupError::at(
                        text,
                        span.start,
                        "doctype must precede the root element",
                    ));
                }
                Event::Eof => break,
                _ => tree.push(Node::Other(span))?,
            }
        }

        tree.finish()
    }
}

/// Parses text that must hold exactly one element, optionally surrounded by
/// whitespace.
pub fn parse_fragment(text: &str) -> Result<Element, MarkupError> {
    let document = Document::parse(text)?;
    let stray = document
        .prolog
        .iter()
        .chain(document.epilog.iter())
        .find(|node| !matches!(node, Node::Text(_)));
    if let Some(node) = stray {
        return Err(MarkupError::at(
            text,
            node.span().start,
            "fragment must contain a single element",
        ));
    }
    Ok(document.root)
}

/// 1-based line and column (in bytes) of `offset` within `text`.
pub fn line_column(text: &str, offset: usize) -> (usize, usize) {
    let bytes = &text.as_bytes()[..offset.min(text.len())];
    let line = bytes.iter().filter(|&&b| b == b'\n').count() + 1;
    let line_start = bytes
        .iter()
        .rposition(|&b| b == b'\n')
        .map(|idx| idx + 1)
        .unwrap_or(0);
    (line, bytes.len() - line_start + 1)
}

fn element(
    text: &str,
    tag: &BytesStart<'_>,
    span: Range<usize>,
    self_closing: bool,
) -> Result<Element, MarkupError> {
    let offset = span.start;
    let name = String::from_utf8_lossy(tag.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in tag.attributes() {
        let attr = attr.map_err(|err| {
            MarkupError::at(text, offset, format!("malformed attributes in <{name}>: {err}"))
        })?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value: Cow<'_, str> = attr.unescape_value().map_err(|err| {
            MarkupError::at(
                text,
                offset,
                format!("invalid value for attribute '{key}': {err}"),
            )
        })?;
        attributes.push(Attribute {
            name: key,
            value: value.into_owned(),
        });
    }
    Ok(Element {
        name,
        attributes,
        children: Vec::new(),
        span,
        self_closing,
    })
}

fn comment(text: &str, span: Range<usize>) -> Result<Node, MarkupError> {
    let body_start = span.start + COMMENT_OPEN.len();
    let body_end = span.end.saturating_sub(COMMENT_CLOSE.len()).max(body_start);
    let body = &text[body_start..body_end];
    if let Some(dashes) = body.find("--") {
        return Err(MarkupError::at(
            text,
            body_start + dashes,
            "'--' is not allowed inside a comment",
        ));
    }
    if body.ends_with('-') {
        return Err(MarkupError::at(
            text,
            body_end - 1,
            "comment must not end with '-'",
        ));
    }
    Ok(Node::Comment(Comment {
        span,
        body: body_start..body_end,
    }))
}

/// Assembles events into a document, one open element per stack slot.
struct TreeBuilder<'a> {
    text: &'a str,
    open: Vec<Element>,
    prolog: Vec<Node>,
    root: Option<Element>,
    epilog: Vec<Node>,
}

impl<'a> TreeBuilder<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            open: Vec::new(),
            prolog: Vec::new(),
            root: None,
            epilog: Vec::new(),
        }
    }

    fn root_started(&self) -> bool {
        self.root.is_some() || !self.open.is_empty()
    }

    fn open(&mut self, element: Element) -> Result<(), MarkupError> {
        self.check_single_root(element.span.start)?;
        self.open.push(element);
        Ok(())
    }

    fn close(&mut self, name: &str, span: Range<usize>) -> Result<(), MarkupError> {
        let Some(mut element) = self.open.pop() else {
            return Err(MarkupError::at(
                self.text,
                span.start,
                format!("unexpected closing tag </{name}>"),
            ));
        };
        if element.name != name {
            return Err(MarkupError::at(
                self.text,
                span.start,
                format!(
                    "mismatched closing tag: expected </{}>, found </{name}>",
                    element.name
                ),
            ));
        }
        element.span.end = span.end;
        self.attach(Node::Element(element));
        Ok(())
    }

    fn push(&mut self, node: Node) -> Result<(), MarkupError> {
        match &node {
            Node::Element(element) => self.check_single_root(element.span.start)?,
            Node::Text(span)
                if self.open.is_empty() && !self.text[span.clone()].trim().is_empty() =>
            {
                return Err(MarkupError::at(
                    self.text,
                    span.start,
                    "text outside the root element",
                ));
            }
            _ => {}
        }
        self.attach(node);
        Ok(())
    }

    fn check_single_root(&self, offset: usize) -> Result<(), MarkupError> {
        if self.open.is_empty() && self.root.is_some() {
            return Err(MarkupError::at(self.text, offset, "multiple root elements"));
        }
        Ok(())
    }

    fn attach(&mut self, node: Node) {
        if let Some(parent) = self.open.last_mut() {
            parent.children.push(node);
            return;
        }
        match node {
            Node::Element(element) => self.root = Some(element),
            other if self.root.is_none() => self.prolog.push(other),
            other => self.epilog.push(other),
        }
    }

    fn finish(self) -> Result<Document, MarkupError> {
        if let Some(element) = self.open.last() {
            return Err(MarkupError::at(
                self.text,
                element.span.start,
                format!("unclosed element <{}>", element.name),
            ));
        }
        let Some(root) = self.root else {
            return Err(MarkupError::at(self.text, self.text.len(), "no root element"));
        };
        Ok(Document {
            prolog: self.prolog,
            root,
            epilog: self.epilog,
        })
    }
}
