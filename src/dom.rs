//! Markup DOM
//!
//! A small, lossless mixed-content tree for XHTML content documents and OPF
//! packages. Unlike a typical data-oriented XML model it keeps text, comments,
//! CDATA sections, processing instructions and unresolved entity references in
//! document order, so that a document can be parsed, rewritten and written back
//! without touching the parts no transform cares about.
//!
//! Attribute values are stored in their escaped form, text in its unescaped
//! form. Elements remember whether they were written self-closing.

use std::{borrow::Cow, io::Cursor};

use quick_xml::{
    Reader, Writer,
    escape::{escape, partial_escape, unescape},
    events::{
        BytesCData, BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event,
        attributes::Attribute as XmlAttribute,
    },
    name::QName,
};

use crate::{entities, error::KepubError, html, utils::DecodeBytes};

type XmlWriter = Writer<Cursor<Vec<u8>>>;

/// A single attribute, value kept escaped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// A node of the mixed-content tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),

    /// Unescaped character data
    Text(String),

    Comment(String),
    CData(String),

    /// Processing instruction content, target included
    Pi(String),

    /// An entity reference the parser could not resolve, such as `&foo;`
    EntityRef(String),
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Node::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Whether the node is text made only of whitespace
    pub fn is_whitespace(&self) -> bool {
        matches!(self, Node::Text(text) if text.trim().is_empty())
    }
}

/// An element with its qualified name, escaped attributes and children
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// The qualified name, prefix included
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,

    /// Whether the element was read (or should be written) as `<name/>`
    ///
    /// Only honored while the element has no children.
    pub self_closing: bool,
}

impl Element {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Builder-style attribute assignment, `value` is escaped
    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    /// The name without its namespace prefix
    pub fn local_name(&self) -> &str {
        match self.name.split_once(':') {
            Some((_, local)) => local,
            None => &self.name,
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    /// Returns the unescaped value of an attribute
    pub fn attr(&self, name: &str) -> Option<String> {
        self.attributes
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| match unescape(&attr.value) {
                Ok(value) => value.into_owned(),
                Err(_) => attr.value.clone(),
            })
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.iter().any(|attr| attr.name == name)
    }

    /// Sets an attribute, replacing any previous value in place
    pub fn set_attr(&mut self, name: &str, value: &str) {
        let value = escape(value).into_owned();
        match self.attributes.iter_mut().find(|attr| attr.name == name) {
            Some(attr) => attr.value = value,
            None => self.attributes.push(Attribute {
                name: name.to_string(),
                value,
            }),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let index = self.attributes.iter().position(|attr| attr.name == name)?;
        Some(self.attributes.remove(index).value)
    }

    /// Whether the whitespace separated `class` attribute contains `class`
    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|value| value.split_whitespace().any(|token| token == class))
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    /// Returns the first child element with the given local name
    pub fn child_element(&self, local_name: &str) -> Option<&Element> {
        self.child_elements()
            .find(|child| child.local_name() == local_name)
    }

    pub fn child_element_mut(&mut self, local_name: &str) -> Option<&mut Element> {
        self.children
            .iter_mut()
            .filter_map(Node::as_element_mut)
            .find(|child| child.local_name() == local_name)
    }

    /// Returns the first element in document order with the given local name,
    /// starting with the element itself
    pub fn find(&self, local_name: &str) -> Option<&Element> {
        if self.local_name() == local_name {
            return Some(self);
        }

        self.child_elements().find_map(|child| child.find(local_name))
    }

    pub fn find_mut(&mut self, local_name: &str) -> Option<&mut Element> {
        if self.local_name() == local_name {
            return Some(self);
        }

        self.children
            .iter_mut()
            .filter_map(Node::as_element_mut)
            .find_map(|child| child.find_mut(local_name))
    }

    /// Collects the element and all of its descendant elements in document order
    pub fn descendants(&self) -> Vec<&Element> {
        let mut collection = Vec::new();
        Self::collect_elements(self, &mut collection);
        collection
    }

    fn collect_elements<'a>(element: &'a Element, collection: &mut Vec<&'a Element>) {
        collection.push(element);
        for child in element.child_elements() {
            Self::collect_elements(child, collection);
        }
    }

    /// Gets the character data of the element and all its descendants
    ///
    /// Unresolved entity references contribute their `&name;` form, comments
    /// and processing instructions contribute nothing.
    pub fn text(&self) -> String {
        let mut result = String::new();
        self.collect_text(&mut result);
        result
    }

    fn collect_text(&self, result: &mut String) {
        for child in &self.children {
            match child {
                Node::Element(element) => element.collect_text(result),
                Node::Text(text) | Node::CData(text) => result.push_str(text),
                Node::EntityRef(name) => {
                    result.push('&');
                    result.push_str(name);
                    result.push(';');
                }
                Node::Comment(_) | Node::Pi(_) => {}
            }
        }
    }

    /// Replaces all children with a single text node
    pub fn set_text(&mut self, text: &str) {
        self.children = vec![Node::Text(text.to_string())];
    }

    /// Merges adjacent text children and drops empty ones
    pub fn merge_text(&mut self) {
        let children = std::mem::take(&mut self.children);
        for child in children {
            if let Node::Text(text) = &child {
                if text.is_empty() {
                    continue;
                }
                if let Some(Node::Text(previous)) = self.children.last_mut() {
                    previous.push_str(text);
                    continue;
                }
            }
            self.children.push(child);
        }
    }

    /// Appends `child` after the last element child, matching its indentation
    pub fn append_element(&mut self, child: Element) {
        let last_separator = self
            .children
            .iter()
            .rev()
            .skip_while(|node| node.as_element().is_none())
            .nth(1);
        let indent = match last_separator {
            Some(Node::Text(text)) if text.trim().is_empty() => Some(text.clone()),
            _ => None,
        };

        let position = self
            .children
            .iter()
            .rposition(|node| node.as_element().is_some())
            .map_or(self.children.len(), |index| index + 1);

        match indent {
            Some(indent) => {
                self.children.insert(position, Node::Element(child));
                self.children.insert(position, Node::Text(indent));
            }
            None => self.children.insert(position, Node::Element(child)),
        }
    }

    /// Whether the element has no children, or whitespace-only text children
    pub fn is_blank(&self) -> bool {
        self.children.iter().all(Node::is_whitespace)
    }

    /// Builds a qualified name sharing this element's namespace prefix
    pub fn sibling_name(&self, local_name: &str) -> String {
        match self.prefix() {
            Some(prefix) => format!("{prefix}:{local_name}"),
            None => local_name.to_string(),
        }
    }
}

/// Markup outside the root element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Misc {
    Decl {
        version: String,
        encoding: Option<String>,
        standalone: Option<String>,
    },
    DocType(String),
    Comment(String),
    Pi(String),
    Whitespace(String),
}

/// A parsed markup document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub prolog: Vec<Misc>,
    pub root: Element,
    pub epilog: Vec<Misc>,
}

impl Document {
    /// Parses a document from raw bytes
    ///
    /// `path` is only used to locate errors.
    pub fn from_bytes(bytes: &[u8], path: &str) -> Result<Self, KepubError> {
        let content = bytes.decode()?;
        Self::parse(&content, path)
    }

    /// Parses a document written in HTML syntax from raw bytes
    ///
    /// Unlike [Document::from_bytes] this never rejects the markup, errors are
    /// recovered from the way browsers do. Only undecodable bytes fail.
    pub fn from_html_bytes(bytes: &[u8]) -> Result<Self, KepubError> {
        let content = bytes.decode()?;
        Ok(html::parse(&content))
    }

    /// Parses a document from a string
    ///
    /// # Parameters
    /// - `content`: The markup to parse
    /// - `path`: The container path of the document, carried by errors
    ///
    /// # Return
    /// - `Ok(Document)`: The parsed tree
    /// - `Err(KepubError::XmlError)`: The markup is not well-formed
    pub fn parse(content: &str, path: &str) -> Result<Self, KepubError> {
        let mut reader = Reader::from_str(content);

        let mut prolog = Vec::new();
        let mut epilog = Vec::new();
        let mut stack = Vec::<Element>::new();
        let mut root = None;

        let xml_error = |position: u64, message: String| {
            let offset = usize::try_from(position)
                .unwrap_or(usize::MAX)
                .min(content.len());
            KepubError::XmlError {
                path: path.to_string(),
                line: content.as_bytes()[..offset]
                    .iter()
                    .filter(|b| **b == b'\n')
                    .count()
                    + 1,
                position,
                message,
            }
        };

        loop {
            let event = reader
                .read_event()
                .map_err(|err| xml_error(reader.error_position(), err.to_string()))?;

            // Markup outside of the root element goes to the prolog or the epilog
            let misc = if root.is_none() { &mut prolog } else { &mut epilog };

            match event {
                Event::Eof => break,

                Event::Decl(e) => {
                    let position = reader.buffer_position();
                    let version = e
                        .version()
                        .map_err(|err| xml_error(position, err.to_string()))?;
                    let encoding = e
                        .encoding()
                        .transpose()
                        .map_err(|err| xml_error(position, err.to_string()))?;
                    let standalone = e
                        .standalone()
                        .transpose()
                        .map_err(|err| xml_error(position, err.to_string()))?;

                    misc.push(Misc::Decl {
                        version: String::from_utf8_lossy(&version).to_string(),
                        encoding: encoding.map(|v| String::from_utf8_lossy(&v).to_string()),
                        standalone: standalone.map(|v| String::from_utf8_lossy(&v).to_string()),
                    });
                }

                Event::DocType(e) => {
                    misc.push(Misc::DocType(String::from_utf8_lossy(&e).trim().to_string()))
                }

                Event::Start(e) | Event::Empty(e) if root.is_some() && stack.is_empty() => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    return Err(xml_error(
                        reader.buffer_position(),
                        format!("unexpected element <{name}> after the root element"),
                    ));
                }

                Event::Start(e) => {
                    let element = Self::read_element(&e, false)
                        .map_err(|message| xml_error(reader.buffer_position(), message))?;
                    stack.push(element);
                }

                Event::Empty(e) => {
                    let element = Self::read_element(&e, true)
                        .map_err(|message| xml_error(reader.buffer_position(), message))?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::Element(element)),
                        None => root = Some(element),
                    }
                }

                Event::End(_) => {
                    if let Some(element) = stack.pop() {
                        match stack.last_mut() {
                            Some(parent) => parent.children.push(Node::Element(element)),
                            None => root = Some(element),
                        }
                    }
                }

                Event::Text(e) => {
                    let text = String::from_utf8_lossy(&e);
                    match stack.last_mut() {
                        Some(parent) => push_text(&mut parent.children, &text),
                        None if text.trim().is_empty() => {
                            misc.push(Misc::Whitespace(text.to_string()))
                        }
                        None => {
                            return Err(xml_error(
                                reader.buffer_position(),
                                "character data outside of the root element".to_string(),
                            ));
                        }
                    }
                }

                Event::GeneralRef(e) => {
                    if let Some(parent) = stack.last_mut() {
                        let reference = format!("&{};", String::from_utf8_lossy(&e));
                        push_text(&mut parent.children, &reference);
                    }
                }

                Event::CData(e) => {
                    if let Some(parent) = stack.last_mut() {
                        let cdata = String::from_utf8_lossy(&e).to_string();
                        parent.children.push(Node::CData(cdata));
                    }
                }

                Event::Comment(e) => {
                    let comment = String::from_utf8_lossy(&e).to_string();
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::Comment(comment)),
                        None => misc.push(Misc::Comment(comment)),
                    }
                }

                Event::PI(e) => {
                    let pi = String::from_utf8_lossy(&e).to_string();
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::Pi(pi)),
                        None => misc.push(Misc::Pi(pi)),
                    }
                }
            }
        }

        if let Some(element) = stack.last() {
            return Err(xml_error(
                content.len() as u64,
                format!("unclosed element <{}>", element.name),
            ));
        }

        let root = root.ok_or_else(|| xml_error(0, "no root element".to_string()))?;
        Ok(Self {
            prolog,
            root,
            epilog,
        })
    }

    fn read_element(e: &BytesStart, self_closing: bool) -> Result<Element, String> {
        let mut element = Element::new(&String::from_utf8_lossy(e.name().as_ref()));
        element.self_closing = self_closing;

        for attr in e.attributes().with_checks(false) {
            let attr = attr.map_err(|err| err.to_string())?;
            element.attributes.push(Attribute {
                name: String::from_utf8_lossy(attr.key.as_ref()).to_string(),
                // Values are always written back double-quoted
                value: String::from_utf8_lossy(&attr.value).replace('"', "&quot;"),
            });
        }

        Ok(element)
    }

    /// Serializes the document back to UTF-8 markup
    pub fn to_bytes(&self) -> Result<Vec<u8>, KepubError> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));

        for misc in &self.prolog {
            Self::write_misc(&mut writer, misc)?;
        }
        Self::write_element(&mut writer, &self.root)?;
        for misc in &self.epilog {
            Self::write_misc(&mut writer, misc)?;
        }

        Ok(writer.into_inner().into_inner())
    }

    fn write_misc(writer: &mut XmlWriter, misc: &Misc) -> Result<(), KepubError> {
        match misc {
            Misc::Decl {
                version,
                encoding,
                standalone,
            } => writer.write_event(Event::Decl(BytesDecl::new(
                version,
                encoding.as_deref(),
                standalone.as_deref(),
            )))?,
            Misc::DocType(doctype) => {
                writer.write_event(Event::DocType(BytesText::from_escaped(doctype.as_str())))?
            }
            Misc::Comment(comment) => {
                writer.write_event(Event::Comment(BytesText::from_escaped(comment.as_str())))?
            }
            Misc::Pi(pi) => writer.write_event(Event::PI(BytesPI::new(pi.as_str())))?,
            Misc::Whitespace(text) => {
                writer.write_event(Event::Text(BytesText::from_escaped(text.as_str())))?
            }
        }

        Ok(())
    }

    fn write_element(writer: &mut XmlWriter, element: &Element) -> Result<(), KepubError> {
        let mut start = BytesStart::new(element.name.as_str());
        for attr in &element.attributes {
            start.push_attribute(XmlAttribute {
                key: QName(attr.name.as_bytes()),
                value: Cow::Borrowed(attr.value.as_bytes()),
            });
        }

        if element.self_closing && element.children.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }

        writer.write_event(Event::Start(start))?;
        for child in &element.children {
            match child {
                Node::Element(child) => Self::write_element(writer, child)?,
                Node::Text(text) => {
                    writer.write_event(Event::Text(BytesText::from_escaped(partial_escape(text))))?
                }
                Node::Comment(comment) => {
                    writer.write_event(Event::Comment(BytesText::from_escaped(comment.as_str())))?
                }
                Node::CData(cdata) => {
                    writer.write_event(Event::CData(BytesCData::new(cdata.as_str())))?
                }
                Node::Pi(pi) => writer.write_event(Event::PI(BytesPI::new(pi.as_str())))?,
                Node::EntityRef(name) => writer.write_event(Event::Text(
                    BytesText::from_escaped(format!("&{name};")),
                ))?,
            }
        }
        writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;

        Ok(())
    }

    pub fn head(&self) -> Option<&Element> {
        self.root.child_element("head")
    }

    pub fn head_mut(&mut self) -> Option<&mut Element> {
        self.root.child_element_mut("head")
    }

    pub fn body(&self) -> Option<&Element> {
        self.root.child_element("body")
    }

    pub fn body_mut(&mut self) -> Option<&mut Element> {
        self.root.child_element_mut("body")
    }

    /// The character data of the whole document
    pub fn text(&self) -> String {
        self.root.text()
    }
}

/// Appends raw character data to `children`, resolving entity references
///
/// Resolved text is merged into a trailing text node; references that cannot
/// be resolved become [Node::EntityRef] nodes.
fn push_text(children: &mut Vec<Node>, raw: &str) {
    let mut buffer = String::new();
    let mut rest = raw;

    while let Some(start) = rest.find('&') {
        buffer.push_str(&rest[..start]);
        let candidate = &rest[start + 1..];

        let Some(end) = candidate.find(';') else {
            buffer.push('&');
            rest = candidate;
            continue;
        };

        let name = &candidate[..end];
        match resolve_entity(name) {
            Some(ch) => buffer.push(ch),
            None => {
                flush_text(children, &mut buffer);
                children.push(Node::EntityRef(name.to_string()));
            }
        }
        rest = &candidate[end + 1..];
    }

    buffer.push_str(rest);
    flush_text(children, &mut buffer);
}

fn flush_text(children: &mut Vec<Node>, buffer: &mut String) {
    if buffer.is_empty() {
        return;
    }

    match children.last_mut() {
        Some(Node::Text(text)) => text.push_str(buffer),
        _ => children.push(Node::Text(buffer.clone())),
    }
    buffer.clear();
}

fn resolve_entity(name: &str) -> Option<char> {
    if let Some(number) = name.strip_prefix('#') {
        let code = match number.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => number.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }

    entities::lookup(name)
}

#[cfg(test)]
mod tests {
    use crate::{
        dom::{Document, Element, Misc, Node},
        error::KepubError,
    };

    const XHTML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>T</title><link rel="stylesheet" href="a.css"/></head>
<body><!-- note --><p class="x y">Fish &amp; chips&nbsp;&foo;<br/>done</p></body>
</html>
"#;

    fn parse(content: &str) -> Document {
        Document::parse(content, "OEBPS/ch1.xhtml").unwrap()
    }

    mod parse_tests {
        use super::*;

        /// The prolog keeps the declaration and doctype
        #[test]
        fn test_prolog() {
            let doc = parse(XHTML);
            assert!(matches!(
                &doc.prolog[0],
                Misc::Decl { version, encoding: Some(encoding), .. }
                    if version == "1.0" && encoding == "utf-8"
            ));
            assert!(doc.prolog.contains(&Misc::DocType("html".to_string())));
            assert_eq!(doc.root.name, "html");
        }

        /// Known entities are resolved, unknown ones are kept as references
        #[test]
        fn test_entities() {
            let doc = parse(XHTML);
            let p = doc.root.find("p").unwrap();
            assert_eq!(
                p.children[0],
                Node::Text("Fish & chips\u{a0}".to_string())
            );
            assert_eq!(p.children[1], Node::EntityRef("foo".to_string()));
            assert_eq!(p.text(), "Fish & chips\u{a0}&foo;done");
        }

        #[test]
        fn test_lookups() {
            let doc = parse(XHTML);
            assert!(doc.head().is_some());
            assert!(doc.body().is_some());

            let p = doc.root.find("p").unwrap();
            assert!(p.has_class("x"));
            assert!(p.has_class("y"));
            assert!(!p.has_class("x y"));

            let link = doc.root.find("link").unwrap();
            assert!(link.self_closing);
            assert_eq!(link.attr("href").as_deref(), Some("a.css"));
            assert_eq!(doc.root.descendants().len(), 7);
        }

        #[test]
        fn test_mismatched_tags() {
            let result = Document::parse("<html>\n<body>\n</html>", "a.xhtml");
            assert!(matches!(
                result,
                Err(KepubError::XmlError { ref path, line, .. }) if path == "a.xhtml" && line == 3
            ));
        }

        #[test]
        fn test_unclosed_root() {
            let result = Document::parse("<html><body></body>", "a.xhtml");
            assert!(matches!(result, Err(KepubError::XmlError { .. })));
        }

        #[test]
        fn test_no_root() {
            let result = Document::parse("<!-- nothing -->", "a.xhtml");
            assert!(matches!(result, Err(KepubError::XmlError { .. })));
        }
    }

    mod write_tests {
        use super::*;

        /// An unmodified tree serializes to the same markup
        #[test]
        fn test_round_trip() {
            let doc = parse(XHTML);
            let output = String::from_utf8(doc.to_bytes().unwrap()).unwrap();

            assert!(output.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
            assert!(output.contains("<!DOCTYPE html>"));
            assert!(output.contains("<link rel=\"stylesheet\" href=\"a.css\"/>"));
            assert!(output.contains("<!-- note -->"));
            assert!(output.contains("Fish &amp; chips\u{a0}&foo;<br/>done"));

            let reparsed = Document::parse(&output, "OEBPS/ch1.xhtml").unwrap();
            assert_eq!(reparsed, doc);
        }

        /// Explicit end tags stay explicit
        #[test]
        fn test_empty_element_conventions() {
            let doc = parse(r#"<html><head><script src="a.js"></script></head><body/></html>"#);
            let output = String::from_utf8(doc.to_bytes().unwrap()).unwrap();
            assert_eq!(
                output,
                r#"<html><head><script src="a.js"></script></head><body/></html>"#
            );
        }

        /// Single-quoted values containing double quotes remain well-formed
        #[test]
        fn test_attribute_quotes() {
            let doc = parse(r#"<a title='say "hi"'/>"#);
            assert_eq!(doc.root.attr("title").as_deref(), Some("say \"hi\""));

            let output = String::from_utf8(doc.to_bytes().unwrap()).unwrap();
            assert_eq!(output, r#"<a title="say &quot;hi&quot;"/>"#);
        }

        #[test]
        fn test_built_elements() {
            let mut root = Element::new("p");
            root.children.push(Node::Element(
                Element::new("span")
                    .with_attr("class", "koboSpan")
                    .with_attr("id", "kobo.0.0")
                    .with_child(Node::Text("a < b".to_string())),
            ));
            let doc = Document {
                prolog: vec![],
                root,
                epilog: vec![],
            };

            let output = String::from_utf8(doc.to_bytes().unwrap()).unwrap();
            assert_eq!(
                output,
                r#"<p><span class="koboSpan" id="kobo.0.0">a &lt; b</span></p>"#
            );
        }
    }
}
