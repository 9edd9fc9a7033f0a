//! HTML syntax parsing
//!
//! Content documents served as `text/html` are not always well-formed XML.
//! They are parsed with html5ever the way a browser would, then converted into
//! the [dom](crate::dom) tree and written back as XHTML like every other
//! document.

use std::{borrow::Cow, cell::RefCell};

use html5ever::{
    Attribute as HtmlAttribute, LocalName, Namespace, QualName,
    driver::ParseOpts,
    ns, parse_document,
    tendril::{StrTendril, TendrilSink},
    tree_builder::{ElemName, ElementFlags, NodeOrText, QuirksMode, TreeSink},
};

use crate::dom::{Document, Element, Misc, Node};

const XHTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Elements that never have content, written as `<name/>`
const VOID_ELEMENTS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

type NodeId = usize;

const DOCUMENT: NodeId = 0;

#[derive(Debug)]
enum SinkData {
    Document,
    Doctype(String),
    Element {
        name: QualName,
        attributes: Vec<HtmlAttribute>,
    },
    Text(String),
    Comment(String),
    Pi(String),
}

#[derive(Debug)]
struct SinkNode {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: SinkData,
}

/// An element name handed back to the tree builder
#[derive(Debug)]
struct SinkName(QualName);

impl ElemName for SinkName {
    fn ns(&self) -> &Namespace {
        &self.0.ns
    }

    fn local_name(&self) -> &LocalName {
        &self.0.local
    }
}

/// Tree builder target collecting nodes into an arena
///
/// html5ever drives the sink through `&self`, hence the `RefCell`.
struct ArenaSink {
    nodes: RefCell<Vec<SinkNode>>,
}

impl ArenaSink {
    fn new() -> Self {
        Self {
            nodes: RefCell::new(vec![SinkNode {
                parent: None,
                children: Vec::new(),
                data: SinkData::Document,
            }]),
        }
    }

    fn create(&self, data: SinkData) -> NodeId {
        let mut nodes = self.nodes.borrow_mut();
        nodes.push(SinkNode {
            parent: None,
            children: Vec::new(),
            data,
        });
        nodes.len() - 1
    }

    fn detach(nodes: &mut [SinkNode], target: NodeId) {
        if let Some(parent) = nodes[target].parent.take() {
            nodes[parent].children.retain(|child| *child != target);
        }
    }

    /// Inserts `child` into `parent` at `index`, merging text with a preceding text node
    fn insert(&self, parent: NodeId, index: usize, child: NodeOrText<NodeId>) {
        let mut nodes = self.nodes.borrow_mut();
        match child {
            NodeOrText::AppendNode(node) => {
                Self::detach(&mut nodes, node);
                nodes[node].parent = Some(parent);
                let index = index.min(nodes[parent].children.len());
                nodes[parent].children.insert(index, node);
            }
            NodeOrText::AppendText(text) => {
                let previous = index
                    .checked_sub(1)
                    .and_then(|previous| nodes[parent].children.get(previous).copied());
                if let Some(previous) = previous
                    && let SinkData::Text(existing) = &mut nodes[previous].data
                {
                    existing.push_str(&text);
                    return;
                }

                nodes.push(SinkNode {
                    parent: Some(parent),
                    children: Vec::new(),
                    data: SinkData::Text(text.to_string()),
                });
                let node = nodes.len() - 1;
                let index = index.min(nodes[parent].children.len());
                nodes[parent].children.insert(index, node);
            }
        }
    }

    fn into_document(self) -> Document {
        let nodes = self.nodes.into_inner();

        let mut prolog = Vec::new();
        let mut epilog = Vec::new();
        let mut root = None;
        for &handle in &nodes[DOCUMENT].children {
            let misc = if root.is_none() { &mut prolog } else { &mut epilog };
            match &nodes[handle].data {
                SinkData::Doctype(doctype) => {
                    misc.push(Misc::DocType(doctype.clone()));
                    misc.push(Misc::Whitespace("\n".to_string()));
                }
                SinkData::Comment(comment) => misc.push(Misc::Comment(comment.clone())),
                SinkData::Pi(pi) => misc.push(Misc::Pi(pi.clone())),
                SinkData::Element { .. } if root.is_none() => {
                    root = Some(convert_element(&nodes, handle, &ns!()));
                }
                _ => {}
            }
        }

        // The tree builder always creates <html>, an empty document is still a document
        let mut root = root.unwrap_or_else(|| Element::new("html"));
        if !root.has_attr("xmlns") {
            root.set_attr("xmlns", XHTML_NAMESPACE);
        }

        Document {
            prolog,
            root,
            epilog,
        }
    }
}

fn convert_element(nodes: &[SinkNode], handle: NodeId, parent_ns: &Namespace) -> Element {
    let SinkData::Element { name, attributes } = &nodes[handle].data else {
        return Element::default();
    };

    let mut element = Element::new(&name.local);
    if name.ns != *parent_ns && name.ns != ns!(html) && !name.ns.is_empty() {
        element.set_attr("xmlns", &name.ns);
    }
    for attr in attributes {
        let attr_name = match &attr.name.prefix {
            Some(prefix) => format!("{prefix}:{}", attr.name.local),
            None => attr.name.local.to_string(),
        };
        if attr.name.prefix.as_deref() == Some("xlink") && !element.has_attr("xmlns:xlink") {
            element.set_attr("xmlns:xlink", &attr.name.ns);
        }
        element.set_attr(&attr_name, &attr.value);
    }

    for &child in &nodes[handle].children {
        match &nodes[child].data {
            SinkData::Element { .. } => {
                let child = convert_element(nodes, child, &name.ns);
                element.children.push(Node::Element(child));
            }
            SinkData::Text(text) => element.children.push(Node::Text(text.clone())),
            SinkData::Comment(comment) => element.children.push(Node::Comment(comment.clone())),
            SinkData::Pi(pi) => element.children.push(Node::Pi(pi.clone())),
            SinkData::Document | SinkData::Doctype(_) => {}
        }
    }

    element.self_closing =
        element.children.is_empty() && VOID_ELEMENTS.contains(&element.local_name());
    element
}

impl TreeSink for ArenaSink {
    type Handle = NodeId;
    type Output = Self;
    type ElemName<'a>
        = SinkName
    where
        Self: 'a;

    fn finish(self) -> Self::Output {
        self
    }

    // Markup errors are recovered from, not reported
    fn parse_error(&self, _msg: Cow<'static, str>) {}

    fn get_document(&self) -> Self::Handle {
        DOCUMENT
    }

    fn elem_name<'a>(&'a self, target: &'a Self::Handle) -> Self::ElemName<'a> {
        match &self.nodes.borrow()[*target].data {
            SinkData::Element { name, .. } => SinkName(name.clone()),
            _ => SinkName(QualName::new(None, ns!(), LocalName::from(""))),
        }
    }

    fn create_element(
        &self,
        name: QualName,
        attrs: Vec<HtmlAttribute>,
        _flags: ElementFlags,
    ) -> Self::Handle {
        self.create(SinkData::Element {
            name,
            attributes: attrs,
        })
    }

    fn create_comment(&self, text: StrTendril) -> Self::Handle {
        self.create(SinkData::Comment(text.to_string()))
    }

    fn create_pi(&self, target: StrTendril, data: StrTendril) -> Self::Handle {
        self.create(SinkData::Pi(format!("{target} {data}")))
    }

    fn append(&self, parent: &Self::Handle, child: NodeOrText<Self::Handle>) {
        let end = self.nodes.borrow()[*parent].children.len();
        self.insert(*parent, end, child);
    }

    fn append_based_on_parent_node(
        &self,
        element: &Self::Handle,
        prev_element: &Self::Handle,
        child: NodeOrText<Self::Handle>,
    ) {
        let has_parent = self.nodes.borrow()[*element].parent.is_some();
        if has_parent {
            self.append_before_sibling(element, child);
        } else {
            self.append(prev_element, child);
        }
    }

    fn append_doctype_to_document(
        &self,
        name: StrTendril,
        public_id: StrTendril,
        system_id: StrTendril,
    ) {
        let doctype = match (public_id.is_empty(), system_id.is_empty()) {
            (true, true) => name.to_string(),
            (true, false) => format!(r#"{name} SYSTEM "{system_id}""#),
            (false, _) => format!(r#"{name} PUBLIC "{public_id}" "{system_id}""#),
        };
        let handle = self.create(SinkData::Doctype(doctype));
        self.append(&DOCUMENT, NodeOrText::AppendNode(handle));
    }

    fn get_template_contents(&self, target: &Self::Handle) -> Self::Handle {
        *target
    }

    fn same_node(&self, x: &Self::Handle, y: &Self::Handle) -> bool {
        x == y
    }

    fn set_quirks_mode(&self, _mode: QuirksMode) {}

    fn append_before_sibling(&self, sibling: &Self::Handle, new_node: NodeOrText<Self::Handle>) {
        let position = {
            let nodes = self.nodes.borrow();
            nodes[*sibling].parent.and_then(|parent| {
                let index = nodes[parent]
                    .children
                    .iter()
                    .position(|child| child == sibling)?;
                Some((parent, index))
            })
        };

        if let Some((parent, index)) = position {
            self.insert(parent, index, new_node);
        }
    }

    fn add_attrs_if_missing(&self, target: &Self::Handle, attrs: Vec<HtmlAttribute>) {
        let mut nodes = self.nodes.borrow_mut();
        if let SinkData::Element { attributes, .. } = &mut nodes[*target].data {
            for attr in attrs {
                if !attributes.iter().any(|existing| existing.name == attr.name) {
                    attributes.push(attr);
                }
            }
        }
    }

    fn remove_from_parent(&self, target: &Self::Handle) {
        Self::detach(&mut self.nodes.borrow_mut(), *target);
    }

    fn reparent_children(&self, node: &Self::Handle, new_parent: &Self::Handle) {
        let mut nodes = self.nodes.borrow_mut();
        let children = std::mem::take(&mut nodes[*node].children);
        for &child in &children {
            nodes[child].parent = Some(*new_parent);
        }
        nodes[*new_parent].children.extend(children);
    }
}

/// Parses markup written in HTML syntax
///
/// Parsing never fails: like a browser, the tree builder recovers from
/// markup errors.
pub(crate) fn parse(content: &str) -> Document {
    parse_document(ArenaSink::new(), ParseOpts::default())
        .from_utf8()
        .one(content.as_bytes())
        .into_document()
}
