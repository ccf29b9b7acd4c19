//! Owned, mutable tree over rendered diagram markup.
//!
//! The renderer hands back SVG text; painting metric values needs parent links,
//! ancestor queries and in-place insertion, none of which a borrowed XML view offers.
//! [`Document::parse`] copies a `roxmltree` parse into an arena that can be edited and
//! written back out with its namespace declarations intact.

use crate::error::Result;

pub type NodeId = usize;

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Local name; `tag` and `is_tag` compare against this.
    pub name: String,
    /// Namespace prefix the element was written with, if any.
    pub prefix: Option<String>,
    pub attrs: Vec<(String, String)>,
}

impl Element {
    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}:{}", self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Document {
    pub fn parse(markup: &str) -> Result<Self> {
        let options = roxmltree::ParsingOptions {
            allow_dtd: true,
            ..roxmltree::ParsingOptions::default()
        };
        let xml = roxmltree::Document::parse_with_options(markup, options)?;
        let mut doc = Document {
            nodes: Vec::new(),
            root: 0,
        };
        doc.root = doc.import(xml.root_element(), None);
        Ok(doc)
    }

    fn import(&mut self, source: roxmltree::Node<'_, '_>, parent: Option<NodeId>) -> NodeId {
        let mut attrs = Vec::new();
        let outer = source.parent_element();
        for ns in source.namespaces() {
            if ns.name() == Some("xml") {
                continue;
            }
            let inherited = outer.is_some_and(|p| {
                p.namespaces()
                    .any(|o| o.name() == ns.name() && o.uri() == ns.uri())
            });
            if inherited {
                continue;
            }
            let key = match ns.name() {
                Some(prefix) => format!("xmlns:{prefix}"),
                None => "xmlns".to_string(),
            };
            attrs.push((key, ns.uri().to_string()));
        }
        for attr in source.attributes() {
            let name = match attr.namespace() {
                Some(XML_NS) => format!("xml:{}", attr.name()),
                Some(uri) => match source.lookup_prefix(uri) {
                    Some(prefix) if !prefix.is_empty() => format!("{prefix}:{}", attr.name()),
                    _ => attr.name().to_string(),
                },
                None => attr.name().to_string(),
            };
            attrs.push((name, attr.value().to_string()));
        }

        let tag = source.tag_name();
        let prefix = tag
            .namespace()
            .and_then(|uri| source.lookup_prefix(uri))
            .filter(|prefix| !prefix.is_empty())
            .map(str::to_string);
        let id = self.push(
            NodeKind::Element(Element {
                name: tag.name().to_string(),
                prefix,
                attrs,
            }),
            parent,
        );
        for child in source.children() {
            if child.is_element() {
                let child_id = self.import(child, Some(id));
                self.nodes[id].children.push(child_id);
            } else if child.is_text() {
                let text = child.text().unwrap_or_default().to_string();
                let child_id = self.push(NodeKind::Text(text), Some(id));
                self.nodes[id].children.push(child_id);
            }
        }
        id
    }

    fn push(&mut self, kind: NodeKind, parent: Option<NodeId>) -> NodeId {
        self.nodes.push(Node {
            kind,
            parent,
            children: Vec::new(),
        });
        self.nodes.len() - 1
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id].kind
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id].kind {
            NodeKind::Element(el) => Some(el.name.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    /// Tag comparison is ASCII case-insensitive so HTML labels inside
    /// `foreignObject` match however the renderer spelled them.
    pub fn is_tag(&self, id: NodeId, name: &str) -> bool {
        self.tag(id).is_some_and(|tag| tag.eq_ignore_ascii_case(name))
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.nodes[id].kind {
            NodeKind::Element(el) => el
                .attrs
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        let NodeKind::Element(el) = &mut self.nodes[id].kind else {
            return;
        };
        let value = value.into();
        match el.attrs.iter_mut().find(|(key, _)| key == name) {
            Some(slot) => slot.1 = value,
            None => el.attrs.push((name.to_string(), value)),
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Option<String> {
        let NodeKind::Element(el) = &mut self.nodes[id].kind else {
            return None;
        };
        let idx = el.attrs.iter().position(|(key, _)| key == name)?;
        Some(el.attrs.remove(idx).1)
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.attr(id, "class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
    }

    /// Reads one declaration out of the inline `style` attribute.
    pub fn style(&self, id: NodeId, property: &str) -> Option<String> {
        let style = self.attr(id, "style")?;
        parse_declarations(style)
            .into_iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(property))
            .map(|(_, value)| value)
    }

    /// Sets one declaration in the inline `style` attribute, keeping the others.
    pub fn set_style(&mut self, id: NodeId, property: &str, value: &str) {
        let mut decls = self
            .attr(id, "style")
            .map(parse_declarations)
            .unwrap_or_default();
        match decls
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(property))
        {
            Some(slot) => slot.1 = value.to_string(),
            None => decls.push((property.to_string(), value.to_string())),
        }
        let joined = decls
            .iter()
            .map(|(key, value)| format!("{key}: {value}"))
            .collect::<Vec<_>>()
            .join("; ");
        self.set_attr(id, "style", joined);
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn first_element_child(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id]
            .children
            .iter()
            .copied()
            .find(|child| self.tag(*child).is_some())
    }

    /// Element descendants of `id` in document order, `id` itself excluded.
    pub fn descendant_elements(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[id].children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            if self.tag(next).is_none() {
                continue;
            }
            out.push(next);
            stack.extend(self.nodes[next].children.iter().rev().copied());
        }
        out
    }

    /// First descendant element matching `pred`, like `querySelector`.
    pub fn find(&self, id: NodeId, pred: impl Fn(&Self, NodeId) -> bool) -> Option<NodeId> {
        self.descendant_elements(id)
            .into_iter()
            .find(|node| pred(self, *node))
    }

    /// Nearest element starting at `id` itself and walking up, like `Element.closest`.
    pub fn closest(&self, id: NodeId, pred: impl Fn(&Self, NodeId) -> bool) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(node) = current {
            if self.tag(node).is_some() && pred(self, node) {
                return Some(node);
            }
            current = self.nodes[node].parent;
        }
        None
    }

    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id].kind {
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Element(_) => {
                for child in &self.nodes[id].children {
                    self.collect_text(*child, out);
                }
            }
        }
    }

    /// Creates a detached element; it inherits its namespace from wherever it is inserted.
    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.push(
            NodeKind::Element(Element {
                name: name.to_string(),
                prefix: None,
                attrs: Vec::new(),
            }),
            None,
        )
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::Text(text.to_string()), None)
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
    }

    /// Inserts `child` right after `reference`. Returns false when `reference` has no parent.
    pub fn insert_after(&mut self, reference: NodeId, child: NodeId) -> bool {
        let Some(parent) = self.nodes[reference].parent else {
            return false;
        };
        self.detach(child);
        let pos = self.nodes[parent]
            .children
            .iter()
            .position(|c| *c == reference)
            .map(|idx| idx + 1)
            .unwrap_or(self.nodes[parent].children.len());
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.insert(pos, child);
        true
    }

    /// Replaces all children of `id` with a single text node.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        for child in std::mem::take(&mut self.nodes[id].children) {
            self.nodes[child].parent = None;
        }
        let node = self.create_text(text);
        self.append_child(id, node);
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id].parent.take() {
            self.nodes[parent].children.retain(|c| *c != id);
        }
    }

    pub fn to_markup(&self) -> String {
        self.markup_of(self.root)
    }

    pub fn markup_of(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, &mut out);
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id].kind {
            NodeKind::Text(text) => out.push_str(&escape_text(text)),
            NodeKind::Element(el) => {
                let name = el.qualified_name();
                out.push('<');
                out.push_str(&name);
                for (key, value) in &el.attrs {
                    out.push(' ');
                    out.push_str(key);
                    out.push_str("=\"");
                    out.push_str(&escape_attr(value));
                    out.push('"');
                }
                let children = &self.nodes[id].children;
                if children.is_empty() {
                    out.push_str("/>");
                    return;
                }
                out.push('>');
                for child in children {
                    self.write_node(*child, out);
                }
                out.push_str("</");
                out.push_str(&name);
                out.push('>');
            }
        }
    }
}

fn parse_declarations(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|decl| {
            let (key, value) = decl.split_once(':')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

pub fn escape_text(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn escape_attr(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" id="d"><g class="node default" data-id="A"><rect width="10"/><g class="label"><foreignObject width="20" height="10"><div xmlns="http://www.w3.org/1999/xhtml"><span class="nodeLabel">Alpha</span></div></foreignObject></g></g><use xlink:href="#d"/></svg>"##;

    #[test]
    fn parse_and_write_keeps_namespaces() {
        let doc = Document::parse(SAMPLE).unwrap();
        let out = doc.to_markup();
        assert!(out.starts_with("<svg "));
        assert!(out.contains(" xmlns=\"http://www.w3.org/2000/svg\""));
        assert!(out.contains("xmlns:xlink=\"http://www.w3.org/1999/xlink\""));
        assert!(out.contains("<div xmlns=\"http://www.w3.org/1999/xhtml\">"));
        assert!(out.contains("xlink:href=\"#d\""));
        // Writing is stable across a second parse.
        assert_eq!(Document::parse(&out).unwrap().to_markup(), out);
    }

    #[test]
    fn prefixed_elements_keep_their_prefix() {
        let markup = r#"<svg:svg xmlns:svg="http://www.w3.org/2000/svg"><svg:g><svg:rect width="4"/></svg:g></svg:svg>"#;
        let doc = Document::parse(markup).unwrap();
        let rect = doc.find(doc.root(), |d, n| d.is_tag(n, "rect")).unwrap();
        assert_eq!(doc.tag(rect), Some("rect"));
        let out = doc.to_markup();
        assert!(out.starts_with("<svg:svg "));
        assert!(out.contains("<svg:g><svg:rect width=\"4\"/></svg:g></svg:svg>"));
        assert_eq!(Document::parse(&out).unwrap().to_markup(), out);
    }

    #[test]
    fn closest_includes_self_and_walks_up() {
        let doc = Document::parse(SAMPLE).unwrap();
        let span = doc.find(doc.root(), |d, n| d.is_tag(n, "span")).unwrap();
        assert_eq!(doc.closest(span, |d, n| d.is_tag(n, "span")), Some(span));
        let node = doc.closest(span, |d, n| d.has_class(n, "node")).unwrap();
        assert_eq!(doc.attr(node, "data-id"), Some("A"));
        assert!(doc.closest(span, |d, n| d.is_tag(n, "text")).is_none());
    }

    #[test]
    fn text_content_concatenates_descendants() {
        let doc = Document::parse("<text><tspan>a</tspan><tspan>b</tspan></text>").unwrap();
        assert_eq!(doc.text_content(doc.root()), "ab");
    }

    #[test]
    fn set_style_replaces_existing_declaration() {
        let mut doc = Document::parse(r#"<rect style="fill: red; stroke: blue"/>"#).unwrap();
        let root = doc.root();
        doc.set_style(root, "fill", "green");
        doc.set_style(root, "opacity", "0.5");
        assert_eq!(
            doc.attr(root, "style"),
            Some("fill: green; stroke: blue; opacity: 0.5")
        );
        assert_eq!(doc.style(root, "stroke").as_deref(), Some("blue"));
    }

    #[test]
    fn insert_after_places_sibling() {
        let mut doc = Document::parse("<g><a/><c/></g>").unwrap();
        let a = doc.first_element_child(doc.root()).unwrap();
        let b = doc.create_element("b");
        assert!(doc.insert_after(a, b));
        assert_eq!(doc.to_markup(), "<g><a/><b/><c/></g>");
        let detached = doc.create_element("x");
        assert!(!doc.insert_after(detached, b));
    }

    #[test]
    fn text_is_escaped_on_write() {
        let mut doc = Document::parse("<text/>").unwrap();
        let root = doc.root();
        doc.set_text(root, "a < b & c");
        assert_eq!(doc.to_markup(), "<text>a &lt; b &amp; c</text>");
    }
}
