//! The page the integrator works on: a `scraper::Html` tree plus mutation
//! records.
//!
//! Nodes are addressed by [`NodeId`]. Removing a node only detaches it, so ids
//! stay valid for the lifetime of the document. Operations on unknown ids are
//! no-ops returning `false` / `None`. Comments and doctypes are kept as parsed
//! and serialization goes through html5ever.
//!
//! While tracking is on, every node inserted into the tree is recorded, the way
//! a `MutationObserver` would see `childList` additions. The integrator wraps
//! its own edits in [`Document::untracked`] so they are not fed back to it.

use html5ever::serialize::{Serialize, SerializeOpts, TraversalScope};
use html5ever::{Attribute, LocalName, Namespace, QualName};
use scraper::node::{Element, Text};
use scraper::{ElementRef, Html, Node, StrTendril};

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Handle to a node of one [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(ego_tree::NodeId);

#[derive(Debug, Clone)]
pub struct Document {
    html: Html,
    added: Vec<NodeId>,
    tracking: bool,
    location: Option<String>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Empty `<!DOCTYPE html><html><head></head><body></body></html>` document.
    pub fn new() -> Self {
        Self::parse("<!DOCTYPE html>")
    }

    /// Parse an HTML document. Parsing records no mutations.
    pub fn parse(html: &str) -> Self {
        Self {
            html: Html::parse_document(html),
            added: Vec::new(),
            tracking: true,
            location: None,
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(self.html.tree.root().id())
    }

    pub fn head(&self) -> Option<NodeId> {
        self.first_element_by_tag(self.root(), "head")
    }

    pub fn body(&self) -> Option<NodeId> {
        self.first_element_by_tag(self.root(), "body")
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    /// New detached HTML element.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        let name = QualName::new(
            None,
            Namespace::from(HTML_NAMESPACE),
            LocalName::from(tag.to_ascii_lowercase()),
        );
        self.orphan(Node::Element(Element::new(name, Vec::new())))
    }

    /// New detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.orphan(Node::Text(Text {
            text: StrTendril::from_slice(text),
        }))
    }

    fn orphan(&mut self, node: Node) -> NodeId {
        NodeId(self.html.tree.orphan(node).id())
    }

    // -----------------------------------------------------------------------
    // Tree mutation
    // -----------------------------------------------------------------------

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` under `parent` before `reference` (or last when `None`).
    /// `child` is detached from its previous parent first.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> bool {
        if !self.can_contain(parent, child) {
            return false;
        }
        if let Some(reference) = reference {
            if reference == child || self.parent(reference) != Some(parent) {
                return false;
            }
        }

        // ego_tree reads sibling links before detaching, so detach up front.
        self.detach(child);
        let tree = &mut self.html.tree;
        let anchor = match reference {
            Some(reference) => tree.get_mut(reference.0).map(|mut r| {
                r.insert_id_before(child.0);
            }),
            None => tree.get_mut(parent.0).map(|mut p| {
                p.append_id(child.0);
            }),
        };
        if anchor.is_none() {
            return false;
        }
        self.record(child);
        true
    }

    /// Put `new` where `old` is and detach `old`.
    pub fn replace_child(&mut self, parent: NodeId, new: NodeId, old: NodeId) -> bool {
        if new == old || self.parent(old) != Some(parent) {
            return false;
        }
        if !self.insert_before(parent, new, Some(old)) {
            return false;
        }
        self.detach(old);
        true
    }

    /// Detach `node` from the tree. It keeps its own children.
    pub fn remove(&mut self, node: NodeId) -> bool {
        if node == self.root() || self.parent(node).is_none() {
            return false;
        }
        self.detach(node);
        true
    }

    fn detach(&mut self, node: NodeId) {
        if let Some(mut node) = self.html.tree.get_mut(node.0) {
            node.detach();
        }
    }

    fn can_contain(&self, parent: NodeId, child: NodeId) -> bool {
        let (Some(parent_node), Some(_)) = (self.node(parent), self.node(child)) else {
            return false;
        };
        if !matches!(parent_node, Node::Document | Node::Element(_)) || child == self.root() {
            return false;
        }
        // Refuse cycles: `child` may not be `parent` or one of its ancestors.
        child != parent && !self.ancestors(parent).any(|a| a == child)
    }

    fn record(&mut self, node: NodeId) {
        if self.tracking {
            self.added.push(node);
        }
    }

    /// Run `f` without recording insertions.
    pub fn untracked<R>(&mut self, f: impl FnOnce(&mut Document) -> R) -> R {
        let previous = self.tracking;
        self.tracking = false;
        let result = f(self);
        self.tracking = previous;
        result
    }

    /// Drain nodes inserted since the last call, in insertion order.
    pub fn take_added(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.added)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// The parsed node behind `node`.
    pub fn node(&self, node: NodeId) -> Option<&Node> {
        self.html.tree.get(node.0).map(|n| n.value())
    }

    fn element(&self, node: NodeId) -> Option<&Element> {
        self.node(node)?.as_element()
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.html
            .tree
            .get(node.0)?
            .parent()
            .map(|p| NodeId(p.id()))
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.html
            .tree
            .get(node.0)
            .map(|n| n.children().map(|c| NodeId(c.id())).collect())
            .unwrap_or_default()
    }

    pub fn first_child(&self, node: NodeId) -> Option<NodeId> {
        self.html
            .tree
            .get(node.0)?
            .first_child()
            .map(|c| NodeId(c.id()))
    }

    /// Parent, grandparent, … up to the document root.
    pub fn ancestors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(node), move |&p| self.parent(p))
    }

    /// `node` and everything below it, in document order.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        self.html
            .tree
            .get(node.0)
            .map(|n| n.descendants().map(|d| NodeId(d.id())).collect())
            .unwrap_or_default()
    }

    /// `true` when `node` hangs off the document root.
    pub fn is_connected(&self, node: NodeId) -> bool {
        node == self.root() || self.ancestors(node).any(|a| a == self.root())
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(Element::name)
    }

    pub fn is_element(&self, node: NodeId, tag: &str) -> bool {
        self.tag(node) == Some(tag)
    }

    pub fn text(&self, node: NodeId) -> Option<&str> {
        match self.node(node)? {
            Node::Text(text) => Some(&**text),
            _ => None,
        }
    }

    /// Concatenated text of `node` and its descendants.
    pub fn text_content(&self, node: NodeId) -> String {
        self.descendants(node)
            .into_iter()
            .filter_map(|id| self.text(id))
            .collect()
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element(node)?.attr(&name.to_ascii_lowercase())
    }

    /// Set or replace an attribute, keeping attribute order.
    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) -> bool {
        let Some(mut node) = self.html.tree.get_mut(node.0) else {
            return false;
        };
        let Node::Element(element) = node.value() else {
            return false;
        };

        let name = name.to_ascii_lowercase();
        let value = StrTendril::from_slice(value);
        let mut replaced = false;
        let mut attrs: Vec<Attribute> = element
            .attrs
            .iter()
            .map(|(key, existing)| {
                let value = if &*key.local == name {
                    replaced = true;
                    value.clone()
                } else {
                    existing.clone()
                };
                Attribute {
                    name: key.clone(),
                    value,
                }
            })
            .collect();
        if !replaced {
            attrs.push(Attribute {
                name: QualName::new(None, Namespace::from(""), LocalName::from(name)),
                value,
            });
        }
        // Rebuilt so scraper's cached id and class lists stay in sync.
        *element = Element::new(element.name.clone(), attrs);
        true
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.attr(node, "class")
            .map(|classes| classes.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    /// Add `class` unless already present. Returns `true` if it was added.
    pub fn add_class(&mut self, node: NodeId, class: &str) -> bool {
        if self.tag(node).is_none() || self.has_class(node, class) {
            return false;
        }
        let joined = match self.attr(node, "class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {class}", existing.trim()),
            _ => class.to_string(),
        };
        self.set_attr(node, "class", &joined)
    }

    pub fn first_element_by_tag(&self, within: NodeId, tag: &str) -> Option<NodeId> {
        self.descendants(within)
            .into_iter()
            .find(|&id| self.is_element(id, tag))
    }

    pub fn elements_with_class(&self, within: NodeId, class: &str) -> Vec<NodeId> {
        self.descendants(within)
            .into_iter()
            .filter(|&id| self.has_class(id, class))
            .collect()
    }

    pub fn element_by_id(&self, id_value: &str) -> Option<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .find(|&id| self.attr(id, "id") == Some(id_value))
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    /// Where the page was sent by the last navigation, if any.
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn navigate(&mut self, url: &str) {
        self.location = Some(url.to_string());
    }

    // -----------------------------------------------------------------------
    // Serialization
    // -----------------------------------------------------------------------

    /// Serialize the whole document, doctype and comments included.
    pub fn to_html(&self) -> String {
        render(&self.html)
    }

    /// Serialize one element with its subtree. Text nodes come back as-is.
    pub fn outer_html(&self, node: NodeId) -> String {
        let Some(node_ref) = self.html.tree.get(node.0) else {
            return String::new();
        };
        match ElementRef::wrap(node_ref) {
            Some(element) => render(&element),
            None => self.text(node).unwrap_or_default().to_string(),
        }
    }
}

/// html5ever serialization with scripting on, matching how the parser read
/// `<noscript>` content.
fn render<T: Serialize>(value: &T) -> String {
    let opts = SerializeOpts {
        scripting_enabled: true,
        traversal_scope: TraversalScope::IncludeNode,
        create_missing_parent: false,
    };
    let mut buf = Vec::new();
    if let Err(err) = html5ever::serialize(&mut buf, value, opts) {
        tracing::warn!(error = %err, "html serialization failed");
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_document_has_head_and_body() {
        let doc = Document::new();
        assert!(doc.head().is_some());
        assert!(doc.body().is_some());
        assert_eq!(
            doc.to_html(),
            "<!DOCTYPE html><html><head></head><body></body></html>"
        );
    }

    #[test]
    fn parse_keeps_elements_attributes_and_text() {
        let doc = Document::parse(
            r#"<html><head><title>t</title></head><body><p id="x">Hi <a href="orp://n/p">link</a></p></body></html>"#,
        );
        let p = doc.element_by_id("x").expect("p");
        assert_eq!(doc.tag(p), Some("p"));
        let anchor = doc.first_element_by_tag(p, "a").expect("anchor");
        assert_eq!(doc.attr(anchor, "href"), Some("orp://n/p"));
        assert_eq!(doc.text_content(p), "Hi link");
    }

    #[test]
    fn parse_does_not_record_mutations() {
        let mut doc = Document::parse("<p>a</p>");
        assert!(doc.take_added().is_empty());
    }

    #[test]
    fn insertions_are_recorded_unless_untracked() {
        let mut doc = Document::new();
        let body = doc.body().expect("body");
        let p = doc.create_element("p");
        doc.append_child(body, p);
        assert_eq!(doc.take_added(), vec![p]);

        let span = doc.create_element("span");
        doc.untracked(|doc| doc.append_child(body, span));
        assert!(doc.take_added().is_empty());
    }

    #[test]
    fn insert_before_and_replace_child() {
        let mut doc = Document::new();
        let body = doc.body().expect("body");
        let a = doc.create_text("a");
        let b = doc.create_text("b");
        let c = doc.create_text("c");
        doc.append_child(body, c);
        doc.insert_before(body, a, Some(c));
        assert_eq!(doc.children(body), vec![a, c]);

        assert!(doc.replace_child(body, b, c));
        assert_eq!(doc.children(body), vec![a, b]);
        assert_eq!(doc.parent(c), None);
        assert!(!doc.is_connected(c));
    }

    #[test]
    fn cycles_and_text_parents_are_refused() {
        let mut doc = Document::new();
        let body = doc.body().expect("body");
        let div = doc.create_element("div");
        let inner = doc.create_element("span");
        doc.append_child(body, div);
        doc.append_child(div, inner);

        assert!(!doc.append_child(inner, div), "div is an ancestor of span");
        assert!(!doc.append_child(div, div));

        let text = doc.create_text("t");
        let other = doc.create_element("b");
        assert!(!doc.append_child(text, other));
    }

    #[test]
    fn classes_are_added_once() {
        let mut doc = Document::new();
        let a = doc.create_element("a");
        assert!(doc.add_class(a, "orp-link"));
        assert!(!doc.add_class(a, "orp-link"));
        doc.add_class(a, "other");
        assert_eq!(doc.attr(a, "class"), Some("orp-link other"));
        assert!(doc.has_class(a, "other"));
    }

    #[test]
    fn serialization_escapes_text_and_attributes() {
        let mut doc = Document::new();
        let body = doc.body().expect("body");
        let a = doc.create_element("a");
        doc.set_attr(a, "title", "say \"hi\" & bye");
        let text = doc.create_text("1 < 2");
        doc.append_child(a, text);
        doc.append_child(body, a);

        assert_eq!(
            doc.outer_html(a),
            r#"<a title="say &quot;hi&quot; &amp; bye">1 &lt; 2</a>"#
        );
    }

    #[test]
    fn style_content_is_not_escaped_and_void_elements_do_not_close() {
        let mut doc = Document::new();
        let head = doc.head().expect("head");
        let style = doc.create_element("style");
        let css = doc.create_text("a > b { color: red; }");
        doc.append_child(style, css);
        doc.append_child(head, style);
        let br = doc.create_element("br");
        doc.append_child(head, br);

        let html = doc.outer_html(head);
        assert!(html.contains("a > b { color: red; }"));
        assert!(html.contains("<br>"));
        assert!(!html.contains("</br>"));
    }

    #[test]
    fn comments_doctype_and_noscript_round_trip() {
        let source = concat!(
            "<!DOCTYPE html><html><head><!-- head note --></head><body>",
            r#"<noscript><img src="x.png"></noscript><!-- keep me --><p>hi &amp; bye</p>"#,
            "</body></html>",
        );
        assert_eq!(Document::parse(source).to_html(), source);
    }

    #[test]
    fn set_attr_keeps_source_attribute_order() {
        let mut doc = Document::parse(r#"<body><a href="orp://n/" id="x" title="t">x</a></body>"#);
        let anchor = doc.element_by_id("x").expect("anchor");
        doc.set_attr(anchor, "title", "changed");
        doc.add_class(anchor, "orp-link");

        assert_eq!(
            doc.outer_html(anchor),
            r#"<a href="orp://n/" id="x" title="changed" class="orp-link">x</a>"#
        );
        assert_eq!(doc.element_by_id("x"), Some(anchor));
    }

    #[test]
    fn removed_nodes_keep_their_ids() {
        let mut doc = Document::parse("<body><p id=\"p\">a</p></body>");
        let p = doc.element_by_id("p").expect("p");
        assert!(doc.remove(p));
        assert!(!doc.is_connected(p));
        assert_eq!(doc.text_content(p), "a");
        assert!(!doc.to_html().contains("<p"));

        let body = doc.body().expect("body");
        assert!(doc.append_child(body, p));
        assert!(doc.to_html().contains(r#"<p id="p">a</p>"#));
    }
}
