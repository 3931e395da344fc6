//! Static page passes: anchor enhancement and bare-text detection.
//!
//! Both passes are idempotent. Running them again over an already processed
//! subtree changes nothing, which is what lets the live re-scan reuse them.

use std::ops::AddAssign;
use std::sync::LazyLock;

use regex::Regex;

use orp_core::ScopedUri;

use crate::dom::{Document, NodeId};

pub const LINK_CLASS: &str = "orp-link";
pub const AUTO_LINK_CLASS: &str = "auto-detected-orp-link";
pub const ICON_CLASS: &str = "orp-icon";

const ICON_GLYPH: &str = "🌐";
const TITLE_PREFIX: &str = "OpenRed P2P link - ";

/// Elements whose text is never rewritten into links.
const OPAQUE_TEXT_PARENTS: &[&str] = &["script", "style", "textarea", "noscript"];

static SCOPED_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"orp://[^\s<>"']+"#).expect("scoped address pattern must compile")
});

/// What a scan changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    /// Anchors that received their icon marker in this pass.
    pub anchors_enhanced: usize,
    pub titles_added: usize,
    /// Text nodes rewritten into a wrapper with links.
    pub text_nodes_rewritten: usize,
    /// Anchors created from bare text.
    pub links_created: usize,
}

impl ScanReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl AddAssign for ScanReport {
    fn add_assign(&mut self, other: Self) {
        self.anchors_enhanced += other.anchors_enhanced;
        self.titles_added += other.titles_added;
        self.text_nodes_rewritten += other.text_nodes_rewritten;
        self.links_created += other.links_created;
    }
}

pub fn is_scoped_anchor(doc: &Document, node: NodeId) -> bool {
    doc.is_element(node, "a")
        && doc
            .attr(node, "href")
            .map(ScopedUri::is_scoped)
            .unwrap_or(false)
}

/// `node` itself or the nearest ancestor that is a scheme-qualified anchor.
pub fn closest_scoped_anchor(doc: &Document, node: NodeId) -> Option<NodeId> {
    std::iter::once(node)
        .chain(doc.ancestors(node))
        .find(|&id| is_scoped_anchor(doc, id))
}

pub fn scoped_anchors(doc: &Document, root: NodeId) -> Vec<NodeId> {
    doc.descendants(root)
        .into_iter()
        .filter(|&id| is_scoped_anchor(doc, id))
        .collect()
}

/// Text nodes under `root` that hold a bare address and may be rewritten.
pub fn bare_text_nodes(doc: &Document, root: NodeId) -> Vec<NodeId> {
    doc.descendants(root)
        .into_iter()
        .filter(|&id| {
            doc.text(id)
                .map(|text| SCOPED_TEXT.is_match(text))
                .unwrap_or(false)
        })
        .filter(|&id| {
            !doc.ancestors(id).any(|a| {
                doc.is_element(a, "a")
                    || doc
                        .tag(a)
                        .map(|tag| OPAQUE_TEXT_PARENTS.contains(&tag))
                        .unwrap_or(false)
            })
        })
        .collect()
}

/// `true` if a scan of `root` could change anything.
pub fn contains_scoped_content(doc: &Document, root: NodeId) -> bool {
    !scoped_anchors(doc, root).is_empty() || !bare_text_nodes(doc, root).is_empty()
}

/// Mark every scheme-qualified anchor under `root`: the link class, one icon
/// marker as first child and a title when none is set.
pub fn enhance_links(doc: &mut Document, root: NodeId) -> ScanReport {
    let mut report = ScanReport::default();

    for anchor in scoped_anchors(doc, root) {
        doc.add_class(anchor, LINK_CLASS);

        let has_icon = doc
            .descendants(anchor)
            .into_iter()
            .any(|id| doc.has_class(id, ICON_CLASS));
        if !has_icon {
            let icon = doc.create_element("span");
            doc.set_attr(icon, "class", ICON_CLASS);
            doc.set_attr(icon, "style", "margin-right: 4px");
            let glyph = doc.create_text(ICON_GLYPH);
            doc.append_child(icon, glyph);
            let first = doc.first_child(anchor);
            doc.insert_before(anchor, icon, first);
            report.anchors_enhanced += 1;
        }

        let untitled = doc
            .attr(anchor, "title")
            .map(|title| title.trim().is_empty())
            .unwrap_or(true);
        if untitled {
            let href = doc.attr(anchor, "href").unwrap_or_default().to_string();
            doc.set_attr(anchor, "title", &format!("{TITLE_PREFIX}{href}"));
            report.titles_added += 1;
        }
    }

    report
}

/// Rewrite bare addresses in text under `root` into
/// `<span>text <a class="auto-detected-orp-link" href=…>…</a> text</span>`.
pub fn detect_bare_text(doc: &mut Document, root: NodeId) -> ScanReport {
    let mut report = ScanReport::default();

    for text_node in bare_text_nodes(doc, root) {
        let Some(parent) = doc.parent(text_node) else {
            continue;
        };
        let Some(text) = doc.text(text_node).map(str::to_string) else {
            continue;
        };

        let wrapper = doc.create_element("span");
        let mut cursor = 0;
        for found in SCOPED_TEXT.find_iter(&text) {
            if found.start() > cursor {
                let before = doc.create_text(&text[cursor..found.start()]);
                doc.append_child(wrapper, before);
            }
            let anchor = doc.create_element("a");
            doc.set_attr(anchor, "href", found.as_str());
            doc.set_attr(anchor, "class", AUTO_LINK_CLASS);
            let label = doc.create_text(found.as_str());
            doc.append_child(anchor, label);
            doc.append_child(wrapper, anchor);
            report.links_created += 1;
            cursor = found.end();
        }
        if cursor < text.len() {
            let after = doc.create_text(&text[cursor..]);
            doc.append_child(wrapper, after);
        }

        if doc.replace_child(parent, wrapper, text_node) {
            report.text_nodes_rewritten += 1;
        }
    }

    if report.links_created > 0 {
        tracing::debug!(
            links = report.links_created,
            text_nodes = report.text_nodes_rewritten,
            "bare addresses linked"
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn body(doc: &Document) -> NodeId {
        doc.body().expect("body")
    }

    fn count_class(doc: &Document, class: &str) -> usize {
        doc.elements_with_class(doc.root(), class).len()
    }

    #[test]
    fn enhances_scoped_anchors_only() {
        let mut doc = Document::parse(
            r#"<body><a href="orp://node/a">a</a><a href="https://example.com">b</a></body>"#,
        );
        let root = body(&doc);
        let report = enhance_links(&mut doc, root);

        assert_eq!(report.anchors_enhanced, 1);
        assert_eq!(report.titles_added, 1);
        assert_eq!(count_class(&doc, LINK_CLASS), 1);
        assert_eq!(count_class(&doc, ICON_CLASS), 1);

        let anchor = scoped_anchors(&doc, doc.root())[0];
        assert_eq!(
            doc.attr(anchor, "title"),
            Some("OpenRed P2P link - orp://node/a")
        );
        let first = doc.first_child(anchor).expect("icon");
        assert!(doc.has_class(first, ICON_CLASS), "icon must be the first child");
    }

    #[test]
    fn enhancement_is_idempotent_and_keeps_existing_titles() {
        let mut doc =
            Document::parse(r#"<body><a href="orp://node/a" title="mine">a</a></body>"#);
        let root = body(&doc);
        enhance_links(&mut doc, root);
        let root = body(&doc);
        let second = enhance_links(&mut doc, root);

        assert!(second.is_empty());
        assert_eq!(count_class(&doc, ICON_CLASS), 1);
        let anchor = scoped_anchors(&doc, doc.root())[0];
        assert_eq!(doc.attr(anchor, "title"), Some("mine"));
        assert_eq!(doc.attr(anchor, "class"), Some(LINK_CLASS));
    }

    #[test]
    fn bare_text_becomes_links_in_a_wrapper() {
        let mut doc =
            Document::parse("<body><p>See orp://node-1/profile and orp://node-2 now</p></body>");
        let root = body(&doc);
        let report = detect_bare_text(&mut doc, root);

        assert_eq!(report.text_nodes_rewritten, 1);
        assert_eq!(report.links_created, 2);

        let p = doc.first_element_by_tag(doc.root(), "p").expect("p");
        assert_eq!(
            doc.outer_html(p),
            concat!(
                r#"<p><span>See <a href="orp://node-1/profile" class="auto-detected-orp-link">orp://node-1/profile</a>"#,
                r#" and <a href="orp://node-2" class="auto-detected-orp-link">orp://node-2</a> now</span></p>"#,
            )
        );
    }

    #[test]
    fn detection_is_idempotent() {
        let mut doc = Document::parse("<body><p>orp://node-1/x</p></body>");
        let root = body(&doc);
        detect_bare_text(&mut doc, root);
        let before = doc.to_html();

        let root = body(&doc);
        assert!(detect_bare_text(&mut doc, root).is_empty());
        assert_eq!(doc.to_html(), before);
    }

    #[rstest]
    #[case::inside_anchor(r#"<a href="https://x">orp://node/a</a>"#)]
    #[case::inside_nested_anchor(r#"<a href="orp://node/a"><b>orp://node/a</b></a>"#)]
    #[case::script("<script>var u = 'orp://node/a';</script>")]
    #[case::style("<style>/* orp://node/a */</style>")]
    #[case::textarea("<textarea>orp://node/a</textarea>")]
    #[case::noscript("<noscript>orp://node/a</noscript>")]
    #[case::no_address("<p>orp:// alone is not an address</p>")]
    fn text_is_left_alone(#[case] fragment: &str) {
        let mut doc = Document::parse(&format!("<html><body>{fragment}</body></html>"));
        let root = doc.root();
        assert!(detect_bare_text(&mut doc, root).is_empty());
    }

    #[rstest]
    #[case("orp://node/path.", "orp://node/path.")]
    #[case("\"orp://node/q\"", "orp://node/q")]
    #[case("<orp://node/x>", "orp://node/x")]
    fn address_stops_at_delimiters(#[case] text: &str, #[case] expected: &str) {
        let mut doc = Document::new();
        let body = doc.body().expect("body");
        let node = doc.create_text(text);
        doc.append_child(body, node);

        detect_bare_text(&mut doc, body);
        let anchor = doc.first_element_by_tag(body, "a").expect("anchor");
        assert_eq!(doc.attr(anchor, "href"), Some(expected));
    }

    #[test]
    fn closest_anchor_walks_up_from_inner_nodes() {
        let doc = Document::parse(r#"<body><a href="orp://n/p"><b id="inner">x</b></a></body>"#);
        let inner = doc.element_by_id("inner").expect("inner");
        let anchor = closest_scoped_anchor(&doc, inner).expect("anchor");
        assert!(doc.is_element(anchor, "a"));

        let body = doc.body().expect("body");
        assert_eq!(closest_scoped_anchor(&doc, body), None);
    }
}
