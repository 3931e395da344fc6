//! Page Integrator: makes `orp://` content in a rendered page clickable and
//! routes clicks through the Message Bus.
//!
//! The integrator owns the [`Document`]. Page code that mutates the document
//! goes through [`PageIntegrator::document_mut`]; those insertions are picked
//! up by [`PageIntegrator::process_mutations`]. Annotations the integrator adds
//! itself are made untracked and never trigger a re-scan.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use orp_core::config::PageSettings;
use orp_core::{ResolutionResponse, ResolveChannel, TransportFailure};

use crate::dom::{Document, NodeId};
use crate::scan::{self, ScanReport};
use crate::styles;

pub const LOADING_CLASS: &str = "orp-loading";
pub const ERROR_CLASS: &str = "orp-error";

const UNRESOLVED_MESSAGE: &str = "Unable to resolve this orp:// address";

/// A click that was intercepted and is waiting for its resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingClick {
    pub anchor: NodeId,
    pub uri: String,
    loading: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// Not a scheme-qualified link; default handling applies.
    PassThrough,
    /// The document navigated to this URL.
    Navigated(String),
    /// An error annotation was shown next to the anchor.
    Failed { message: String },
}

#[derive(Debug, Clone, Copy)]
struct Annotation {
    node: NodeId,
    expires_at: Instant,
}

/// Owns a page and its `orp://` enhancements.
///
/// Error annotations are not removed on their own. The host event loop must
/// wake at [`PageIntegrator::next_expiry`] and call
/// [`PageIntegrator::expire_annotations`] with the current time; the
/// integrator never starts a timer.
#[derive(Debug)]
pub struct PageIntegrator {
    doc: Document,
    error_display: Duration,
    annotations: Vec<Annotation>,
}

impl PageIntegrator {
    pub fn new(doc: Document, settings: &PageSettings) -> Self {
        Self {
            doc,
            error_display: settings.error_display(),
            annotations: Vec::new(),
        }
    }

    /// Build an integrator and run its initial pass: styles, a full scan and
    /// draining of whatever the page recorded before attachment.
    pub fn attach(doc: Document, settings: &PageSettings) -> (Self, ScanReport) {
        let mut integrator = Self::new(doc, settings);
        integrator.inject_styles();
        let root = integrator.scan_root();
        let report = integrator.scan_subtree(root);
        integrator.doc.take_added();
        tracing::debug!(
            anchors = report.anchors_enhanced,
            links = report.links_created,
            "page integrator attached"
        );
        (integrator, report)
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Mutable access for page code. Insertions made here are tracked.
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    pub fn into_document(self) -> Document {
        self.doc
    }

    pub fn inject_styles(&mut self) -> bool {
        self.doc.untracked(styles::inject_styles)
    }

    pub fn enhance_links(&mut self, root: NodeId) -> ScanReport {
        self.doc.untracked(|doc| scan::enhance_links(doc, root))
    }

    pub fn detect_bare_text(&mut self, root: NodeId) -> ScanReport {
        self.doc.untracked(|doc| scan::detect_bare_text(doc, root))
    }

    fn scan_root(&self) -> NodeId {
        self.doc.body().unwrap_or(self.doc.root())
    }

    fn scan_subtree(&mut self, root: NodeId) -> ScanReport {
        // Detection first so the anchors it creates are enhanced in the same pass.
        let mut report = self.detect_bare_text(root);
        report += self.enhance_links(root);
        report
    }

    /// Re-scan only the subtrees added since the last call that carry
    /// scheme-qualified content. Nodes nested inside another added node are
    /// covered by that node's scan.
    pub fn process_mutations(&mut self) -> ScanReport {
        let added = self.doc.take_added();
        let mut report = ScanReport::default();
        if added.is_empty() {
            return report;
        }

        let mut candidates: Vec<NodeId> = added
            .into_iter()
            .filter(|&id| self.doc.is_connected(id))
            .filter(|&id| scan::contains_scoped_content(&self.doc, id))
            .collect();
        let mut seen = HashSet::new();
        candidates.retain(|&id| seen.insert(id));

        let batch: HashSet<NodeId> = candidates.iter().copied().collect();
        candidates.retain(|&id| !self.doc.ancestors(id).any(|a| batch.contains(&a)));

        for root in &candidates {
            report += self.scan_subtree(*root);
        }
        if !report.is_empty() {
            tracing::debug!(subtrees = candidates.len(), ?report, "re-scanned added content");
        }
        report
    }

    // -----------------------------------------------------------------------
    // Clicks
    // -----------------------------------------------------------------------

    /// Intercept a click on `target`. Returns `None` when the click is not on
    /// (or inside) a scheme-qualified anchor; otherwise the default action is
    /// suppressed and a loading annotation is shown.
    pub fn begin_click(&mut self, target: NodeId) -> Option<PendingClick> {
        let anchor = scan::closest_scoped_anchor(&self.doc, target)?;
        let uri = self.doc.attr(anchor, "href")?.to_string();

        let loading = self.doc.untracked(|doc| {
            let span = doc.create_element("span");
            doc.set_attr(span, "class", LOADING_CLASS);
            doc.set_attr(span, "style", "color: #007acc");
            let glyph = doc.create_text(" ⏳");
            doc.append_child(span, glyph);
            doc.append_child(anchor, span);
            span
        });

        tracing::debug!(%uri, "intercepted click");
        Some(PendingClick {
            anchor,
            uri,
            loading,
        })
    }

    /// Apply the bus answer for `pending`. The loading annotation is removed
    /// whatever the outcome.
    pub fn finish_click(
        &mut self,
        pending: PendingClick,
        response: Result<ResolutionResponse, TransportFailure>,
        now: Instant,
    ) -> ClickOutcome {
        let outcome = match response {
            Ok(answer) => match answer.url() {
                Some(url) => {
                    let url = url.to_string();
                    tracing::info!(uri = %pending.uri, %url, "navigating to resolved address");
                    self.doc.navigate(&url);
                    ClickOutcome::Navigated(url)
                }
                None => {
                    tracing::warn!(uri = %pending.uri, error = ?answer.error, "address did not resolve");
                    self.show_error(pending.anchor, UNRESOLVED_MESSAGE, now)
                }
            },
            Err(err) => {
                tracing::error!(uri = %pending.uri, error = %err, "resolution request failed");
                self.show_error(pending.anchor, &err.to_string(), now)
            }
        };

        self.doc.remove(pending.loading);
        outcome
    }

    /// Full click flow over `channel`.
    pub async fn handle_click<C: ResolveChannel>(
        &mut self,
        target: NodeId,
        channel: &C,
    ) -> ClickOutcome {
        let Some(pending) = self.begin_click(target) else {
            return ClickOutcome::PassThrough;
        };
        let response = channel.resolve(&pending.uri).await;
        self.finish_click(pending, response, Instant::now())
    }

    fn show_error(&mut self, anchor: NodeId, message: &str, now: Instant) -> ClickOutcome {
        let node = self.doc.untracked(|doc| {
            let span = doc.create_element("span");
            doc.set_attr(span, "class", ERROR_CLASS);
            doc.set_attr(span, "style", "color: #cc0000; font-size: 0.8em");
            let text = doc.create_text(&format!(" ❌ {message}"));
            doc.append_child(span, text);
            doc.append_child(anchor, span);
            span
        });
        self.annotations.push(Annotation {
            node,
            expires_at: now + self.error_display,
        });
        ClickOutcome::Failed {
            message: message.to_string(),
        }
    }

    // -----------------------------------------------------------------------
    // Annotation timers
    // -----------------------------------------------------------------------

    /// Remove error annotations whose display time is over. Returns how many
    /// were removed.
    pub fn expire_annotations(&mut self, now: Instant) -> usize {
        let (expired, live): (Vec<_>, Vec<_>) = self
            .annotations
            .drain(..)
            .partition(|annotation| annotation.expires_at <= now);
        self.annotations = live;
        for annotation in &expired {
            self.doc.remove(annotation.node);
        }
        expired.len()
    }

    /// When the next error annotation is due to disappear.
    pub fn next_expiry(&self) -> Option<Instant> {
        self.annotations.iter().map(|a| a.expires_at).min()
    }

    pub fn pending_annotations(&self) -> usize {
        self.annotations.len()
    }
}
