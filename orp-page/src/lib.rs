//! In-page side of `orp://` support.
//!
//! A [`PageIntegrator`] enhances scheme-qualified anchors, links bare
//! addresses found in text, keeps doing so as the page changes, and resolves
//! clicks through a [`orp_core::ResolveChannel`].

pub mod dom;
pub mod integrator;
pub mod scan;
pub mod styles;

pub use dom::{Document, NodeId};
pub use integrator::{ClickOutcome, PageIntegrator, PendingClick, ERROR_CLASS, LOADING_CLASS};
pub use scan::{ScanReport, AUTO_LINK_CLASS, ICON_CLASS, LINK_CLASS};
pub use styles::STYLE_ID;
