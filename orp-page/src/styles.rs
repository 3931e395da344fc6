use crate::dom::Document;

pub const STYLE_ID: &str = "orp-styles";

pub const STYLESHEET: &str = r#"
.orp-link, .auto-detected-orp-link {
  color: #007acc !important;
  text-decoration: underline !important;
  cursor: pointer !important;
  position: relative !important;
}

.orp-link:hover, .auto-detected-orp-link:hover {
  color: #005999 !important;
  background-color: rgba(0, 122, 204, 0.1) !important;
}

.orp-link::before, .auto-detected-orp-link::before {
  content: '';
  position: absolute;
  bottom: 0;
  left: 0;
  right: 0;
  height: 2px;
  background: linear-gradient(90deg, #007acc, #00cc88);
  opacity: 0.7;
}

.orp-loading {
  animation: orp-pulse 1s infinite;
}

@keyframes orp-pulse {
  0% { opacity: 0.5; }
  50% { opacity: 1; }
  100% { opacity: 0.5; }
}
"#;

/// Append the `<style id="orp-styles">` block to `<head>` unless the document
/// already has one. Returns `true` if a block was added.
pub fn inject_styles(doc: &mut Document) -> bool {
    if doc.element_by_id(STYLE_ID).is_some() {
        return false;
    }
    let parent = doc.head().or_else(|| doc.body()).unwrap_or(doc.root());

    let style = doc.create_element("style");
    doc.set_attr(style, "id", STYLE_ID);
    let css = doc.create_text(STYLESHEET);
    doc.append_child(style, css);
    doc.append_child(parent, style)
}
