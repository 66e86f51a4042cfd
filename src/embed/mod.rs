//! Core fallback assets embedded in the binary.
//!
//! Template resolution falls back here when a project does not override a
//! slot/name pair under `templates/`, and the fallback stylesheet covers
//! pages that reference `styles.css` without shipping one.

/// Virtual path prefix recorded for embedded templates. Dependency lookups
/// canonicalize both this and project paths to the same `slot/name` identity.
pub const CORE_TEMPLATE_PREFIX: &str = "core/templates";

/// Look up an embedded core template by slot and name.
pub fn core_template(slot: &str, name: &str) -> Option<&'static str> {
    match (slot, name) {
        ("head", "default") => Some(include_str!("../../core/templates/head/default.tmpl")),
        ("nav", "default") => Some(include_str!("../../core/templates/nav/default.tmpl")),
        ("footer", "default") => Some(include_str!("../../core/templates/footer/default.tmpl")),
        _ => None,
    }
}

/// Look up an embedded core stylesheet by site-relative href.
pub fn core_css(rel: &str) -> Option<&'static str> {
    match rel {
        "styles.css" => Some(include_str!("../../core/css/styles.css")),
        _ => None,
    }
}
