//! Path classification.
//!
//! Pure and total: every path maps to a category or `None`, never an
//! error. Rules are evaluated in precedence order against a lowercased,
//! slash-normalized spelling of the path; the extension whitelists come
//! from configuration data, not hard-coded domain logic.

use std::path::Path;

use crate::config::whitelist::{
    INLINE_SCRIPT_SUFFIX, MEDIA_SEGMENT, SRC_SEGMENT, SVG_SEGMENT, TEMPLATE_EXTENSION,
    TEMPLATE_SEGMENT, is_media_extension, is_src_asset_extension,
};

/// Semantic category of a watched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathCategory {
    /// Source page producing one rendered HTML output.
    Page,
    /// Template module under a `templates/` tree.
    Template,
    /// Vector graphic inlined into page bodies.
    InlineSvg,
    /// Script bundled verbatim into HTML (`*.inline.js`).
    InlineScript,
    /// File copied into the output tree.
    Asset,
}

/// Classify a filesystem path.
pub fn classify(path: &Path) -> Option<PathCategory> {
    let normalized = path.to_string_lossy().replace('\\', "/").to_lowercase();

    if normalized.ends_with(".html") || normalized.ends_with(".md") {
        return Some(PathCategory::Page);
    }
    if normalized.contains(TEMPLATE_SEGMENT) && normalized.ends_with(TEMPLATE_EXTENSION) {
        return Some(PathCategory::Template);
    }
    if normalized.contains(SVG_SEGMENT) && normalized.ends_with(".svg") {
        return Some(PathCategory::InlineSvg);
    }
    if normalized.ends_with(INLINE_SCRIPT_SUFFIX) {
        return Some(PathCategory::InlineScript);
    }

    let ext = match normalized.rfind('.') {
        Some(idx) => &normalized[idx..],
        None => return None,
    };
    if normalized.contains(MEDIA_SEGMENT) && is_media_extension(ext) {
        return Some(PathCategory::Asset);
    }
    if normalized.contains(SRC_SEGMENT) && is_src_asset_extension(ext) {
        return Some(PathCategory::Asset);
    }

    None
}
