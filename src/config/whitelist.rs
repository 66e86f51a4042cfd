//! Extension whitelists grouped by asset type.
//!
//! The classifier treats these as opaque data: an extension either belongs
//! to a group or the path is ignored. All comparisons are lowercase and
//! include the leading dot.

/// Stylesheet extensions.
pub const STYLES: &[&str] = &[".css"];

/// Script extensions. Inline scripts use the `.inline.js` suffix and are
/// classified separately so they are bundled into HTML rather than copied
/// as standalone assets.
pub const SCRIPTS: &[&str] = &[".js"];

/// Image extensions.
pub const IMAGES: &[&str] = &[".svg", ".jpg", ".png", ".webp", ".ico"];

/// Video extensions.
pub const VIDEO: &[&str] = &[".mp4", ".webm"];

/// Document extensions.
pub const DOCUMENTS: &[&str] = &[".pdf"];

/// Font extensions.
pub const FONTS: &[&str] = &[".ttf", ".otf"];

/// Suffix marking a script for verbatim bundling into HTML.
pub const INLINE_SCRIPT_SUFFIX: &str = ".inline.js";

/// Extension of template modules under `templates/`.
pub const TEMPLATE_EXTENSION: &str = ".tmpl";

/// Path segment marking the template tree.
pub const TEMPLATE_SEGMENT: &str = "/templates/";

/// Path segment marking the inline-svg tree.
pub const SVG_SEGMENT: &str = "/src-svg/";

/// Path segment marking the media tree.
pub const MEDIA_SEGMENT: &str = "/media/";

/// Path segment marking the source tree.
pub const SRC_SEGMENT: &str = "/src/";

/// Is `ext` (lowercase, with dot) a media extension?
pub fn is_media_extension(ext: &str) -> bool {
    IMAGES.contains(&ext) || VIDEO.contains(&ext) || DOCUMENTS.contains(&ext) || FONTS.contains(&ext)
}

/// Is `ext` (lowercase, with dot) a source-asset extension, i.e. anything
/// that should be copied into the output tree when it changes under `src/`?
pub fn is_src_asset_extension(ext: &str) -> bool {
    STYLES.contains(&ext) || SCRIPTS.contains(&ext) || is_media_extension(ext)
}
