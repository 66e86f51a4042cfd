//! Inline SVG substitution.
//!
//! `<icon src="name.svg">` and `<logo src="name.svg">` elements are replaced
//! with the contents of the matching file under `src-svg/`. A missing file
//! logs an error and leaves the element untouched.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::config::SiteConfig;
use crate::utils::normalize_path;

static SVG_ELEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<(?:icon|logo)\b[^>]*\bsrc\s*=\s*"([^"]+)"[^>]*>(?:\s*</(?:icon|logo)>)?"#)
        .expect("svg element regex")
});

/// Replace icon/logo elements with inline SVG content, collecting the
/// resolved file paths into `used`.
pub fn inline_svgs(html: &str, config: &SiteConfig, used: &mut Vec<PathBuf>) -> String {
    SVG_ELEMENT
        .replace_all(html, |caps: &Captures| {
            let src = &caps[1];
            let path = config.svg_dir().join(src);
            match std::fs::read_to_string(&path) {
                Ok(svg) => {
                    used.push(normalize_path(&path));
                    svg
                }
                Err(_) => {
                    crate::log!("error"; "missing SVG -- {}", path.display());
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}
