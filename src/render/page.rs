//! Page source parsing: TOML front matter split from the HTML/Markdown body.
//!
//! A page file is `<front matter> #---# <body>`. The front matter is TOML;
//! unknown keys warn (configs survive drift), structural mistakes fail with
//! the page path in the message.

use std::path::Path;

use anyhow::{Result, bail};
use serde::Deserialize;

use crate::config::whitelist::INLINE_SCRIPT_SUFFIX;

/// Delimiter between front matter and body.
pub const SEPARATOR: &str = "#---#";

/// Template slot assignments from front matter.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TemplateSlots {
    pub head: Option<String>,
    pub nav: Option<String>,
    pub footer: Option<String>,
}

/// Script references from front matter.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScriptRefs {
    /// Module scripts referenced with `<script type="module">`.
    pub modules: Vec<String>,
    /// Scripts bundled verbatim into the page (`*.inline.js`).
    pub inline: Vec<String>,
}

/// Navigation link metadata declared by a page.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NavLink {
    pub label: String,
    #[serde(default)]
    pub top_level: bool,
    #[serde(default)]
    pub sub_level: Option<String>,
}

/// Footer link metadata declared by a page.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FooterLink {
    pub label: String,
    #[serde(default)]
    pub column: Option<String>,
}

/// `[links]` table from front matter.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PageLinks {
    pub nav: Option<NavLink>,
    pub footer: Option<FooterLink>,
}

/// Parsed front matter for one page.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FrontMatter {
    pub title: Option<String>,
    pub description: Option<String>,
    pub css: Vec<String>,
    pub templates: TemplateSlots,
    pub scripts: ScriptRefs,
    pub links: Option<PageLinks>,
}

/// A parsed page: validated front matter plus the raw body.
#[derive(Debug, Clone)]
pub struct Page {
    pub front_matter: FrontMatter,
    pub body: String,
}

/// Parse and validate a page source file.
pub fn parse_page(path: &Path) -> Result<Page> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))?;
    parse_source(&raw, path)
}

/// Parse page source text (split out for tests).
pub fn parse_source(raw: &str, path: &Path) -> Result<Page> {
    let Some(idx) = raw.find(SEPARATOR) else {
        bail!("{}: missing \"{SEPARATOR}\" separator", path.display());
    };
    let toml_text = raw[..idx].trim();
    let body = raw[idx + SEPARATOR.len()..].to_string();

    let front_matter = if toml_text.is_empty() {
        FrontMatter::default()
    } else {
        parse_front_matter(toml_text, path)?
    };

    validate(&front_matter, path)?;
    Ok(Page { front_matter, body })
}

/// Parse the TOML segment, warning on unrecognized keys.
fn parse_front_matter(text: &str, path: &Path) -> Result<FrontMatter> {
    let de = toml::de::Deserializer::new(text);
    let mut unknown = Vec::new();
    let fm: FrontMatter = serde_ignored::deserialize(de, |key| unknown.push(key.to_string()))
        .map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))?;
    for key in unknown {
        crate::log!("page"; "{}: unknown front-matter key \"{}\"", path.display(), key);
    }
    Ok(fm)
}

/// Structural checks beyond what deserialization enforces.
fn validate(fm: &FrontMatter, path: &Path) -> Result<()> {
    if fm.title.is_none() {
        bail!("{}: \"title\" is required and must be a string", path.display());
    }
    if fm.templates.head.is_none() {
        bail!(
            "{}: \"templates.head\" is required and must be a string",
            path.display()
        );
    }
    for file in &fm.scripts.inline {
        if !file.ends_with(INLINE_SCRIPT_SUFFIX) {
            bail!(
                "{}: \"scripts.inline\" entries must end with {INLINE_SCRIPT_SUFFIX}",
                path.display()
            );
        }
    }
    Ok(())
}
