//! Navigation/footer link metadata shared across pages (`links.json`).
//!
//! Each page's front matter may declare `[links.nav]` / `[links.footer]`
//! entries. Rendering a page merges its entries into the site-wide file,
//! keyed by the page's href; omitting a section removes the page's entry.
//! The merge reports whether anything changed so the orchestrator can
//! cascade re-renders of other link-bearing pages.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::page::PageLinks;

/// One navigation entry in `links.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavEntry {
    pub href: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub top_level: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_level: Option<String>,
}

/// One footer entry in `links.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FooterEntry {
    pub href: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

/// The full contents of `links.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinksData {
    pub nav: Vec<NavEntry>,
    pub footer: Vec<FooterEntry>,
}

/// Manages loading, merging and saving `links.json`.
pub struct LinksManager {
    path: PathBuf,
    data: LinksData,
    original: String,
}

impl LinksManager {
    /// Load `links.json`, treating a missing file as empty data.
    pub fn load(path: PathBuf) -> Result<Self> {
        let (data, original) = match std::fs::read_to_string(&path) {
            Ok(text) => {
                let data: LinksData = serde_json::from_str(&text)
                    .with_context(|| format!("parsing {}", path.display()))?;
                (data, text)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let data = LinksData::default();
                let original = to_json(&data);
                (data, original)
            }
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        Ok(Self {
            path,
            data,
            original,
        })
    }

    pub fn data(&self) -> &LinksData {
        &self.data
    }

    /// Merge one page's link declarations, keyed by `href`.
    ///
    /// Returns whether the collection was modified. A page that omits a
    /// section (or `links` entirely) has its entry removed.
    pub fn merge(&mut self, href: &str, links: Option<&PageLinks>) -> bool {
        let mut changed = false;

        let nav = links.and_then(|l| l.nav.as_ref());
        if let Some(nav) = nav {
            let item = NavEntry {
                href: href.to_string(),
                label: nav.label.clone(),
                top_level: nav.top_level,
                sub_level: nav.sub_level.clone(),
            };
            changed |= upsert(&mut self.data.nav, |e| e.href == href, item);
        } else {
            changed |= remove(&mut self.data.nav, |e| e.href == href);
        }

        let footer = links.and_then(|l| l.footer.as_ref());
        if let Some(footer) = footer {
            let item = FooterEntry {
                href: href.to_string(),
                label: footer.label.clone(),
                column: footer.column.clone(),
            };
            changed |= upsert(&mut self.data.footer, |e| e.href == href, item);
        } else {
            changed |= remove(&mut self.data.footer, |e| e.href == href);
        }

        changed
    }

    /// Persist to disk if the serialized form differs from what was loaded.
    pub fn save(&mut self) -> Result<()> {
        let json = to_json(&self.data);
        if json != self.original {
            std::fs::write(&self.path, &json)
                .with_context(|| format!("writing {}", self.path.display()))?;
            self.original = json;
        }
        Ok(())
    }
}

fn to_json(data: &LinksData) -> String {
    let mut json = serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".into());
    json.push('\n');
    json
}

fn upsert<T: PartialEq>(entries: &mut Vec<T>, matches: impl Fn(&T) -> bool, item: T) -> bool {
    if let Some(idx) = entries.iter().position(matches) {
        if entries[idx] != item {
            entries[idx] = item;
            return true;
        }
        false
    } else {
        entries.push(item);
        true
    }
}

fn remove<T>(entries: &mut Vec<T>, matches: impl Fn(&T) -> bool) -> bool {
    if let Some(idx) = entries.iter().position(matches) {
        entries.remove(idx);
        return true;
    }
    false
}

/// Build the href recorded in `links.json` for a page, relative to `src/`.
pub fn page_href(rel: &str, pretty: bool) -> String {
    let normalized = super::output::replace_page_ext(&rel.replace('\\', "/"));
    if !pretty {
        return format!("/{normalized}");
    }
    let no_ext = strip_suffix_ci(&normalized, "index.html")
        .map(str::to_string)
        .unwrap_or_else(|| {
            strip_suffix_ci(&normalized, ".html")
                .map(str::to_string)
                .unwrap_or(normalized)
        });
    if no_ext.is_empty() {
        return "/".to_string();
    }
    format!("/{}/", no_ext.trim_end_matches('/'))
}

fn strip_suffix_ci<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    if s.len() >= suffix.len() && s[s.len() - suffix.len()..].eq_ignore_ascii_case(suffix) {
        Some(&s[..s.len() - suffix.len()])
    } else {
        None
    }
}
