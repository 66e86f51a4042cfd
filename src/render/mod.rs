//! Page render pipeline: parse, transform, template-apply, write.
//!
//! The watch orchestrator treats this module as a black box: it hands a
//! source path to a worker and receives a [`RenderResult`] describing the
//! exact dependencies the render touched. The result wholesale-replaces the
//! page's record in the dependency graph, so anything not reported here is
//! forgotten.

pub mod assets;
pub mod links;
pub mod markdown;
pub mod output;
pub mod page;
pub mod svg;
pub mod template;

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::config::SiteConfig;
use crate::utils::normalize_path;

use links::LinksManager;

pub use assets::{copy_asset, remove_asset};

/// Filename prefix treating a page as a deletion of its unprefixed sibling.
pub const DISABLED_PREFIX: &str = "disabled.";

/// Dependencies and outcomes of one page render.
#[derive(Debug, Clone, Default)]
pub struct RenderResult {
    pub page_path: PathBuf,
    pub templates_used: Vec<PathBuf>,
    pub svgs_used: Vec<PathBuf>,
    pub scripts_used: Vec<PathBuf>,
    pub css_used: Vec<PathBuf>,
    pub modules_used: Vec<PathBuf>,
    /// Page declares `[links]` front matter.
    pub links_used: bool,
    /// This render modified `links.json`.
    pub links_changed: bool,
    /// Output files written by this render.
    pub outputs: Vec<PathBuf>,
}

/// Render a single HTML or Markdown source file to its output destination.
pub fn render_page(path: &Path, config: &SiteConfig) -> Result<RenderResult> {
    let path = normalize_path(path);

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if file_name.to_lowercase().starts_with(DISABLED_PREFIX) {
        return disabled_page(&path, &file_name, config);
    }

    let mut page = page::parse_page(&path)?;
    if path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("md"))
    {
        page.body = markdown::to_html(&page.body);
    }

    let css = assets::process_css(&page.front_matter.css, config)?;
    let modules = assets::process_modules(&page.front_matter.scripts.modules, config)?;

    let rel = output::page_rel(&path, config)?;
    let href = links::page_href(&rel, config.build.pretty_urls);
    let mut manager = LinksManager::load(config.links_file())?;
    let links_used = page.front_matter.links.is_some();
    let links_changed = manager.merge(&href, page.front_matter.links.as_ref());
    if links_changed {
        manager.save()?;
    }

    let assembled = template::assemble(&page, manager.data(), &css.resolved, &modules.resolved, config)?;
    let out_path = output::write_page(&assembled.html, &path, config)?;

    let mut outputs = css.outputs;
    outputs.extend(modules.outputs);
    outputs.push(out_path);

    Ok(RenderResult {
        page_path: path,
        templates_used: assembled.templates_used,
        svgs_used: assembled.svgs_used,
        scripts_used: assembled.scripts_used,
        css_used: css.used,
        modules_used: modules.used,
        links_used,
        links_changed,
        outputs,
    })
}

/// A `disabled.`-prefixed page acts as a deletion of the unprefixed page:
/// the original's output is removed and its link entries pruned.
fn disabled_page(path: &Path, file_name: &str, config: &SiteConfig) -> Result<RenderResult> {
    let original_name = &file_name[DISABLED_PREFIX.len()..];
    let original = path
        .parent()
        .map(|dir| dir.join(original_name))
        .unwrap_or_else(|| PathBuf::from(original_name));
    crate::log!("render"; "disabled page -- {}", path.display());

    let rel = output::page_rel(&original, config)?;
    let href = links::page_href(&rel, config.build.pretty_urls);
    let mut manager = LinksManager::load(config.links_file())?;
    let links_changed = manager.merge(&href, None);
    if links_changed {
        manager.save()?;
    }

    remove_page(&original, config)?;

    Ok(RenderResult {
        page_path: original,
        links_changed,
        ..RenderResult::default()
    })
}

/// Remove the rendered output associated with a source file.
pub fn remove_page(path: &Path, config: &SiteConfig) -> Result<()> {
    output::remove_page_output(&normalize_path(path), config)
}
