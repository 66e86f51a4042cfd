//! Template resolution and document assembly.
//!
//! A template is a pure function from a context to an HTML fragment,
//! expressed as a `.tmpl` file with `{{ key }}` placeholders. Resolution
//! tries the project's `templates/<slot>/<name>.tmpl` first and falls back
//! to the embedded core template of the same slot/name; both spellings are
//! recorded as the page's dependency.

use std::path::PathBuf;
use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use regex::{Captures, Regex};

use crate::config::SiteConfig;
use crate::config::whitelist::TEMPLATE_EXTENSION;
use crate::embed;
use crate::utils::normalize_path;

use super::links::LinksData;
use super::page::Page;
use super::svg;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder"));

/// Flat substitution context for template rendering.
#[derive(Debug, Default)]
pub struct TemplateContext {
    vars: Vec<(String, String)>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.vars.push((key.to_string(), value.into()));
    }

    /// Render `source`, substituting `{{ key }}` placeholders. Unknown keys
    /// collapse to the empty string.
    pub fn apply(&self, source: &str) -> String {
        PLACEHOLDER
            .replace_all(source, |caps: &Captures| {
                let key = &caps[1];
                self.vars
                    .iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| v.clone())
                    .unwrap_or_default()
            })
            .into_owned()
    }
}

/// Resolve a template by slot and name, recording the resolved path.
pub fn resolve_template(
    slot: &str,
    name: &str,
    config: &SiteConfig,
    used: &mut Vec<PathBuf>,
) -> Result<String> {
    let project = config
        .templates_dir()
        .join(slot)
        .join(format!("{name}{TEMPLATE_EXTENSION}"));
    if project.is_file() {
        let source = std::fs::read_to_string(&project)
            .with_context(|| format!("reading template {}", project.display()))?;
        used.push(normalize_path(&project));
        return Ok(source);
    }

    if let Some(source) = embed::core_template(slot, name) {
        used.push(PathBuf::from(format!(
            "{}/{slot}/{name}{TEMPLATE_EXTENSION}",
            embed::CORE_TEMPLATE_PREFIX
        )));
        return Ok(source.to_string());
    }

    bail!("template {slot}/{name}{TEMPLATE_EXTENSION} not found in project or core templates");
}

/// Everything document assembly produces besides the HTML itself.
#[derive(Debug)]
pub struct Assembled {
    pub html: String,
    pub templates_used: Vec<PathBuf>,
    pub scripts_used: Vec<PathBuf>,
    pub svgs_used: Vec<PathBuf>,
}

/// Assemble the final HTML document for a page.
///
/// `css_hrefs` / `module_srcs` are the (possibly fingerprinted) references
/// produced by asset processing.
pub fn assemble(
    page: &Page,
    links: &LinksData,
    css_hrefs: &[String],
    module_srcs: &[String],
    config: &SiteConfig,
) -> Result<Assembled> {
    let fm = &page.front_matter;
    let mut templates_used = Vec::new();

    let mut ctx = TemplateContext::new();
    ctx.insert("title", fm.title.clone().unwrap_or_default());
    ctx.insert("description", fm.description.clone().unwrap_or_default());
    ctx.insert("css_links", render_css_links(css_hrefs));
    ctx.insert("nav_links", render_nav_links(links));
    ctx.insert("footer_links", render_footer_links(links));

    // templates.head is validated as required at parse time.
    let head_name = fm.templates.head.as_deref().unwrap_or("default");
    let head = ctx.apply(&resolve_template("head", head_name, config, &mut templates_used)?);

    let nav = match fm.templates.nav.as_deref() {
        Some(name) => ctx.apply(&resolve_template("nav", name, config, &mut templates_used)?),
        None => String::new(),
    };
    let footer = match fm.templates.footer.as_deref() {
        Some(name) => ctx.apply(&resolve_template(
            "footer",
            name,
            config,
            &mut templates_used,
        )?),
        None => String::new(),
    };

    let mut scripts_used = Vec::new();
    let inline_scripts = inline_script_tags(page, config, &mut scripts_used)?;
    let module_scripts = module_srcs
        .iter()
        .map(|src| format!("<script type=\"module\" src=\"{src}\"></script>"))
        .collect::<Vec<_>>()
        .join("\n");

    let html = format!(
        "<!DOCTYPE html>\n<html>\n<head>\n{head}\n</head>\n<body>\n{nav}\n<main>\n{body}\n</main>\n{footer}\n{module_scripts}\n{inline_scripts}\n</body>\n</html>\n",
        body = page.body.trim(),
    );

    let mut svgs_used = Vec::new();
    let html = svg::inline_svgs(&html, config, &mut svgs_used);

    Ok(Assembled {
        html,
        templates_used,
        scripts_used,
        svgs_used,
    })
}

/// Read inline scripts and wrap them in `<script>` tags, tracking the
/// resolved file paths.
fn inline_script_tags(
    page: &Page,
    config: &SiteConfig,
    scripts_used: &mut Vec<PathBuf>,
) -> Result<String> {
    let mut tags = Vec::new();
    for file in &page.front_matter.scripts.inline {
        let rel = file.strip_prefix('/').unwrap_or(file);
        let path = config.src_dir().join(rel);
        let real = normalize_path(&path);
        let content = std::fs::read_to_string(&real)
            .map_err(|e| anyhow::anyhow!("{}: {}", real.display(), e))?;
        scripts_used.push(real);
        tags.push(format!("<script>\n{content}\n</script>"));
    }
    Ok(tags.join("\n"))
}

fn render_css_links(hrefs: &[String]) -> String {
    hrefs
        .iter()
        .map(|href| format!("<link rel=\"stylesheet\" href=\"{href}\">"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_nav_links(links: &LinksData) -> String {
    links
        .nav
        .iter()
        .map(|entry| {
            format!(
                "    <li><a href=\"{}\">{}</a></li>",
                entry.href,
                escape_html(&entry.label)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_footer_links(links: &LinksData) -> String {
    links
        .footer
        .iter()
        .map(|entry| {
            format!(
                "    <li><a href=\"{}\">{}</a></li>",
                entry.href,
                escape_html(&entry.label)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
