//! Output path mapping and page writes.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::config::SiteConfig;

/// Replace a page extension (`.md`, `.htm`, `.html`, case-insensitive)
/// with `.html`. Other paths pass through unchanged.
pub fn replace_page_ext(rel: &str) -> String {
    for ext in [".html", ".htm", ".md"] {
        if rel.len() >= ext.len() && rel[rel.len() - ext.len()..].eq_ignore_ascii_case(ext) {
            return format!("{}.html", &rel[..rel.len() - ext.len()]);
        }
    }
    rel.to_string()
}

/// Page source path relative to `src/`, slash-normalized.
pub fn page_rel(page: &Path, config: &SiteConfig) -> Result<String> {
    let Ok(rel) = page.strip_prefix(config.src_dir()) else {
        bail!("page outside source tree: {}", page.display());
    };
    Ok(rel.to_string_lossy().replace('\\', "/"))
}

/// Output file for a page source path.
pub fn page_output_path(page: &Path, config: &SiteConfig) -> Result<PathBuf> {
    let rel = page_rel(page, config)?;
    Ok(config.output_dir().join(replace_page_ext(&rel)))
}

/// Write the rendered document, creating parent directories.
pub fn write_page(html: &str, page: &Path, config: &SiteConfig) -> Result<PathBuf> {
    let out_path = page_output_path(page, config)?;
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&out_path, html).with_context(|| format!("writing {}", out_path.display()))?;
    Ok(out_path)
}

/// Remove the rendered output for a page source path. Missing output is
/// not an error (the page may never have rendered successfully).
pub fn remove_page_output(page: &Path, config: &SiteConfig) -> Result<()> {
    let out_path = page_output_path(page, config)?;
    match std::fs::remove_file(&out_path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("removing {}", out_path.display())),
    }
}
