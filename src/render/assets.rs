//! Stylesheet, module-script and generic asset handling.
//!
//! References in front matter are site-relative to `src/`. With
//! `hash_assets` enabled, stylesheet and module filenames are fingerprinted
//! with a content hash (`name.<hash8>.ext`), the hashed copy is written to
//! the output tree, and stale fingerprints of the same asset are deleted.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::config::SiteConfig;
use crate::config::whitelist::{self, INLINE_SCRIPT_SUFFIX};
use crate::utils::normalize_path;

/// Outcome of resolving one group of asset references.
#[derive(Debug, Default)]
pub struct AssetOutcome {
    /// Canonicalized dependency paths, for the dependency graph.
    pub used: Vec<PathBuf>,
    /// Hrefs to embed in the rendered page (fingerprinted when hashing).
    pub resolved: Vec<String>,
    /// Output files written while resolving (hashed copies).
    pub outputs: Vec<PathBuf>,
}

/// Short content fingerprint (first 8 hex chars of blake3).
pub fn hash8(content: &[u8]) -> String {
    let hash = blake3::hash(content);
    hex::encode(&hash.as_bytes()[..4])
}

/// Fingerprinted filename: `styles.css` -> `styles.<hash8>.css`.
pub fn hashed_file_name(file_name: &str, content: &[u8]) -> String {
    let hash = hash8(content);
    match file_name.rfind('.') {
        Some(idx) => format!("{}.{hash}{}", &file_name[..idx], &file_name[idx..]),
        None => format!("{file_name}.{hash}"),
    }
}

/// Process `css = [...]` references from front matter.
///
/// Missing project files fall back to the embedded core stylesheet when one
/// exists for that href; the dependency is still recorded against the
/// project path so creating the file later re-renders the page.
pub fn process_css(hrefs: &[String], config: &SiteConfig) -> Result<AssetOutcome> {
    let mut outcome = AssetOutcome::default();

    for href in hrefs {
        let rel = href.strip_prefix('/').unwrap_or(href);
        let abs = config.src_dir().join(rel);

        if abs.is_file() {
            outcome.used.push(normalize_path(&abs));
            outcome
                .resolved
                .push(emit_asset(&abs, rel, href, config, &mut outcome.outputs)?);
            continue;
        }

        // Project file missing: embedded core fallback keeps pages working
        // on fresh sites.
        if let Some(content) = crate::embed::core_css(rel) {
            outcome.used.push(abs.clone());
            outcome.resolved.push(emit_embedded(
                content.as_bytes(),
                rel,
                href,
                config,
                &mut outcome.outputs,
            )?);
            continue;
        }

        crate::log!("error"; "CSS missing -- {}", rel);
        outcome.used.push(abs);
        outcome.resolved.push(href.clone());
    }

    Ok(outcome)
}

/// Process `scripts.modules = [...]` references from front matter.
pub fn process_modules(srcs: &[String], config: &SiteConfig) -> Result<AssetOutcome> {
    let mut outcome = AssetOutcome::default();

    for src in srcs {
        let rel = src.strip_prefix('/').unwrap_or(src);
        let abs = config.src_dir().join(rel);
        outcome.used.push(normalize_path(&abs));

        if abs.is_file() {
            outcome
                .resolved
                .push(emit_asset(&abs, rel, src, config, &mut outcome.outputs)?);
        } else {
            crate::log!("error"; "module missing -- {}", rel);
            outcome.resolved.push(src.clone());
        }
    }

    Ok(outcome)
}

/// Copy `abs` into the output tree for `rel`, fingerprinting when enabled.
/// Returns the href to embed in the page.
fn emit_asset(
    abs: &Path,
    rel: &str,
    href: &str,
    config: &SiteConfig,
    outputs: &mut Vec<PathBuf>,
) -> Result<String> {
    if !config.build.hash_assets {
        return Ok(href.to_string());
    }
    let content =
        std::fs::read(abs).with_context(|| format!("reading asset {}", abs.display()))?;
    write_hashed(&content, rel, href, config, outputs)
}

fn emit_embedded(
    content: &[u8],
    rel: &str,
    href: &str,
    config: &SiteConfig,
    outputs: &mut Vec<PathBuf>,
) -> Result<String> {
    if !config.build.hash_assets {
        let out_path = config.output_dir().join(rel);
        write_file(&out_path, content)?;
        outputs.push(out_path);
        return Ok(href.to_string());
    }
    write_hashed(content, rel, href, config, outputs)
}

/// Write the fingerprinted copy, drop stale fingerprints, rewrite the href.
fn write_hashed(
    content: &[u8],
    rel: &str,
    href: &str,
    config: &SiteConfig,
    outputs: &mut Vec<PathBuf>,
) -> Result<String> {
    let file_name = rel.rsplit('/').next().unwrap_or(rel);
    let hashed = hashed_file_name(file_name, content);

    let rel_dir = match rel.rfind('/') {
        Some(idx) => &rel[..idx],
        None => "",
    };
    let out_dir = if rel_dir.is_empty() {
        config.output_dir()
    } else {
        config.output_dir().join(rel_dir)
    };

    let out_path = out_dir.join(&hashed);
    write_file(&out_path, content)?;
    remove_stale_hashed(&out_dir, file_name, &hashed)?;
    outputs.push(out_path);

    let hashed_rel = if rel_dir.is_empty() {
        hashed
    } else {
        format!("{rel_dir}/{hashed}")
    };
    Ok(if href.starts_with('/') {
        format!("/{hashed_rel}")
    } else {
        hashed_rel
    })
}

/// Copy one asset into the output tree (worker job body).
///
/// Stylesheets and non-inline module scripts are fingerprinted when hashing
/// is enabled; everything else mirrors its source-relative path. Returns
/// the output files written.
pub fn copy_asset(path: &Path, config: &SiteConfig) -> Result<Vec<PathBuf>> {
    let path = normalize_path(path);
    let rel = asset_rel(&path, config)?;

    let ext = extension_of(&rel);
    let fingerprint = config.build.hash_assets
        && (whitelist::STYLES.contains(&ext.as_str())
            || (whitelist::SCRIPTS.contains(&ext.as_str()) && !rel.ends_with(INLINE_SCRIPT_SUFFIX)));

    if fingerprint {
        let content =
            std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        let mut outputs = Vec::new();
        write_hashed(&content, &rel, &rel, config, &mut outputs)?;
        return Ok(outputs);
    }

    let out_path = config.output_dir().join(&rel);
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(&path, &out_path)
        .with_context(|| format!("copying {} -> {}", path.display(), out_path.display()))?;
    Ok(vec![out_path])
}

/// Remove the mirrored output for a deleted asset. Fingerprinted variants
/// are cleaned up by the orchestrator from the output tracker.
pub fn remove_asset(path: &Path, config: &SiteConfig) -> Result<()> {
    let rel = asset_rel(&normalize_path(path), config)?;
    let out_path = config.output_dir().join(&rel);
    match std::fs::remove_file(&out_path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("removing {}", out_path.display())),
    }
}

/// Output-relative path for an asset source path.
fn asset_rel(path: &Path, config: &SiteConfig) -> Result<String> {
    let rel = if let Ok(rel) = path.strip_prefix(config.src_dir()) {
        rel.to_path_buf()
    } else if let Ok(rel) = path.strip_prefix(config.media_dir()) {
        Path::new("media").join(rel)
    } else if let Ok(rel) = path.strip_prefix(config.root()) {
        rel.to_path_buf()
    } else {
        bail!("asset outside site root: {}", path.display());
    };
    Ok(rel.to_string_lossy().replace('\\', "/"))
}

fn extension_of(rel: &str) -> String {
    match rel.rfind('.') {
        Some(idx) => rel[idx..].to_ascii_lowercase(),
        None => String::new(),
    }
}

fn write_file(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))
}

/// Delete older fingerprints of the same asset (`stem.<8 hex>.ext`).
fn remove_stale_hashed(dir: &Path, file_name: &str, keep: &str) -> Result<()> {
    let (stem, ext) = match file_name.rfind('.') {
        Some(idx) => (&file_name[..idx], &file_name[idx..]),
        None => (file_name, ""),
    };

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name != keep && is_hashed_variant(name, stem, ext) {
            std::fs::remove_file(entry.path()).ok();
        }
    }
    Ok(())
}

fn is_hashed_variant(name: &str, stem: &str, ext: &str) -> bool {
    let Some(middle) = name
        .strip_prefix(stem)
        .and_then(|rest| rest.strip_prefix('.'))
        .and_then(|rest| rest.strip_suffix(ext))
    else {
        return false;
    };
    middle.len() == 8 && middle.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn site(hash: bool) -> (TempDir, SiteConfig) {
        let temp = TempDir::new().unwrap();
        let mut config = SiteConfig::with_root(temp.path());
        config.build.hash_assets = hash;
        std::fs::create_dir_all(config.src_dir()).unwrap();
        (temp, config)
    }

    #[test]
    fn hashed_name_is_stable_and_content_addressed() {
        let a = hashed_file_name("styles.css", b"body{}");
        let b = hashed_file_name("styles.css", b"body{}");
        let c = hashed_file_name("styles.css", b"main{}");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("styles."));
        assert!(a.ends_with(".css"));
    }

    #[test]
    fn process_css_without_hashing_keeps_href() {
        let (_temp, config) = site(false);
        std::fs::write(config.src_dir().join("styles.css"), "body{}").unwrap();

        let outcome = process_css(&["styles.css".into()], &config).unwrap();
        assert_eq!(outcome.resolved, vec!["styles.css".to_string()]);
        assert_eq!(outcome.used.len(), 1);
        assert!(outcome.outputs.is_empty());
    }

    #[test]
    fn process_css_with_hashing_writes_fingerprinted_copy() {
        let (_temp, config) = site(true);
        std::fs::write(config.src_dir().join("styles.css"), "body{}").unwrap();

        let outcome = process_css(&["styles.css".into()], &config).unwrap();
        let href = &outcome.resolved[0];
        assert!(href.starts_with("styles.") && href.ends_with(".css"));
        assert!(config.output_dir().join(href).is_file());
        assert_eq!(outcome.outputs.len(), 1);
    }

    #[test]
    fn copy_asset_replaces_stale_fingerprint() {
        let (_temp, config) = site(true);
        let css = config.src_dir().join("styles.css");

        std::fs::write(&css, "body{}").unwrap();
        let first = copy_asset(&css, &config).unwrap();
        assert!(first[0].is_file());

        std::fs::write(&css, "main{}").unwrap();
        let second = copy_asset(&css, &config).unwrap();
        assert_ne!(first[0], second[0]);
        assert!(second[0].is_file());
        assert!(!first[0].exists(), "stale fingerprint must be deleted");
    }

    #[test]
    fn copy_asset_mirrors_media_plain() {
        let (_temp, config) = site(true);
        std::fs::create_dir_all(config.media_dir()).unwrap();
        let img = config.media_dir().join("logo.png");
        std::fs::write(&img, b"png").unwrap();

        let outputs = copy_asset(&img, &config).unwrap();
        assert_eq!(outputs, vec![config.output_dir().join("media/logo.png")]);
        assert!(outputs[0].is_file());
    }

    #[test]
    fn core_css_fallback_is_emitted() {
        let (_temp, config) = site(false);

        let outcome = process_css(&["styles.css".into()], &config).unwrap();
        assert_eq!(outcome.resolved, vec!["styles.css".to_string()]);
        // Dependency recorded against the project path.
        assert_eq!(outcome.used[0], config.src_dir().join("styles.css"));
        // Embedded content written to the output tree.
        assert!(config.output_dir().join("styles.css").is_file());
    }

    #[test]
    fn remove_asset_is_idempotent() {
        let (_temp, config) = site(false);
        let css = config.src_dir().join("styles.css");
        std::fs::write(&css, "body{}").unwrap();
        copy_asset(&css, &config).unwrap();

        remove_asset(&css, &config).unwrap();
        assert!(!config.output_dir().join("styles.css").exists());
        remove_asset(&css, &config).unwrap();
    }

    #[test]
    fn inline_scripts_never_fingerprinted() {
        let (_temp, config) = site(true);
        let script = config.src_dir().join("boot.inline.js");
        std::fs::write(&script, "init()").unwrap();

        let outputs = copy_asset(&script, &config).unwrap();
        assert_eq!(outputs, vec![config.output_dir().join("boot.inline.js")]);
    }
}
