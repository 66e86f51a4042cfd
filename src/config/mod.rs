//! Site configuration loaded from `sable.toml`.
//!
//! Every field has a default so an empty (or missing) config file yields a
//! working site. Unknown keys are reported as warnings rather than errors,
//! so configs survive minor version drift.

pub mod whitelist;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::utils::normalize_path;

/// Config file name expected at the site root.
pub const CONFIG_FILE: &str = "sable.toml";

/// Directory holding the persisted trackers, relative to the site root.
const STATE_DIR: &str = ".sable";

/// Errors specific to configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("site root does not exist: {}", .0.display())]
    MissingRoot(PathBuf),
    #[error("{}: {}", path.display(), source)]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// `[build]` section of `sable.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BuildSection {
    /// Output directory, relative to the site root.
    pub output: PathBuf,
    /// Drop `.html` from generated navigation hrefs.
    pub pretty_urls: bool,
    /// Fingerprint stylesheet/module filenames with a content hash.
    pub hash_assets: bool,
    /// Worker pool size; 0 means host parallelism.
    pub workers: usize,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            output: PathBuf::from("dist"),
            pretty_urls: false,
            hash_assets: false,
            workers: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    build: BuildSection,
}

/// Resolved site configuration.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    root: PathBuf,
    pub build: BuildSection,
}

impl SiteConfig {
    /// Load configuration for the site rooted at `root`.
    ///
    /// A missing `sable.toml` yields the defaults; a missing root is fatal.
    pub fn load(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(ConfigError::MissingRoot(root.to_path_buf()).into());
        }
        let root = normalize_path(root);
        let config_path = root.join(CONFIG_FILE);

        let raw = if config_path.is_file() {
            let text = std::fs::read_to_string(&config_path)
                .with_context(|| format!("reading {}", config_path.display()))?;
            parse_with_warnings(&text, &config_path)?
        } else {
            RawConfig::default()
        };

        Ok(Self {
            root,
            build: raw.build,
        })
    }

    /// Construct a default config rooted at `root` (test fixtures).
    pub fn with_root(root: &Path) -> Self {
        Self {
            root: normalize_path(root),
            build: BuildSection::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Page and source-asset tree.
    pub fn src_dir(&self) -> PathBuf {
        self.root.join("src")
    }

    /// Project template override tree.
    pub fn templates_dir(&self) -> PathBuf {
        self.root.join("templates")
    }

    /// Inlineable vector graphics tree.
    pub fn svg_dir(&self) -> PathBuf {
        self.root.join("src-svg")
    }

    /// Media asset tree.
    pub fn media_dir(&self) -> PathBuf {
        self.root.join("media")
    }

    /// Engine-managed navigation/footer link metadata.
    pub fn links_file(&self) -> PathBuf {
        self.root.join("links.json")
    }

    /// Directory holding the sqlite trackers.
    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    /// Absolute output directory.
    pub fn output_dir(&self) -> PathBuf {
        if self.build.output.is_absolute() {
            self.build.output.clone()
        } else {
            self.root.join(&self.build.output)
        }
    }

    /// Effective worker pool size: configured value, or host parallelism
    /// with a floor of two.
    pub fn worker_count(&self) -> usize {
        if self.build.workers > 0 {
            return self.build.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2)
            .max(2)
    }
}

/// Parse the config, warning on unrecognized keys.
fn parse_with_warnings(text: &str, path: &Path) -> Result<RawConfig> {
    let de = toml::de::Deserializer::new(text);
    let mut unknown = Vec::new();
    let raw: RawConfig = serde_ignored::deserialize(de, |key| unknown.push(key.to_string()))
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    for key in unknown {
        crate::log!("config"; "unknown key \"{}\" in {}", key, path.display());
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_config_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let config = SiteConfig::load(temp.path()).unwrap();
        assert_eq!(config.build.output, PathBuf::from("dist"));
        assert!(!config.build.pretty_urls);
        assert!(!config.build.hash_assets);
        assert!(config.worker_count() >= 2);
    }

    #[test]
    fn missing_root_is_fatal() {
        let temp = TempDir::new().unwrap();
        let gone = temp.path().join("nope");
        assert!(SiteConfig::load(&gone).is_err());
    }

    #[test]
    fn parses_build_section() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(CONFIG_FILE),
            "[build]\noutput = \"public\"\npretty_urls = true\nhash_assets = true\nworkers = 3\n",
        )
        .unwrap();

        let config = SiteConfig::load(temp.path()).unwrap();
        assert_eq!(config.build.output, PathBuf::from("public"));
        assert!(config.build.pretty_urls);
        assert!(config.build.hash_assets);
        assert_eq!(config.worker_count(), 3);
        assert!(config.output_dir().ends_with("public"));
    }

    #[test]
    fn invalid_toml_reports_path() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(CONFIG_FILE), "[build\n").unwrap();
        let err = SiteConfig::load(temp.path()).unwrap_err();
        assert!(format!("{err:#}").contains(CONFIG_FILE));
    }
}
