//! Page dependency graph for incremental rebuilds.
//!
//! Maintains both forward (page → dependencies) and reverse (dependency →
//! pages) mappings so "which pages use artifact X" is a direct lookup.
//!
//! # Invariants
//! - Forward and reverse mappings are always consistent
//! - A record exists iff the page rendered successfully since the last clear
//! - Recording wholesale-replaces the page's previous record, so removed
//!   references are forgotten rather than accumulating
//! - Template identity is the canonical `slot/name` form; file paths are
//!   normalized so equivalent spellings never miss dependents
//!
//! The graph is owned by the watch orchestrator and mutated only after a
//! worker reports a render result; workers never see it.

use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::utils::normalize_path;

type PathSet = FxHashSet<PathBuf>;

/// Dependencies recorded for one page.
#[derive(Debug, Default, Clone)]
struct PageRecord {
    templates: FxHashSet<String>,
    svgs: PathSet,
    scripts: PathSet,
    css: PathSet,
    modules: PathSet,
    links: bool,
}

/// The artifact kinds a reverse lookup can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DepKind {
    Svg,
    Script,
    Css,
    Module,
}

/// Per-page dependency graph with reverse indices.
#[derive(Debug, Default)]
pub struct PageDeps {
    /// Forward: page source path → its last successful render's dependencies
    pages: FxHashMap<PathBuf, PageRecord>,
    /// Reverse: canonical template id → pages using it
    templates: FxHashMap<String, PathSet>,
    svgs: FxHashMap<PathBuf, PathSet>,
    scripts: FxHashMap<PathBuf, PathSet>,
    css: FxHashMap<PathBuf, PathSet>,
    modules: FxHashMap<PathBuf, PathSet>,
}

impl PageDeps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the full dependency record for a page.
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &mut self,
        page: &Path,
        templates: &[PathBuf],
        svgs: &[PathBuf],
        scripts: &[PathBuf],
        css: &[PathBuf],
        modules: &[PathBuf],
        links: bool,
    ) {
        let page = normalize_path(page);

        // Drop old mappings first (keeps forward/reverse consistent).
        self.forget(&page);

        let record = PageRecord {
            templates: templates.iter().map(|p| template_id(p)).collect(),
            svgs: svgs.iter().map(|p| normalize_path(p)).collect(),
            scripts: scripts.iter().map(|p| normalize_path(p)).collect(),
            css: css.iter().map(|p| normalize_path(p)).collect(),
            modules: modules.iter().map(|p| normalize_path(p)).collect(),
            links,
        };

        for id in &record.templates {
            self.templates.entry(id.clone()).or_default().insert(page.clone());
        }
        for (index, dep_paths) in [
            (DepKind::Svg, &record.svgs),
            (DepKind::Script, &record.scripts),
            (DepKind::Css, &record.css),
            (DepKind::Module, &record.modules),
        ] {
            let reverse = self.reverse_mut(index);
            for dep in dep_paths {
                reverse.entry(dep.clone()).or_default().insert(page.clone());
            }
        }

        self.pages.insert(page, record);
    }

    /// Drop a page's record and its reverse entries.
    pub fn forget(&mut self, page: &Path) {
        let page = normalize_path(page);
        let Some(old) = self.pages.remove(&page) else {
            return;
        };

        for id in &old.templates {
            detach(&mut self.templates, id, &page);
        }
        for (kind, dep_paths) in [
            (DepKind::Svg, &old.svgs),
            (DepKind::Script, &old.scripts),
            (DepKind::Css, &old.css),
            (DepKind::Module, &old.modules),
        ] {
            let reverse = self.reverse_mut(kind);
            for dep in dep_paths {
                detach(reverse, dep, &page);
            }
        }
    }

    /// Pages whose last render used the given template, matched on the
    /// canonical `slot/name` identity (override and fallback collapse).
    pub fn pages_using_template(&self, template_path: &Path) -> Vec<PathBuf> {
        sorted(self.templates.get(&template_id(template_path)))
    }

    pub fn pages_using_svg(&self, path: &Path) -> Vec<PathBuf> {
        sorted(self.svgs.get(&normalize_path(path)))
    }

    pub fn pages_using_script(&self, path: &Path) -> Vec<PathBuf> {
        sorted(self.scripts.get(&normalize_path(path)))
    }

    pub fn pages_using_css(&self, path: &Path) -> Vec<PathBuf> {
        sorted(self.css.get(&normalize_path(path)))
    }

    pub fn pages_using_module(&self, path: &Path) -> Vec<PathBuf> {
        sorted(self.modules.get(&normalize_path(path)))
    }

    /// Every page whose last render declared link metadata.
    pub fn pages_with_links(&self) -> Vec<PathBuf> {
        let mut pages: Vec<_> = self
            .pages
            .iter()
            .filter(|(_, record)| record.links)
            .map(|(page, _)| page.clone())
            .collect();
        pages.sort();
        pages
    }

    /// Drop all records (process start / test isolation).
    pub fn clear(&mut self) {
        self.pages.clear();
        self.templates.clear();
        self.svgs.clear();
        self.scripts.clear();
        self.css.clear();
        self.modules.clear();
    }

    fn reverse_mut(&mut self, kind: DepKind) -> &mut FxHashMap<PathBuf, PathSet> {
        match kind {
            DepKind::Svg => &mut self.svgs,
            DepKind::Script => &mut self.scripts,
            DepKind::Css => &mut self.css,
            DepKind::Module => &mut self.modules,
        }
    }
}

fn detach<K: std::hash::Hash + Eq>(reverse: &mut FxHashMap<K, PathSet>, key: &K, page: &Path) {
    if let Some(pages) = reverse.get_mut(key) {
        pages.remove(page);
        if pages.is_empty() {
            reverse.remove(key);
        }
    }
}

fn sorted(set: Option<&PathSet>) -> Vec<PathBuf> {
    let mut pages: Vec<_> = set.map(|s| s.iter().cloned().collect()).unwrap_or_default();
    pages.sort();
    pages
}

/// Canonical template identity: the `slot/name` path after the last
/// `templates` segment, extension stripped. A project override and the
/// embedded core fallback of the same slot/name share one identity.
pub fn template_id(path: &Path) -> String {
    let components: Vec<String> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();

    let tail: Vec<String> = match components.iter().rposition(|c| c == "templates") {
        Some(idx) => components[idx + 1..].to_vec(),
        None => components,
    };

    let mut id = tail.join("/");
    if let Some(dot) = id.rfind('.')
        && dot > id.rfind('/').map_or(0, |s| s + 1)
    {
        id.truncate(dot);
    }
    id
}
