//! Event routing: effective (path, kind) pairs become a job plan.
//!
//! Pure with respect to the pool: the orchestrator executes the returned
//! actions. Dependent lookups go through the dependency graph; a changed
//! artifact nothing references logs a warning and is otherwise a no-op.

use std::path::{Path, PathBuf};

use crate::config::whitelist::{INLINE_SCRIPT_SUFFIX, SCRIPTS, STYLES};
use crate::deps::PageDeps;

use super::classifier::{PathCategory, classify};
use super::events::EventKind;

/// One unit of the plan derived from a reduced event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Render(PathBuf),
    Copy(PathBuf),
    RemovePage(PathBuf),
    RemoveAsset(PathBuf),
}

/// Translate one effective event into actions.
pub fn plan(path: &Path, kind: EventKind, deps: &PageDeps) -> Vec<Action> {
    let Some(category) = classify(path) else {
        return Vec::new();
    };

    match (kind, category) {
        (EventKind::Create | EventKind::Modify, PathCategory::Page) => {
            vec![Action::Render(path.to_path_buf())]
        }

        (EventKind::Create | EventKind::Modify, PathCategory::Template) => {
            crate::log!("watch"; "template updated -- {}", path.display());
            render_dependents(deps.pages_using_template(path), "template")
        }

        (EventKind::Create | EventKind::Modify, PathCategory::InlineScript) => {
            crate::log!("watch"; "inline script updated -- {}", path.display());
            render_dependents(deps.pages_using_script(path), "inline script")
        }

        (EventKind::Create | EventKind::Modify, PathCategory::InlineSvg) => {
            crate::log!("watch"; "SVG updated -- {}", path.display());
            render_dependents(deps.pages_using_svg(path), "SVG")
        }

        (EventKind::Create | EventKind::Modify, PathCategory::Asset) => {
            let mut actions = vec![Action::Copy(path.to_path_buf())];
            // Fingerprinted references embedded in prior page output may now
            // be stale, so dependents of stylesheets and module scripts are
            // re-rendered as well.
            let ext = extension_of(path);
            if STYLES.contains(&ext.as_str()) {
                crate::log!("watch"; "CSS updated -- {}", path.display());
                actions.extend(render_dependents(deps.pages_using_css(path), "stylesheet"));
            } else if SCRIPTS.contains(&ext.as_str()) && !is_inline(path) {
                crate::log!("watch"; "module updated -- {}", path.display());
                actions.extend(render_dependents(deps.pages_using_module(path), "module"));
            }
            actions
        }

        (EventKind::Remove, PathCategory::Page) => {
            vec![Action::RemovePage(path.to_path_buf())]
        }

        (EventKind::Remove, PathCategory::Asset) => {
            vec![Action::RemoveAsset(path.to_path_buf())]
        }

        (EventKind::Remove, PathCategory::Template) => {
            // Dependents fall back to the next template resolution.
            crate::log!("watch"; "template removed -- {}", path.display());
            render_dependents(deps.pages_using_template(path), "template")
        }

        _ => Vec::new(),
    }
}

fn render_dependents(pages: Vec<PathBuf>, what: &str) -> Vec<Action> {
    if pages.is_empty() {
        crate::logger::status_warning(&format!("no pages reference this {what}"));
        return Vec::new();
    }
    crate::log!("watch"; "{} page(s) affected", pages.len());
    pages.into_iter().map(Action::Render).collect()
}

fn extension_of(path: &Path) -> String {
    let name = path.to_string_lossy().to_lowercase();
    match name.rfind('.') {
        Some(idx) => name[idx..].to_string(),
        None => String::new(),
    }
}

fn is_inline(path: &Path) -> bool {
    path.to_string_lossy().to_lowercase().ends_with(INLINE_SCRIPT_SUFFIX)
}
