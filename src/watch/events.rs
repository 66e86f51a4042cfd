//! Filesystem event types and the batch reducer.
//!
//! Raw notify events are adapted into crate-level [`FsEvent`]s (dropping
//! metadata-only modifies and editor temp files), buffered in arrival
//! order, and folded into one effective kind per path when a debounce
//! window closes.

use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;

/// What happened to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Create,
    Modify,
    Remove,
}

impl EventKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Remove => "remove",
        }
    }
}

/// One raw filesystem notification; a single event may affect many paths.
#[derive(Debug, Clone)]
pub struct FsEvent {
    pub kind: EventKind,
    pub paths: Vec<PathBuf>,
}

/// Adapt a notify event, filtering noise.
///
/// Metadata-only modifies (mtime/atime/chmod) are dropped, since they
/// would trigger endless rebuild loops. Editor temp/backup files are
/// dropped per path.
pub fn from_notify(event: &notify::Event) -> Option<FsEvent> {
    use notify::EventKind as NK;

    let kind = match event.kind {
        NK::Create(_) => EventKind::Create,
        NK::Remove(_) => EventKind::Remove,
        NK::Modify(modify) => {
            if matches!(modify, notify::event::ModifyKind::Metadata(_)) {
                return None;
            }
            EventKind::Modify
        }
        _ => return None,
    };

    let paths: Vec<PathBuf> = event
        .paths
        .iter()
        .filter(|p| !is_temp_file(p))
        .cloned()
        .collect();
    if paths.is_empty() {
        return None;
    }

    Some(FsEvent { kind, paths })
}

/// Collapse a batch of events into one effective kind per path.
///
/// Transition table, applied in arrival order:
/// - no prior entry → record the kind
/// - prior equals new → unchanged (idempotent)
/// - prior `create`, new `modify` → keep `create` (a file that did not
///   exist before the batch is still new even if touched twice)
/// - anything else (`modify→remove`, `remove→create`, ...) → latest wins
pub fn reduce_events(events: &[FsEvent]) -> FxHashMap<PathBuf, EventKind> {
    let mut result = FxHashMap::default();

    for event in events {
        for path in &event.paths {
            match result.get(path).copied() {
                None => {
                    result.insert(path.clone(), event.kind);
                }
                Some(prev) if prev == event.kind => {}
                Some(EventKind::Create) if event.kind == EventKind::Modify => {}
                Some(_) => {
                    result.insert(path.clone(), event.kind);
                }
            }
        }
    }

    result
}

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}
