//! Persisted trackers backed by sqlite.
//!
//! Two logical tables in one store under `.sable/state.db`:
//! - `source_files(path, mtime)`: startup reconciliation ([`SourceFileTracker`])
//! - `output_files(source, output)`: written artifacts ([`outputs::OutputTracker`])
//!
//! The store allows concurrent readers and waits out writer locks (WAL +
//! busy timeout), but in practice only the single-threaded orchestrator
//! touches it; workers never do.

pub mod outputs;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use rustc_hash::{FxHashMap, FxHashSet};

/// Database file name under the state directory.
pub const DB_FILE: &str = "state.db";

/// Three-way diff between the persisted records and the live filesystem.
#[derive(Debug, Default)]
pub struct SourceDiff {
    pub added: Vec<(PathBuf, i64)>,
    pub modified: Vec<(PathBuf, i64)>,
    pub removed: Vec<PathBuf>,
}

impl SourceDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

/// Tracker of every known source file's last-seen modification time.
///
/// `diff` never mutates the store: the caller commits each path with
/// [`record`](Self::record) / [`forget`](Self::forget) only after acting on
/// it, so a crash mid-dispatch does not mark a file as already handled.
pub struct SourceFileTracker {
    conn: Connection,
}

impl SourceFileTracker {
    /// Open (creating if needed) the tracker under `state_dir`.
    pub fn open(state_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_dir)
            .with_context(|| format!("creating {}", state_dir.display()))?;
        let conn = open_store(&state_dir.join(DB_FILE))?;
        Ok(Self { conn })
    }

    /// In-memory tracker for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Walk `root` and compare every regular file's mtime against the
    /// persisted records. Unchanged files appear in no list. A missing root
    /// is an empty site, not an error.
    pub fn diff(&self, root: &Path) -> Result<SourceDiff> {
        let mut known: FxHashMap<String, i64> = FxHashMap::default();
        let mut stmt = self.conn.prepare("SELECT path, mtime FROM source_files")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (path, mtime) = row?;
            known.insert(path, mtime);
        }

        let mut diff = SourceDiff::default();
        let mut seen: FxHashSet<String> = FxHashSet::default();

        // A site with no src/ yet is valid, empty state.
        if !root.exists() {
            return Ok(diff);
        }

        for entry in jwalk::WalkDir::new(root).skip_hidden(false) {
            let entry = entry.with_context(|| format!("walking {}", root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let metadata =
                std::fs::metadata(&path).with_context(|| format!("stat {}", path.display()))?;
            let mtime = mtime_millis(&metadata);
            let key = path.to_string_lossy().to_string();
            seen.insert(key.clone());

            match known.get(&key) {
                None => {
                    crate::debug!("track"; "new file -- {}", path.display());
                    diff.added.push((path, mtime));
                }
                Some(prev) if *prev != mtime => {
                    crate::debug!("track"; "changed -- {}", path.display());
                    diff.modified.push((path, mtime));
                }
                Some(_) => {}
            }
        }

        // Records under this root with no matching file on disk.
        let root_prefix = root.to_string_lossy().to_string();
        for path in known.keys() {
            if path.starts_with(&root_prefix) && !seen.contains(path) {
                crate::debug!("track"; "missing tracked file -- {}", path);
                diff.removed.push(PathBuf::from(path));
            }
        }
        diff.added.sort();
        diff.modified.sort();
        diff.removed.sort();

        Ok(diff)
    }

    /// Record or update a file's modification time.
    pub fn record(&self, path: &Path, mtime: i64) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO source_files (path, mtime) VALUES (?1, ?2)",
            params![path.to_string_lossy(), mtime],
        )?;
        Ok(())
    }

    /// Remove a file's record.
    pub fn forget(&self, path: &Path) -> Result<()> {
        self.conn.execute(
            "DELETE FROM source_files WHERE path = ?1",
            params![path.to_string_lossy()],
        )?;
        Ok(())
    }

    /// Drop all records (test isolation).
    pub fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM source_files", [])?;
        Ok(())
    }
}

/// Current mtime of a metadata record, in milliseconds since the epoch.
pub fn mtime_millis(metadata: &std::fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Open the shared store with the pragmas both trackers rely on.
pub(crate) fn open_store(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("opening {}", db_path.display()))?;
    // Allow concurrent readers and wait when the database is locked.
    conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
    conn.busy_timeout(Duration::from_secs(5))?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS source_files (
            path TEXT PRIMARY KEY,
            mtime INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS output_files (
            source TEXT NOT NULL,
            output TEXT NOT NULL,
            PRIMARY KEY (source, output)
        );",
    )?;
    Ok(())
}
