//! Tracker of output files written per source file.
//!
//! The orchestrator records every output a job reports, and on removal of a
//! source file deletes whatever the table still attributes to it. This is
//! what catches fingerprinted variants that a plain mirror-path removal
//! would miss.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::{Connection, params};

use super::DB_FILE;

/// Sqlite-backed `output_files(source, output)` table.
pub struct OutputTracker {
    conn: Connection,
}

impl OutputTracker {
    /// Open (creating if needed) the tracker under `state_dir`.
    pub fn open(state_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_dir)
            .with_context(|| format!("creating {}", state_dir.display()))?;
        let conn = super::open_store(&state_dir.join(DB_FILE))?;
        Ok(Self { conn })
    }

    /// In-memory tracker for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS output_files (
                source TEXT NOT NULL,
                output TEXT NOT NULL,
                PRIMARY KEY (source, output)
            );",
        )?;
        Ok(Self { conn })
    }

    /// Replace the recorded outputs for a source file.
    ///
    /// Returns previously recorded outputs that are no longer produced, so
    /// the caller can delete them from disk.
    pub fn replace(&self, source: &Path, outputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let current = self.outputs_for(source)?;
        let stale: Vec<PathBuf> = current
            .into_iter()
            .filter(|old| !outputs.contains(old))
            .collect();

        self.conn.execute(
            "DELETE FROM output_files WHERE source = ?1",
            params![source.to_string_lossy()],
        )?;
        for output in outputs {
            self.conn.execute(
                "INSERT OR REPLACE INTO output_files (source, output) VALUES (?1, ?2)",
                params![source.to_string_lossy(), output.to_string_lossy()],
            )?;
        }
        Ok(stale)
    }

    /// All outputs currently attributed to a source file.
    pub fn outputs_for(&self, source: &Path) -> Result<Vec<PathBuf>> {
        let mut stmt = self
            .conn
            .prepare("SELECT output FROM output_files WHERE source = ?1 ORDER BY output")?;
        let rows = stmt.query_map(params![source.to_string_lossy()], |row| {
            row.get::<_, String>(0)
        })?;
        let mut outputs = Vec::new();
        for row in rows {
            outputs.push(PathBuf::from(row?));
        }
        Ok(outputs)
    }

    /// Drop a source's rows, returning what was recorded.
    pub fn remove_source(&self, source: &Path) -> Result<Vec<PathBuf>> {
        let outputs = self.outputs_for(source)?;
        self.conn.execute(
            "DELETE FROM output_files WHERE source = ?1",
            params![source.to_string_lossy()],
        )?;
        Ok(outputs)
    }

    /// Drop all rows (test isolation).
    pub fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM output_files", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    #[test]
    fn replace_reports_stale_outputs() {
        let tracker = OutputTracker::open_in_memory().unwrap();
        let source = p("/site/src/styles.css");

        let stale = tracker
            .replace(&source, &[p("/site/dist/styles.aaaa1111.css")])
            .unwrap();
        assert!(stale.is_empty());

        let stale = tracker
            .replace(&source, &[p("/site/dist/styles.bbbb2222.css")])
            .unwrap();
        assert_eq!(stale, vec![p("/site/dist/styles.aaaa1111.css")]);

        // Unchanged outputs are not stale.
        let stale = tracker
            .replace(&source, &[p("/site/dist/styles.bbbb2222.css")])
            .unwrap();
        assert!(stale.is_empty());
    }

    #[test]
    fn remove_source_returns_and_drops() {
        let tracker = OutputTracker::open_in_memory().unwrap();
        let source = p("/site/src/index.html");
        tracker
            .replace(&source, &[p("/site/dist/index.html")])
            .unwrap();

        let outputs = tracker.remove_source(&source).unwrap();
        assert_eq!(outputs, vec![p("/site/dist/index.html")]);
        assert!(tracker.outputs_for(&source).unwrap().is_empty());
        assert!(tracker.remove_source(&source).unwrap().is_empty());
    }
}
