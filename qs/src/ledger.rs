//! Line-oriented durable file primitive
//!
//! One item id per line. Two write modes: atomic full replace (temp file,
//! fsync, rename) and append-with-flush. A reader after a crash sees either
//! the old or the new contents of a replace, never a truncated mix.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::StoreError;

/// A durable list of item ids, one per line
#[derive(Debug, Clone)]
pub struct LineLedger {
    path: PathBuf,
}

impl LineLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load all ids. A missing file reads as empty, not as an error.
    pub fn load(&self) -> Result<Vec<String>, StoreError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "ledger file missing, reading as empty");
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| StoreError::io(&self.path, e))?;
        let ids = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();

        debug!(path = %self.path.display(), count = ids.len(), "loaded ledger");
        Ok(ids)
    }

    /// Atomically replace the whole file with the given ids.
    ///
    /// Writes to a sibling temp file, fsyncs it, then renames over the target
    /// so the old contents stay visible until the new file is complete.
    pub fn replace(&self, ids: &[String]) -> Result<(), StoreError> {
        let tmp_path = self.tmp_path();

        let mut tmp = File::create(&tmp_path).map_err(|e| StoreError::io(&tmp_path, e))?;
        for id in ids {
            writeln!(tmp, "{}", id).map_err(|e| StoreError::io(&tmp_path, e))?;
        }
        tmp.sync_all().map_err(|e| StoreError::io(&tmp_path, e))?;
        drop(tmp);

        fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::io(&self.path, e))?;

        debug!(path = %self.path.display(), count = ids.len(), "replaced ledger");
        Ok(())
    }

    /// Append one id, flushed and synced before returning.
    pub fn append(&self, id: &str) -> Result<(), StoreError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| StoreError::io(&self.path, e))?;

        writeln!(file, "{}", id).map_err(|e| StoreError::io(&self.path, e))?;
        file.sync_all().map_err(|e| StoreError::io(&self.path, e))?;

        debug!(path = %self.path.display(), %id, "appended to ledger");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn strings(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let temp = TempDir::new().unwrap();
        let ledger = LineLedger::new(temp.path().join("cache"));

        assert!(!ledger.exists());
        assert_eq!(ledger.load().unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_replace_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let ledger = LineLedger::new(temp.path().join("cache"));

        ledger.replace(&strings(&["a", "b", "c"])).unwrap();
        assert_eq!(ledger.load().unwrap(), strings(&["a", "b", "c"]));

        // Replace is wholesale, not a merge
        ledger.replace(&strings(&["x"])).unwrap();
        assert_eq!(ledger.load().unwrap(), strings(&["x"]));
    }

    #[test]
    fn test_replace_leaves_no_temp_debris() {
        let temp = TempDir::new().unwrap();
        let ledger = LineLedger::new(temp.path().join("queue"));

        ledger.replace(&strings(&["a"])).unwrap();

        let entries: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(entries, vec!["queue".to_string()]);
    }

    #[test]
    fn test_append_preserves_prior_lines() {
        let temp = TempDir::new().unwrap();
        let ledger = LineLedger::new(temp.path().join("archive"));

        ledger.append("a").unwrap();
        ledger.append("b").unwrap();
        assert_eq!(ledger.load().unwrap(), strings(&["a", "b"]));
    }

    #[test]
    fn test_load_skips_blank_lines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("archive");
        std::fs::write(&path, "a\n\n  \nb\n").unwrap();

        let ledger = LineLedger::new(&path);
        assert_eq!(ledger.load().unwrap(), strings(&["a", "b"]));
    }
}
