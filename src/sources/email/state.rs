//! Persisted seen-UID state for incremental mailbox crawls.
//!
//! The state file is a JSON array of decimal UID strings. A missing or unreadable file
//! simply starts the crawl from scratch.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Load/save wrapper around the seen-UID JSON file.
pub(crate) struct SeenUidStore {
    path: PathBuf,
}

impl SeenUidStore {
    pub(crate) fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Read the persisted UID set; `reset` or any read failure yields an empty set.
    pub(crate) async fn load(&self, reset: bool) -> HashSet<String> {
        if reset {
            return HashSet::new();
        }
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => serde_json::from_str::<Vec<String>>(&raw)
                .map(|uids| uids.into_iter().collect())
                .unwrap_or_else(|err| {
                    tracing::warn!(path = %self.path.display(), error = %err, "Unreadable seen-UID state; starting empty");
                    HashSet::new()
                }),
            Err(_) => HashSet::new(),
        }
    }

    /// Persist the UID set, sorted numerically for stable files.
    pub(crate) async fn save(&self, uids: &HashSet<String>) -> std::io::Result<()> {
        let mut sorted: Vec<&String> = uids.iter().collect();
        sorted.sort_by_key(|uid| uid.parse::<u64>().unwrap_or(u64::MAX));
        let body = serde_json::to_string(&sorted)?;
        tokio::fs::write(&self.path, body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_uids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = SeenUidStore::new(&path);

        let uids: HashSet<String> = ["12", "10", "11"].iter().map(|s| s.to_string()).collect();
        store.save(&uids).await.unwrap();

        let loaded = store.load(false).await;
        assert_eq!(loaded, uids);

        // Sorted on disk.
        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw, r#"["10","11","12"]"#);
    }

    #[tokio::test]
    async fn reset_and_missing_files_start_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SeenUidStore::new(dir.path().join("missing.json"));
        assert!(store.load(false).await.is_empty());

        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"["10"]"#).unwrap();
        let store = SeenUidStore::new(&path);
        assert!(store.load(true).await.is_empty());
        assert_eq!(store.load(false).await.len(), 1);
    }

    #[tokio::test]
    async fn corrupt_state_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "not json").unwrap();
        let store = SeenUidStore::new(&path);
        assert!(store.load(false).await.is_empty());
    }
}
