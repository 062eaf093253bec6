//! Where tracked pages live between cycles.
//!
//! A check cycle reads the page list at its start and writes back only the
//! fields it owns, through [`PageStore::record_check`].

use crate::errors::StoreError;
use crate::results::{CheckState, TrackedPage};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use uuid::Uuid;

#[async_trait]
pub trait PageStore: Send + Sync {
    /// Every tracked page
    async fn list(&self) -> Result<Vec<TrackedPage>, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<TrackedPage>, StoreError>;

    /// Add a page, replacing any record with the same id
    async fn insert(&self, page: TrackedPage) -> Result<(), StoreError>;

    /// Overwrite the check-owned fields of one page and return the updated record
    async fn record_check(&self, id: Uuid, state: CheckState) -> Result<TrackedPage, StoreError>;

    /// Delete a page, returning it if it existed
    async fn remove(&self, id: Uuid) -> Result<Option<TrackedPage>, StoreError>;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryStore {
    pages: RwLock<BTreeMap<Uuid, TrackedPage>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pages(pages: impl IntoIterator<Item = TrackedPage>) -> Self {
        Self {
            pages: RwLock::new(pages.into_iter().map(|p| (p.id, p)).collect()),
        }
    }
}

#[async_trait]
impl PageStore for MemoryStore {
    async fn list(&self) -> Result<Vec<TrackedPage>, StoreError> {
        Ok(self.pages.read().await.values().cloned().collect())
    }

    async fn get(&self, id: Uuid) -> Result<Option<TrackedPage>, StoreError> {
        Ok(self.pages.read().await.get(&id).cloned())
    }

    async fn insert(&self, page: TrackedPage) -> Result<(), StoreError> {
        self.pages.write().await.insert(page.id, page);
        Ok(())
    }

    async fn record_check(&self, id: Uuid, state: CheckState) -> Result<TrackedPage, StoreError> {
        let mut pages = self.pages.write().await;
        let page = pages.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        page.apply(state);
        Ok(page.clone())
    }

    async fn remove(&self, id: Uuid) -> Result<Option<TrackedPage>, StoreError> {
        Ok(self.pages.write().await.remove(&id))
    }
}

/// Pages kept as one JSON array on disk.
///
/// The whole file is rewritten on every change through a temporary file and a
/// rename, so a crash never leaves a half-written store. Only one process
/// should use a given file at a time.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    pages: RwLock<BTreeMap<Uuid, TrackedPage>>,
}

impl JsonFileStore {
    /// Load the store at `path`; a missing file is an empty store
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let pages = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => Vec::new(),
            Ok(contents) => serde_json::from_str::<Vec<TrackedPage>>(&contents)?,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        ::log::debug!("Loaded {} pages from {}", pages.len(), path.display());

        Ok(Self {
            path,
            pages: RwLock::new(pages.into_iter().map(|p| (p.id, p)).collect()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write every page to disk. Callers hold the write lock, so writes land in order.
    async fn persist(&self, pages: &BTreeMap<Uuid, TrackedPage>) -> Result<(), StoreError> {
        let records: Vec<&TrackedPage> = pages.values().collect();
        let json = serde_json::to_vec_pretty(&records)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomically(&path, &json))
            .await
            .map_err(std::io::Error::other)??;

        ::log::trace!("Wrote {} pages to {}", records.len(), self.path.display());
        Ok(())
    }
}

/// Replace `path` through a synced temporary file and a rename
fn write_atomically(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    fs::rename(&tmp_path, path)
}

#[async_trait]
impl PageStore for JsonFileStore {
    async fn list(&self) -> Result<Vec<TrackedPage>, StoreError> {
        Ok(self.pages.read().await.values().cloned().collect())
    }

    async fn get(&self, id: Uuid) -> Result<Option<TrackedPage>, StoreError> {
        Ok(self.pages.read().await.get(&id).cloned())
    }

    async fn insert(&self, page: TrackedPage) -> Result<(), StoreError> {
        let mut pages = self.pages.write().await;
        let previous = pages.insert(page.id, page.clone());
        if let Err(e) = self.persist(&pages).await {
            // Keep memory in step with the file
            match previous {
                Some(old) => pages.insert(page.id, old),
                None => pages.remove(&page.id),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn record_check(&self, id: Uuid, state: CheckState) -> Result<TrackedPage, StoreError> {
        let mut pages = self.pages.write().await;
        let page = pages.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        let previous = page.check_state();
        page.apply(state);
        let updated = page.clone();

        if let Err(e) = self.persist(&pages).await {
            if let Some(page) = pages.get_mut(&id) {
                page.apply(previous);
            }
            return Err(e);
        }
        Ok(updated)
    }

    async fn remove(&self, id: Uuid) -> Result<Option<TrackedPage>, StoreError> {
        let mut pages = self.pages.write().await;
        let Some(removed) = pages.remove(&id) else {
            return Ok(None);
        };
        if let Err(e) = self.persist(&pages).await {
            pages.insert(id, removed);
            return Err(e);
        }
        Ok(Some(removed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::DiffBlock;
    use chrono::Utc;
    use std::sync::Arc;

    fn changed_state() -> CheckState {
        CheckState {
            last_snapshot: "<p>after</p>".to_string(),
            last_checked_at: Some(Utc::now()),
            changed: true,
            last_diff: vec![DiffBlock::delete("before", 3), DiffBlock::insert("after", 3)],
        }
    }

    #[tokio::test]
    async fn test_memory_store_crud() {
        let store = MemoryStore::new();
        let page = TrackedPage::new("https://example.com/", "Example");
        let id = page.id;

        store.insert(page).await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 1);

        let updated = store.record_check(id, changed_state()).await.unwrap();
        assert!(updated.changed);
        assert_eq!(updated.display_name, "Example");
        assert_eq!(store.get(id).await.unwrap().unwrap(), updated);

        assert!(store.remove(id).await.unwrap().is_some());
        assert!(store.remove(id).await.unwrap().is_none());
        assert!(store.get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_check_on_removed_page() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        match store.record_check(id, changed_state()).await {
            Err(StoreError::NotFound(missing)) => assert_eq!(missing, id),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_json_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pages.json");

        let page = TrackedPage::new("https://example.com/", "Example");
        let id = page.id;
        {
            let store = JsonFileStore::open(&path).unwrap();
            assert!(store.list().await.unwrap().is_empty());
            store.insert(page).await.unwrap();
            store.record_check(id, changed_state()).await.unwrap();
        }

        let reopened = JsonFileStore::open(&path).unwrap();
        let page = reopened.get(id).await.unwrap().unwrap();
        assert_eq!(page.last_snapshot, "<p>after</p>");
        assert!(page.changed);
        assert_eq!(page.rendered_diff(), "- before\n+ after");
        assert!(!dir.path().join("pages.json.tmp").exists());

        reopened.remove(id).await.unwrap();
        let reopened = JsonFileStore::open(&path).unwrap();
        assert!(reopened.list().await.unwrap().is_empty());
    }

    #[test]
    fn test_json_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pages.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(JsonFileStore::open(&path), Err(StoreError::Json(_))));
    }

    #[test]
    fn test_json_store_accepts_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = JsonFileStore::open(file.path()).unwrap();
        assert_eq!(store.path(), file.path());
    }

    #[tokio::test]
    async fn test_json_store_keeps_memory_when_write_fails() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be replaced by the renamed temp file
        let path = dir.path().join("pages.json");
        fs::create_dir(&path).unwrap();

        let store = JsonFileStore {
            path: path.clone(),
            pages: RwLock::new(BTreeMap::new()),
        };
        let page = TrackedPage::new("https://example.com/", "Example");
        assert!(store.insert(page).await.is_err());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_json_store_concurrent_writes_all_land() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pages.json");
        let store = Arc::new(JsonFileStore::open(&path).unwrap());

        let mut ids = Vec::new();
        for i in 0..8 {
            let page = TrackedPage::new(format!("https://site{}.example/", i), "Site");
            ids.push(page.id);
            store.insert(page).await.unwrap();
        }

        let mut tasks = tokio::task::JoinSet::new();
        for id in ids.clone() {
            let store = Arc::clone(&store);
            tasks.spawn(async move { store.record_check(id, changed_state()).await });
        }
        while let Some(joined) = tasks.join_next().await {
            assert!(joined.unwrap().unwrap().changed);
        }

        let reopened = JsonFileStore::open(&path).unwrap();
        for id in ids {
            assert!(reopened.get(id).await.unwrap().unwrap().changed);
        }
    }
}
