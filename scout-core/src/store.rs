//! Project store
//!
//! A keyed collection of [`ProjectRecord`]s behind an async trait, so callers
//! never assume a write has landed before the future resolves. Two backends:
//! [`MemoryStore`] and the disk-backed [`JsonFileStore`], which rewrites one
//! JSON table file per mutation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::event::{AppEvent, EventBus};
use crate::project::{NewProject, ProjectKey, ProjectRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("project not found: {key}")]
    NotFound { key: ProjectKey },
    #[error("no project matches")]
    NoMatch,
    #[error("store IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("store file {path} is not a project table: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. } | StoreError::NoMatch)
    }
}

/// Predicate used by [`ProjectStore::find`]
pub type Predicate<'a> = &'a (dyn Fn(&ProjectRecord) -> bool + Send + Sync);

#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Merge `fields` over the defaults, assign a fresh key, persist.
    async fn create(&self, fields: NewProject) -> Result<ProjectKey, StoreError>;

    async fn get(&self, key: &ProjectKey) -> Result<ProjectRecord, StoreError>;

    /// Overwrite the record stored under `record.key`
    async fn update(&self, record: ProjectRecord) -> Result<(), StoreError>;

    /// Remove a record; absent keys are not an error
    async fn delete(&self, key: &ProjectKey) -> Result<(), StoreError>;

    /// Snapshot in insertion order
    async fn all(&self) -> Result<Vec<ProjectRecord>, StoreError>;

    /// First record satisfying `predicate`
    async fn find(&self, predicate: Predicate<'_>) -> Result<ProjectRecord, StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;

    async fn find_by_name(&self, name: &str) -> Result<ProjectRecord, StoreError> {
        self.find(&|p: &ProjectRecord| p.name == name).await
    }
}

/// Ordered record table shared by both backends
#[derive(Clone, Debug, Default)]
struct Table {
    records: Vec<ProjectRecord>,
}

impl Table {
    fn insert(&mut self, fields: NewProject) -> ProjectRecord {
        let record = fields.into_record(ProjectKey::generate());
        self.records.push(record.clone());
        record
    }

    fn get(&self, key: &ProjectKey) -> Result<ProjectRecord, StoreError> {
        self.records
            .iter()
            .find(|r| &r.key == key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { key: key.clone() })
    }

    fn update(&mut self, record: ProjectRecord) -> Result<(), StoreError> {
        let slot = self
            .records
            .iter_mut()
            .find(|r| r.key == record.key)
            .ok_or_else(|| StoreError::NotFound {
                key: record.key.clone(),
            })?;
        *slot = record;
        Ok(())
    }

    fn remove(&mut self, key: &ProjectKey) -> bool {
        let before = self.records.len();
        self.records.retain(|r| &r.key != key);
        self.records.len() != before
    }

    fn find(&self, predicate: Predicate<'_>) -> Result<ProjectRecord, StoreError> {
        self.records
            .iter()
            .find(|r| predicate(r))
            .cloned()
            .ok_or(StoreError::NoMatch)
    }
}

pub struct MemoryStore {
    table: RwLock<Table>,
    bus: EventBus,
}

impl MemoryStore {
    pub fn new(bus: EventBus) -> Self {
        Self {
            table: RwLock::new(Table::default()),
            bus,
        }
    }
}

#[async_trait]
impl ProjectStore for MemoryStore {
    async fn create(&self, fields: NewProject) -> Result<ProjectKey, StoreError> {
        let record = self.table.write().await.insert(fields);
        tracing::debug!(key = %record.key, name = %record.name, "project created");
        self.bus.emit(AppEvent::Changed);
        Ok(record.key)
    }

    async fn get(&self, key: &ProjectKey) -> Result<ProjectRecord, StoreError> {
        self.table.read().await.get(key)
    }

    async fn update(&self, record: ProjectRecord) -> Result<(), StoreError> {
        self.table.write().await.update(record)
    }

    async fn delete(&self, key: &ProjectKey) -> Result<(), StoreError> {
        if self.table.write().await.remove(key) {
            tracing::debug!(key = %key, "project deleted");
            self.bus.emit(AppEvent::Changed);
        }
        Ok(())
    }

    async fn all(&self) -> Result<Vec<ProjectRecord>, StoreError> {
        Ok(self.table.read().await.records.clone())
    }

    async fn find(&self, predicate: Predicate<'_>) -> Result<ProjectRecord, StoreError> {
        self.table.read().await.find(predicate)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.table.write().await.records.clear();
        self.bus.emit(AppEvent::Changed);
        Ok(())
    }
}

/// Disk-backed store: the whole table lives in one JSON array file.
///
/// The write lock is held across the file write, so mutations reach disk in
/// the order they were issued.
pub struct JsonFileStore {
    path: PathBuf,
    table: RwLock<Table>,
    bus: EventBus,
}

impl JsonFileStore {
    /// Open (or lazily create) the table at `path`
    pub async fn open(path: impl Into<PathBuf>, bus: EventBus) -> Result<Self, StoreError> {
        let path = path.into();
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Vec::new(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        tracing::debug!(path = %path.display(), count = records.len(), "project table loaded");
        Ok(Self {
            path,
            table: RwLock::new(Table { records }),
            bus,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, table: &Table) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        let json = serde_json::to_vec_pretty(&table.records).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }

    /// Apply `edit` to a copy of the table, write the copy, and only then
    /// swap it in. A failed write leaves memory matching the file.
    async fn commit<T>(
        &self,
        edit: impl FnOnce(&mut Table) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut table = self.table.write().await;
        let mut next = table.clone();
        let out = edit(&mut next)?;
        self.persist(&next).await?;
        *table = next;
        Ok(out)
    }
}

#[async_trait]
impl ProjectStore for JsonFileStore {
    async fn create(&self, fields: NewProject) -> Result<ProjectKey, StoreError> {
        let record = self.commit(|table| Ok(table.insert(fields))).await?;
        tracing::debug!(key = %record.key, name = %record.name, "project created");
        self.bus.emit(AppEvent::Changed);
        Ok(record.key)
    }

    async fn get(&self, key: &ProjectKey) -> Result<ProjectRecord, StoreError> {
        self.table.read().await.get(key)
    }

    async fn update(&self, record: ProjectRecord) -> Result<(), StoreError> {
        self.commit(|table| table.update(record)).await
    }

    async fn delete(&self, key: &ProjectKey) -> Result<(), StoreError> {
        if !self.table.read().await.records.iter().any(|r| &r.key == key) {
            return Ok(());
        }
        let removed = self.commit(|table| Ok(table.remove(key))).await?;
        if removed {
            tracing::debug!(key = %key, "project deleted");
            self.bus.emit(AppEvent::Changed);
        }
        Ok(())
    }

    async fn all(&self) -> Result<Vec<ProjectRecord>, StoreError> {
        Ok(self.table.read().await.records.clone())
    }

    async fn find(&self, predicate: Predicate<'_>) -> Result<ProjectRecord, StoreError> {
        self.table.read().await.find(predicate)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.commit(|table| {
            table.records.clear();
            Ok(())
        })
        .await?;
        self.bus.emit(AppEvent::Changed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::drain;
    use crate::project::{Environment, OutputStyle};

    #[tokio::test]
    async fn test_create_applies_defaults() {
        let store = MemoryStore::new(EventBus::default());
        let key = store.create(NewProject::new("p1", "/tmp/p1")).await.unwrap();
        let record = store.get(&key).await.unwrap();
        assert_eq!(record.key, key);
        assert_eq!(record.sass_dir, "");
        assert_eq!(record.environment, Environment::Development);
        assert_eq!(record.output_style, OutputStyle::Expanded);
    }

    #[tokio::test]
    async fn test_keys_are_unique() {
        let store = MemoryStore::new(EventBus::default());
        let a = store.create(NewProject::new("same", "/x")).await.unwrap();
        let b = store.create(NewProject::new("same", "/x")).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_after_delete_is_not_found() {
        let store = MemoryStore::new(EventBus::default());
        let key = store.create(NewProject::new("p", "/p")).await.unwrap();
        let mut record = store.get(&key).await.unwrap();
        store.delete(&key).await.unwrap();

        record.css_dir = "/p/css".into();
        let err = store.update(record).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert!(store.get(&key).await.unwrap_err().is_not_found());
        // Deleting again is fine.
        store.delete(&key).await.unwrap();
    }

    #[tokio::test]
    async fn test_find_first_match() {
        let store = MemoryStore::new(EventBus::default());
        store.create(NewProject::new("a", "/a")).await.unwrap();
        let b = store.create(NewProject::new("b", "/b1")).await.unwrap();
        store.create(NewProject::new("b", "/b2")).await.unwrap();

        let found = store.find_by_name("b").await.unwrap();
        assert_eq!(found.key, b);
        assert!(matches!(
            store.find(&|p: &ProjectRecord| p.name == "zzz").await,
            Err(StoreError::NoMatch)
        ));
    }

    #[tokio::test]
    async fn test_notifications() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let store = MemoryStore::new(bus);

        let key = store.create(NewProject::new("a", "/a")).await.unwrap();
        store.create(NewProject::new("b", "/b")).await.unwrap();
        store.delete(&key).await.unwrap();
        store.delete(&key).await.unwrap();
        store.clear().await.unwrap();

        let changed = drain(&mut rx)
            .into_iter()
            .filter(|e| *e == AppEvent::Changed)
            .count();
        assert_eq!(changed, 4);
        assert!(store.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_json_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("projects.json");

        let store = JsonFileStore::open(&path, EventBus::default()).await.unwrap();
        let key = store
            .create(NewProject::new("site", "/srv/site").with_output_style(OutputStyle::Compact))
            .await
            .unwrap();
        let mut record = store.get(&key).await.unwrap();
        record.environment = Environment::Production;
        store.update(record).await.unwrap();
        store.create(NewProject::new("other", "/srv/other")).await.unwrap();
        drop(store);

        let reopened = JsonFileStore::open(&path, EventBus::default()).await.unwrap();
        let all = reopened.all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].key, key);
        assert_eq!(all[0].environment, Environment::Production);
        assert_eq!(all[0].output_style, OutputStyle::Compact);
        assert_eq!(all[1].name, "other");

        reopened.clear().await.unwrap();
        let empty = JsonFileStore::open(&path, EventBus::default()).await.unwrap();
        assert!(empty.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_json_store_failed_write_leaves_table_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("projects.json");
        let store = JsonFileStore::open(&path, EventBus::default()).await.unwrap();
        let key = store.create(NewProject::new("site", "/srv/site")).await.unwrap();

        // A directory where the temporary file goes makes every write fail.
        let blocker = path.with_extension("json.tmp");
        std::fs::create_dir(&blocker).unwrap();

        let mut record = store.get(&key).await.unwrap();
        record.environment = Environment::Production;
        assert!(matches!(store.update(record).await, Err(StoreError::Io { .. })));
        assert_eq!(store.get(&key).await.unwrap().environment, Environment::Development);

        assert!(store.delete(&key).await.is_err());
        assert!(store.clear().await.is_err());
        assert!(store.create(NewProject::new("other", "/srv/other")).await.is_err());
        let all = store.all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].key, key);

        std::fs::remove_dir(&blocker).unwrap();
        store.delete(&key).await.unwrap();
        let reopened = JsonFileStore::open(&path, EventBus::default()).await.unwrap();
        assert!(reopened.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_json_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("projects.json");
        std::fs::write(&path, "not json").unwrap();
        let err = JsonFileStore::open(&path, EventBus::default()).await.err().unwrap();
        assert!(matches!(err, StoreError::Json { .. }));
    }
}
