//! Generic per-service document storage.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// File name of the JSON document inside each instance directory.
const METADATA_FILE: &str = "metadata.json";

/// Directory reserved for blob payloads inside each instance directory.
const DATA_DIR: &str = "data";

/// Errors produced by [`ServiceStorage`] operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying filesystem failure.
    #[error("storage I/O failure at {path}: {source}")]
    Io {
        /// Path being read or written.
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A document exists on disk but cannot be parsed. Fatal to the
    /// current operation, never swallowed.
    #[error("corrupt document at {path}: {source}")]
    Corrupt {
        /// Path of the unparsable document.
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Strict create against an id that already has a document.
    #[error("resource '{id}' already exists")]
    AlreadyExists {
        /// The conflicting resource id.
        id: String,
    },

    /// A subresource operation named a type the service never declared.
    /// This is a caller bug, not a runtime condition.
    #[error("service '{service}' does not declare subresource type '{kind}'")]
    UndeclaredSubresource {
        /// Owning service name.
        service: String,
        /// The undeclared subresource type.
        kind: String,
    },

    /// An id or subresource name that is not a single clean path segment.
    #[error("invalid storage segment '{segment}'")]
    InvalidSegment {
        /// The rejected segment.
        segment: String,
    },

    /// A model failed to serialize before being written.
    #[error("cannot serialize document for '{id}': {source}")]
    Serialize {
        /// The resource id being written.
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Filesystem-backed CRUD for one service's storage namespace.
///
/// A `ServiceStorage` is created once per service at registration time
/// and shared across request-handling threads. Reads always hit the
/// current on-disk state; no resource object survives across requests.
///
/// # Example
///
/// ```rust
/// use nimbus_store::ServiceStorage;
///
/// let dir = tempfile::tempdir().unwrap();
/// let storage = ServiceStorage::new(dir.path(), "eventhub", ["eventhubs"]);
/// storage.ensure_root().unwrap();
///
/// storage.create("ns1", &serde_json::json!({"name": "ns1"})).unwrap();
/// assert!(storage.get("ns1").unwrap().is_some());
///
/// storage.delete("ns1").unwrap();
/// storage.delete("ns1").unwrap(); // idempotent
/// assert!(storage.get("ns1").unwrap().is_none());
/// ```
#[derive(Debug)]
pub struct ServiceStorage {
    service: String,
    root: PathBuf,
    subresource_types: BTreeSet<String>,
    /// Coarse per-service lock. The store's own operations never take
    /// it; control planes hold it across each read-modify-write
    /// sequence via [`Self::write_lock`].
    lock: Mutex<()>,
}

impl ServiceStorage {
    /// Creates a storage handle rooted at `<storage_root>/<service_dir>`.
    ///
    /// `subresource_types` is the closed set of subresource type names
    /// this service may store; an empty set means the service has no
    /// subresources and every subresource call is rejected.
    #[must_use]
    pub fn new<I, S>(storage_root: &Path, service_dir: &str, subresource_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            service: service_dir.to_owned(),
            root: storage_root.join(service_dir),
            subresource_types: subresource_types.into_iter().map(Into::into).collect(),
            lock: Mutex::new(()),
        }
    }

    /// The service name this storage belongs to.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// The service's storage root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the service root directory if it does not exist yet.
    pub fn ensure_root(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root).map_err(|e| StoreError::io(&self.root, e))
    }

    /// Acquires the per-service write lock.
    ///
    /// Hold the returned guard across any read-then-write sequence
    /// (existence check plus create, ancestor check plus write). Plain
    /// files provide no atomicity, so this is the only thing standing
    /// between two concurrent `createOrUpdate` calls on the same id.
    #[must_use]
    pub fn write_lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Reads the document stored at `id`.
    ///
    /// A missing document is the expected cheap path and yields
    /// `Ok(None)`. A document that exists but cannot be parsed is a
    /// [`StoreError::Corrupt`].
    pub fn get(&self, id: &str) -> Result<Option<serde_json::Value>, StoreError> {
        validate_segment(id)?;
        read_document(&self.instance_dir(id).join(METADATA_FILE))
    }

    /// Typed wrapper over [`Self::get`].
    pub fn get_typed<T: DeserializeOwned>(&self, id: &str) -> Result<Option<T>, StoreError> {
        validate_segment(id)?;
        read_typed(&self.instance_dir(id).join(METADATA_FILE))
    }

    /// Strictly creates the document at `id`.
    ///
    /// Fails with [`StoreError::AlreadyExists`] if a document is
    /// already present. Creates the instance directory and its `data/`
    /// area.
    pub fn create<T: Serialize>(&self, id: &str, model: &T) -> Result<(), StoreError> {
        validate_segment(id)?;
        let dir = self.instance_dir(id);
        if dir.join(METADATA_FILE).exists() {
            return Err(StoreError::AlreadyExists { id: id.to_owned() });
        }
        write_document(&dir, id, model, true)
    }

    /// Unconditional upsert of the document at `id`.
    pub fn create_or_update<T: Serialize>(&self, id: &str, model: &T) -> Result<(), StoreError> {
        validate_segment(id)?;
        write_document(&self.instance_dir(id), id, model, true)
    }

    /// Removes the resource, its `data/` area and every subresource.
    ///
    /// Deleting an id with no backing state is a no-op, never an error.
    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        validate_segment(id)?;
        remove_tree(&self.instance_dir(id))
    }

    /// Recursively enumerates every stored document under the service
    /// root, subresources included.
    ///
    /// An uninitialized root yields an empty list with a warning; it is
    /// not an error, since a service that never stored anything has
    /// nothing to list.
    pub fn list(&self) -> Result<Vec<serde_json::Value>, StoreError> {
        if !self.root.exists() {
            tracing::warn!(service = %self.service, root = %self.root.display(),
                "listing uninitialized storage root");
            return Ok(Vec::new());
        }
        let mut documents = Vec::new();
        collect_documents(&self.root, &mut documents)?;
        Ok(documents)
    }

    /// Reads the subresource document at `<parent>/<kind>/<id>`.
    pub fn get_subresource(
        &self,
        parent: &str,
        kind: &str,
        id: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let dir = self.subresource_dir(parent, kind, id)?;
        read_document(&dir.join(METADATA_FILE))
    }

    /// Typed wrapper over [`Self::get_subresource`].
    pub fn get_subresource_typed<T: DeserializeOwned>(
        &self,
        parent: &str,
        kind: &str,
        id: &str,
    ) -> Result<Option<T>, StoreError> {
        let dir = self.subresource_dir(parent, kind, id)?;
        read_typed(&dir.join(METADATA_FILE))
    }

    /// Strict create of a subresource document.
    pub fn create_subresource<T: Serialize>(
        &self,
        parent: &str,
        kind: &str,
        id: &str,
        model: &T,
    ) -> Result<(), StoreError> {
        let dir = self.subresource_dir(parent, kind, id)?;
        if dir.join(METADATA_FILE).exists() {
            return Err(StoreError::AlreadyExists {
                id: format!("{parent}/{kind}/{id}"),
            });
        }
        write_document(&dir, id, model, false)
    }

    /// Unconditional upsert of a subresource document.
    pub fn create_or_update_subresource<T: Serialize>(
        &self,
        parent: &str,
        kind: &str,
        id: &str,
        model: &T,
    ) -> Result<(), StoreError> {
        let dir = self.subresource_dir(parent, kind, id)?;
        write_document(&dir, id, model, false)
    }

    /// Idempotent removal of one subresource.
    pub fn delete_subresource(&self, parent: &str, kind: &str, id: &str) -> Result<(), StoreError> {
        let dir = self.subresource_dir(parent, kind, id)?;
        remove_tree(&dir)
    }

    /// Enumerates the documents of one subresource type under a parent.
    pub fn list_subresources(
        &self,
        parent: &str,
        kind: &str,
    ) -> Result<Vec<serde_json::Value>, StoreError> {
        validate_segment(parent)?;
        self.check_subresource_kind(kind)?;
        let dir = self.instance_dir(parent).join(kind);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut documents = Vec::new();
        collect_documents(&dir, &mut documents)?;
        Ok(documents)
    }

    fn instance_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    fn subresource_dir(&self, parent: &str, kind: &str, id: &str) -> Result<PathBuf, StoreError> {
        validate_segment(parent)?;
        validate_segment(id)?;
        self.check_subresource_kind(kind)?;
        Ok(self.instance_dir(parent).join(kind).join(id))
    }

    fn check_subresource_kind(&self, kind: &str) -> Result<(), StoreError> {
        // Case-sensitive on purpose; declared names are the canonical
        // spelling.
        if self.subresource_types.contains(kind) {
            Ok(())
        } else {
            Err(StoreError::UndeclaredSubresource {
                service: self.service.clone(),
                kind: kind.to_owned(),
            })
        }
    }
}

/// Rejects ids that would escape their directory or collide with the
/// store's own file layout.
fn validate_segment(segment: &str) -> Result<(), StoreError> {
    let clean = !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment != DATA_DIR
        && !segment.contains(['/', '\\']);
    if clean {
        Ok(())
    } else {
        Err(StoreError::InvalidSegment {
            segment: segment.to_owned(),
        })
    }
}

fn read_document(path: &Path) -> Result<Option<serde_json::Value>, StoreError> {
    match fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                path: path.to_owned(),
                source,
            }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

fn read_typed<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                path: path.to_owned(),
                source,
            }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

fn write_document<T: Serialize>(
    dir: &Path,
    id: &str,
    model: &T,
    with_data_dir: bool,
) -> Result<(), StoreError> {
    fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
    if with_data_dir {
        let data = dir.join(DATA_DIR);
        fs::create_dir_all(&data).map_err(|e| StoreError::io(&data, e))?;
    }
    let json = serde_json::to_vec_pretty(model).map_err(|source| StoreError::Serialize {
        id: id.to_owned(),
        source,
    })?;
    let path = dir.join(METADATA_FILE);
    fs::write(&path, json).map_err(|e| StoreError::io(&path, e))
}

fn remove_tree(dir: &Path) -> Result<(), StoreError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::io(dir, e)),
    }
}

fn collect_documents(dir: &Path, out: &mut Vec<serde_json::Value>) -> Result<(), StoreError> {
    let entries = fs::read_dir(dir).map_err(|e| StoreError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            if path.file_name().map(|n| n == DATA_DIR) == Some(true) {
                continue;
            }
            collect_documents(&path, out)?;
        } else if path.file_name().map(|n| n == METADATA_FILE) == Some(true) {
            if let Some(doc) = read_document(&path)? {
                out.push(doc);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn storage(dir: &TempDir) -> ServiceStorage {
        let storage = ServiceStorage::new(dir.path(), "eventhub", ["eventhubs"]);
        storage.ensure_root().unwrap();
        storage
    }

    #[test]
    fn test_get_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        assert!(storage.get("nope").unwrap().is_none());
    }

    #[test]
    fn test_create_get_round_trip() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        let model = json!({"name": "ns1", "location": "westeurope"});
        storage.create("ns1", &model).unwrap();

        let back = storage.get("ns1").unwrap().unwrap();
        assert_eq!(back, model);

        // Instance directory layout.
        assert!(dir.path().join("eventhub/ns1/metadata.json").is_file());
        assert!(dir.path().join("eventhub/ns1/data").is_dir());
    }

    #[test]
    fn test_create_conflicts_on_existing() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        storage.create("ns1", &json!({})).unwrap();
        let err = storage.create("ns1", &json!({})).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[test]
    fn test_create_or_update_overwrites() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        storage.create_or_update("ns1", &json!({"v": 1})).unwrap();
        storage.create_or_update("ns1", &json!({"v": 2})).unwrap();

        let back = storage.get("ns1").unwrap().unwrap();
        assert_eq!(back["v"], 2);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        // Never-created id: no error, storage unchanged.
        storage.delete("ghost").unwrap();

        storage.create("ns1", &json!({})).unwrap();
        storage.delete("ns1").unwrap();
        storage.delete("ns1").unwrap();
        assert!(storage.get("ns1").unwrap().is_none());
    }

    #[test]
    fn test_corrupt_document_is_an_error() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        let instance = dir.path().join("eventhub/bad");
        fs::create_dir_all(&instance).unwrap();
        fs::write(instance.join("metadata.json"), b"{ not json").unwrap();

        let err = storage.get("bad").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn test_list_uninitialized_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let storage = ServiceStorage::new(dir.path(), "never-bootstrapped", Vec::<String>::new());
        assert!(storage.list().unwrap().is_empty());
    }

    #[test]
    fn test_list_recurses_into_subresources() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        storage.create("ns1", &json!({"name": "ns1"})).unwrap();
        storage
            .create_subresource("ns1", "eventhubs", "hub1", &json!({"name": "hub1"}))
            .unwrap();

        let docs = storage.list().unwrap();
        assert_eq!(docs.len(), 2);
    }

    #[test]
    fn test_subresource_round_trip_and_layout() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        storage.create("ns1", &json!({})).unwrap();
        storage
            .create_subresource("ns1", "eventhubs", "hub1", &json!({"partitions": 4}))
            .unwrap();

        assert!(dir
            .path()
            .join("eventhub/ns1/eventhubs/hub1/metadata.json")
            .is_file());

        let back = storage.get_subresource("ns1", "eventhubs", "hub1").unwrap().unwrap();
        assert_eq!(back["partitions"], 4);

        let listed = storage.list_subresources("ns1", "eventhubs").unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[test]
    fn test_undeclared_subresource_type_is_rejected() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        let err = storage
            .create_subresource("ns1", "topics", "t1", &json!({}))
            .unwrap_err();
        assert!(matches!(err, StoreError::UndeclaredSubresource { .. }));

        // Case-sensitive: the declared spelling is canonical.
        let err = storage.get_subresource("ns1", "EventHubs", "hub1").unwrap_err();
        assert!(matches!(err, StoreError::UndeclaredSubresource { .. }));
    }

    #[test]
    fn test_parent_delete_removes_subresources() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        storage.create("ns1", &json!({})).unwrap();
        storage
            .create_subresource("ns1", "eventhubs", "hub1", &json!({}))
            .unwrap();

        storage.delete("ns1").unwrap();
        assert!(storage.get_subresource("ns1", "eventhubs", "hub1").unwrap().is_none());
        assert!(!dir.path().join("eventhub/ns1").exists());
    }

    #[test]
    fn test_invalid_segments_are_rejected() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        for bad in ["", "..", ".", "a/b", "a\\b", "data"] {
            let err = storage.get(bad).unwrap_err();
            assert!(matches!(err, StoreError::InvalidSegment { .. }), "{bad}");
        }
    }

    #[test]
    fn test_write_lock_serializes() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        let guard = storage.write_lock();
        drop(guard);
        // Re-acquirable after drop.
        let _guard = storage.write_lock();
    }
}
