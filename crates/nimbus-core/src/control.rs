//! The shared control-plane pattern.
//!
//! Every per-service control plane follows the same shape to turn an
//! intent into store calls with cloud-compatible result semantics.
//! These helpers encode the shape once:
//!
//! - [`upsert`] / [`upsert_subresource`] — the locked look-up-then-
//!   create sequence behind every `createOrUpdate`. On an existing id
//!   they return the stored resource *unchanged*, which is the
//!   observed behavior of the emulated services.
//! - [`ensure_scope`] — the ancestor-existence check run before
//!   creating or reading inside a scope. Ancestors are never
//!   implicitly created: their absence propagates as the current
//!   operation's `NotFound`.
//!
//! The write lock is held across each whole read-modify-write
//! sequence. The check-ancestor-then-write pair still spans two
//! services' stores and is not transactional; a concurrent ancestor
//! delete in that window can orphan a resource, a documented
//! limitation of a single-user local emulator.

use serde::de::DeserializeOwned;
use serde::Serialize;

use nimbus_store::ServiceStorage;

use crate::error::EmulatorError;
use crate::outcome::{OperationOutcome, OperationResult};

/// Locked `createOrUpdate` for a top-level resource.
///
/// Returns `(Created, new)` when no document existed, `(Updated,
/// existing-unchanged)` otherwise.
pub fn upsert<T, F>(
    storage: &ServiceStorage,
    name: &str,
    build_new: F,
) -> Result<(OperationResult, T), EmulatorError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> T,
{
    let _guard = storage.write_lock();
    if let Some(existing) = storage.get_typed::<T>(name)? {
        return Ok((OperationResult::Updated, existing));
    }
    let fresh = build_new();
    storage.create(name, &fresh)?;
    Ok((OperationResult::Created, fresh))
}

/// Locked `createOrUpdate` for a subresource.
pub fn upsert_subresource<T, F>(
    storage: &ServiceStorage,
    parent: &str,
    kind: &str,
    name: &str,
    build_new: F,
) -> Result<(OperationResult, T), EmulatorError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> T,
{
    let _guard = storage.write_lock();
    if let Some(existing) = storage.get_subresource_typed::<T>(parent, kind, name)? {
        return Ok((OperationResult::Updated, existing));
    }
    let fresh = build_new();
    storage.create_subresource(parent, kind, name, &fresh)?;
    Ok((OperationResult::Created, fresh))
}

/// Locked `createOrUpdate` that refuses to touch a same-named
/// document owned by a different scope.
///
/// Documents are keyed by bare name on disk, so a resource with the
/// same name under another subscription or resource group occupies
/// the same slot. Reads treat such a document as absent; a write
/// against it is a name collision and comes back as `Conflict`.
pub fn upsert_scoped<T, P, F>(
    storage: &ServiceStorage,
    name: &str,
    in_scope: P,
    build_new: F,
) -> Result<(OperationResult, T), EmulatorError>
where
    T: Serialize + DeserializeOwned,
    P: FnOnce(&T) -> bool,
    F: FnOnce() -> T,
{
    let _guard = storage.write_lock();
    if let Some(existing) = storage.get_typed::<T>(name)? {
        if !in_scope(&existing) {
            return Err(EmulatorError::conflict(format!(
                "the name '{name}' is already taken in another scope"
            )));
        }
        return Ok((OperationResult::Updated, existing));
    }
    let fresh = build_new();
    storage.create(name, &fresh)?;
    Ok((OperationResult::Created, fresh))
}

/// Reads a document and filters it through a scope predicate.
///
/// A stored document whose identifier belongs to a different scope is
/// reported as absent, never leaked across subscriptions.
pub fn read_scoped<T, P>(
    storage: &ServiceStorage,
    name: &str,
    in_scope: P,
) -> Result<Option<T>, EmulatorError>
where
    T: DeserializeOwned,
    P: FnOnce(&T) -> bool,
{
    match storage.get_typed::<T>(name)? {
        Some(doc) if in_scope(&doc) => Ok(Some(doc)),
        _ => Ok(None),
    }
}

/// Checks that an ancestor scope exists before operating inside it.
pub fn ensure_scope(exists: bool, kind: &str, name: &str) -> Result<(), EmulatorError> {
    if exists {
        Ok(())
    } else {
        Err(EmulatorError::not_found(format!("{kind} '{name}' does not exist")))
    }
}

/// Renders a read into the uniform outcome: `Success` with the
/// resource, or `NotFound` with a reason naming the resource kind.
#[must_use]
pub fn read_outcome<T>(found: Option<T>, kind: &str, name: &str) -> OperationOutcome<T> {
    match found {
        Some(resource) => OperationOutcome::success(resource),
        None => OperationOutcome::not_found(format!("{kind} '{name}' does not exist")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Doc {
        name: String,
        generation: u32,
    }

    fn storage(dir: &TempDir) -> ServiceStorage {
        let storage = ServiceStorage::new(dir.path(), "test-service", ["children"]);
        storage.ensure_root().unwrap();
        storage
    }

    #[test]
    fn test_upsert_creates_then_reports_updated() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        let (result, doc) = upsert(&storage, "a", || Doc {
            name: "a".into(),
            generation: 1,
        })
        .unwrap();
        assert_eq!(result, OperationResult::Created);
        assert_eq!(doc.generation, 1);

        // Second call: Updated, and the stored document is returned
        // unchanged regardless of what the builder would produce.
        let (result, doc) = upsert(&storage, "a", || Doc {
            name: "a".into(),
            generation: 2,
        })
        .unwrap();
        assert_eq!(result, OperationResult::Updated);
        assert_eq!(doc.generation, 1);
    }

    #[test]
    fn test_upsert_subresource() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage.create("parent", &serde_json::json!({})).unwrap();

        let build = || Doc {
            name: "c".into(),
            generation: 1,
        };
        let (result, _) = upsert_subresource(&storage, "parent", "children", "c", build).unwrap();
        assert_eq!(result, OperationResult::Created);
        let (result, _) = upsert_subresource(&storage, "parent", "children", "c", build).unwrap();
        assert_eq!(result, OperationResult::Updated);
    }

    #[test]
    fn test_read_scoped_hides_foreign_documents() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage
            .create("a", &Doc { name: "sub-one/a".into(), generation: 1 })
            .unwrap();

        let mine =
            read_scoped(&storage, "a", |d: &Doc| d.name.starts_with("sub-one/")).unwrap();
        assert!(mine.is_some());

        let foreign =
            read_scoped(&storage, "a", |d: &Doc| d.name.starts_with("sub-two/")).unwrap();
        assert!(foreign.is_none());
    }

    #[test]
    fn test_upsert_scoped_conflicts_on_foreign_name() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage
            .create("a", &Doc { name: "sub-one/a".into(), generation: 1 })
            .unwrap();

        let err = upsert_scoped(
            &storage,
            "a",
            |d: &Doc| d.name.starts_with("sub-two/"),
            || Doc { name: "sub-two/a".into(), generation: 1 },
        )
        .unwrap_err();
        assert!(matches!(err, EmulatorError::Conflict { .. }));
    }

    #[test]
    fn test_ensure_scope() {
        assert!(ensure_scope(true, "resource group", "rg1").is_ok());
        let err = ensure_scope(false, "resource group", "rg1").unwrap_err();
        assert!(matches!(err, EmulatorError::NotFound { .. }));
        assert_eq!(err.to_string(), "resource group 'rg1' does not exist");
    }

    #[test]
    fn test_read_outcome() {
        let found = read_outcome(Some(1u32), "thing", "t");
        assert_eq!(found.result, OperationResult::Success);

        let missing: OperationOutcome<u32> = read_outcome(None, "thing", "t");
        assert_eq!(missing.result, OperationResult::NotFound);
        assert_eq!(missing.reason.as_deref(), Some("thing 't' does not exist"));
    }
}
