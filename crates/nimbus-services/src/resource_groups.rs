//! The resource groups service.
//!
//! Resource groups are the container every regional resource lives in.
//! All operations verify the subscription ancestor first; a group is
//! never implicitly created by a child service.
//!
//! Deleting a group that does not exist reports success, matching the
//! cloud behavior tooling retries depend on. That status mapping is
//! specific to this service and is applied at the endpoint, not in the
//! shared outcome protocol.

use std::collections::BTreeMap;
use std::sync::Arc;

use http::StatusCode;
use serde::{Deserialize, Serialize};

use nimbus_core::control::{ensure_scope, read_outcome, read_scoped, upsert_scoped};
use nimbus_core::{
    ControlPlaneResult, EmulatorError, EndpointDefinition, OperationOutcome, OperationResult,
    ResourceCollection, ServiceContext, ServiceDefinition, ServiceRequest, ServiceResponse,
};
use nimbus_resource::{ArmResource, ResourceId};
use nimbus_router::{BindPoint, TemplateError};
use nimbus_store::ServiceStorage;

use crate::subscriptions::SubscriptionControlPlane;

const STORAGE_DIR: &str = "resourcegroups";

/// Resource group properties. Provisioning is instantaneous locally,
/// so the state is `Succeeded` from creation on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGroupProperties {
    /// Always `Succeeded`.
    pub provisioning_state: String,
}

impl Default for ResourceGroupProperties {
    fn default() -> Self {
        Self {
            provisioning_state: "Succeeded".to_owned(),
        }
    }
}

/// A stored resource group.
pub type ResourceGroup = ArmResource<ResourceGroupProperties>;

/// Body of a `createOrUpdate` request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGroupRequest {
    /// Region label; required, but purely descriptive locally.
    pub location: String,
    /// Optional tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// Control plane for resource groups.
#[derive(Debug)]
pub struct ResourceGroupControlPlane {
    storage: Arc<ServiceStorage>,
    subscriptions: Arc<SubscriptionControlPlane>,
}

impl ResourceGroupControlPlane {
    /// Wires the plane against the context's storage root.
    #[must_use]
    pub fn new(ctx: &ServiceContext, subscriptions: Arc<SubscriptionControlPlane>) -> Self {
        Self {
            storage: Arc::new(ServiceStorage::new(
                &ctx.storage_root,
                STORAGE_DIR,
                Vec::<String>::new(),
            )),
            subscriptions,
        }
    }

    /// `createOrUpdate`. An existing group is returned unchanged; the
    /// request body only shapes a newly created document.
    pub fn create_or_update(
        &self,
        sub: &str,
        name: &str,
        request: ResourceGroupRequest,
    ) -> Result<ControlPlaneResult<ResourceGroup>, EmulatorError> {
        self.subscriptions.ensure_exists(sub)?;
        if request.location.trim().is_empty() {
            return Err(EmulatorError::validation(
                "resource group location must not be empty",
            ));
        }

        let (result, group) = upsert_scoped(
            &self.storage,
            name,
            |g: &ResourceGroup| g.is_in_subscription(sub),
            || {
                let id = ResourceId::resource_group_id(sub, name);
                ArmResource::new(id, request.location.clone(), ResourceGroupProperties::default())
                    .with_tags(request.tags.clone())
            },
        )?;
        Ok(match result {
            OperationResult::Created => OperationOutcome::created(group),
            _ => OperationOutcome::updated(group),
        })
    }

    /// Looks up a group within one subscription.
    pub fn get(
        &self,
        sub: &str,
        name: &str,
    ) -> Result<ControlPlaneResult<ResourceGroup>, EmulatorError> {
        self.subscriptions.ensure_exists(sub)?;
        let found = read_scoped(&self.storage, name, |g: &ResourceGroup| {
            g.is_in_subscription(sub)
        })?;
        Ok(read_outcome(found, "resource group", name))
    }

    /// Deletes a group and everything stored beneath it. A missing
    /// group yields a `NotFound` outcome; the endpoint decides how
    /// that renders.
    pub fn delete(
        &self,
        sub: &str,
        name: &str,
    ) -> Result<ControlPlaneResult<ResourceGroup>, EmulatorError> {
        self.subscriptions.ensure_exists(sub)?;
        let _guard = self.storage.write_lock();
        let found = read_scoped(&self.storage, name, |g: &ResourceGroup| {
            g.is_in_subscription(sub)
        })?;
        match found {
            Some(_) => {
                self.storage.delete(name)?;
                Ok(OperationOutcome::deleted())
            }
            None => Ok(OperationOutcome::not_found(format!(
                "resource group '{name}' does not exist"
            ))),
        }
    }

    /// Lists the groups of one subscription.
    pub fn list(&self, sub: &str) -> Result<Vec<ResourceGroup>, EmulatorError> {
        self.subscriptions.ensure_exists(sub)?;
        let groups = self
            .storage
            .list()?
            .into_iter()
            .map(|doc| {
                serde_json::from_value::<ResourceGroup>(doc).map_err(|e| {
                    EmulatorError::StorageCorruption {
                        message: format!("stored resource group does not parse: {e}"),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(groups
            .into_iter()
            .filter(|g| g.is_in_subscription(sub))
            .collect())
    }

    /// Whether a group exists in the given subscription.
    pub fn exists(&self, sub: &str, name: &str) -> Result<bool, EmulatorError> {
        Ok(read_scoped(&self.storage, name, |g: &ResourceGroup| {
            g.is_in_subscription(sub)
        })?
        .is_some())
    }

    /// Ancestor check used by every group-scoped service: verifies the
    /// subscription first, then the group.
    pub fn ensure_exists(&self, sub: &str, name: &str) -> Result<(), EmulatorError> {
        self.subscriptions.ensure_exists(sub)?;
        ensure_scope(self.exists(sub, name)?, "resource group", name)
    }

    pub(crate) fn storage(&self) -> Arc<ServiceStorage> {
        Arc::clone(&self.storage)
    }
}

/// Builds the service definition.
pub fn service(
    plane: &Arc<ResourceGroupControlPlane>,
    bind: BindPoint,
) -> Result<ServiceDefinition, TemplateError> {
    const INSTANCE: &str = "/subscriptions/{subscriptionId}/resourceGroups/{resourceGroupName}";

    let put_plane = Arc::clone(plane);
    let get_plane = Arc::clone(plane);
    let delete_plane = Arc::clone(plane);
    let list_plane = Arc::clone(plane);

    let endpoints = vec![
        EndpointDefinition::new(
            bind,
            &[&format!("PUT {INSTANCE}")],
            Arc::new(move |req: &ServiceRequest| {
                let sub = req.param("subscriptionId")?;
                let name = req.param("resourceGroupName")?;
                let outcome = put_plane.create_or_update(sub, name, req.json()?)?;
                ServiceResponse::from_outcome(&outcome)
            }),
        )?,
        EndpointDefinition::new(
            bind,
            &[&format!("GET {INSTANCE}")],
            Arc::new(move |req: &ServiceRequest| {
                let sub = req.param("subscriptionId")?;
                let name = req.param("resourceGroupName")?;
                let outcome = get_plane.get(sub, name)?;
                ServiceResponse::from_outcome(&outcome)
            }),
        )?,
        EndpointDefinition::new(
            bind,
            &[&format!("DELETE {INSTANCE}")],
            Arc::new(move |req: &ServiceRequest| {
                let sub = req.param("subscriptionId")?;
                let name = req.param("resourceGroupName")?;
                let outcome = delete_plane.delete(sub, name)?;
                // Deleting an absent group succeeds; retried deletes
                // must not error.
                ServiceResponse::from_outcome_with(&outcome, |result| match result {
                    OperationResult::NotFound => StatusCode::OK,
                    other => other.http_status(),
                })
            }),
        )?,
        EndpointDefinition::new(
            bind,
            &["GET /subscriptions/{subscriptionId}/resourceGroups"],
            Arc::new(move |req: &ServiceRequest| {
                let sub = req.param("subscriptionId")?;
                let groups: ResourceCollection<_> = list_plane.list(sub)?.into_iter().collect();
                ServiceResponse::json(StatusCode::OK, &groups)
            }),
        )?,
    ];

    Ok(ServiceDefinition {
        name: "resource-groups".to_owned(),
        storage: plane.storage(),
        endpoints,
        bootstrap: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn planes(dir: &TempDir) -> (Arc<SubscriptionControlPlane>, ResourceGroupControlPlane) {
        let ctx = ServiceContext {
            storage_root: dir.path().to_path_buf(),
            control_plane_bind: BindPoint::http(8080),
        };
        let subscriptions = Arc::new(SubscriptionControlPlane::new(&ctx));
        subscriptions.storage().ensure_root().unwrap();
        subscriptions.create_or_update("sub-one", "Team One").unwrap();
        subscriptions.create_or_update("sub-two", "Team Two").unwrap();
        let groups = ResourceGroupControlPlane::new(&ctx, Arc::clone(&subscriptions));
        groups.storage.ensure_root().unwrap();
        (subscriptions, groups)
    }

    fn request(location: &str) -> ResourceGroupRequest {
        ResourceGroupRequest {
            location: location.to_owned(),
            tags: BTreeMap::new(),
        }
    }

    #[test]
    fn test_create_then_update_returns_existing_unchanged() {
        let dir = TempDir::new().unwrap();
        let (_, plane) = planes(&dir);

        let outcome = plane
            .create_or_update("sub-one", "rg1", request("westeurope"))
            .unwrap();
        assert_eq!(outcome.result, OperationResult::Created);
        let created = outcome.resource.unwrap();
        assert_eq!(created.name, "rg1");
        assert_eq!(created.properties.provisioning_state, "Succeeded");

        // Re-PUT with a different location: Updated, original document.
        let outcome = plane
            .create_or_update("sub-one", "rg1", request("eastus"))
            .unwrap();
        assert_eq!(outcome.result, OperationResult::Updated);
        assert_eq!(outcome.resource.unwrap().location, "westeurope");
    }

    #[test]
    fn test_create_requires_existing_subscription() {
        let dir = TempDir::new().unwrap();
        let (_, plane) = planes(&dir);

        let err = plane
            .create_or_update("absent", "rg1", request("westeurope"))
            .unwrap_err();
        assert!(matches!(err, EmulatorError::NotFound { .. }));
    }

    #[test]
    fn test_empty_location_is_rejected() {
        let dir = TempDir::new().unwrap();
        let (_, plane) = planes(&dir);

        let err = plane
            .create_or_update("sub-one", "rg1", request("  "))
            .unwrap_err();
        assert!(matches!(err, EmulatorError::Validation { .. }));
    }

    #[test]
    fn test_get_does_not_cross_subscriptions() {
        let dir = TempDir::new().unwrap();
        let (_, plane) = planes(&dir);
        plane
            .create_or_update("sub-one", "rg1", request("westeurope"))
            .unwrap();

        let same_sub = plane.get("sub-one", "rg1").unwrap();
        assert_eq!(same_sub.result, OperationResult::Success);

        let other_sub = plane.get("sub-two", "rg1").unwrap();
        assert_eq!(other_sub.result, OperationResult::NotFound);
    }

    #[test]
    fn test_delete_is_idempotent_at_the_outcome_level() {
        let dir = TempDir::new().unwrap();
        let (_, plane) = planes(&dir);
        plane
            .create_or_update("sub-one", "rg1", request("westeurope"))
            .unwrap();

        let first = plane.delete("sub-one", "rg1").unwrap();
        assert_eq!(first.result, OperationResult::Deleted);

        let second = plane.delete("sub-one", "rg1").unwrap();
        assert_eq!(second.result, OperationResult::NotFound);
    }

    #[test]
    fn test_list_filters_by_subscription() {
        let dir = TempDir::new().unwrap();
        let (_, plane) = planes(&dir);
        plane
            .create_or_update("sub-one", "rg1", request("westeurope"))
            .unwrap();
        plane
            .create_or_update("sub-two", "other", request("eastus"))
            .unwrap();

        let listed = plane.list("sub-one").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "rg1");
    }
}
