//! The Event Hub service: `Microsoft.EventHub/namespaces` and the
//! `eventhubs` subresources under them.
//!
//! Namespaces are regional resources scoped to a resource group. Event
//! hubs live inside a namespace directory in storage and carry the
//! four-extra-segment subresource ids.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use http::StatusCode;
use serde::{Deserialize, Serialize};

use nimbus_core::control::{ensure_scope, read_outcome, read_scoped, upsert_scoped, upsert_subresource};
use nimbus_core::{
    ControlPlaneResult, EmulatorError, EndpointDefinition, OperationOutcome, OperationResult,
    ResourceCollection, ServiceContext, ServiceDefinition, ServiceRequest, ServiceResponse,
};
use nimbus_resource::{ArmResource, ArmSubresource, GenericResource, ResourceId, Sku};
use nimbus_router::{BindPoint, TemplateError};
use nimbus_store::ServiceStorage;

use crate::resource_groups::ResourceGroupControlPlane;

/// Provider namespace for all Event Hub resource types.
pub const PROVIDER_NAMESPACE: &str = "Microsoft.EventHub";
/// Declared subresource type for hubs under a namespace.
pub const SUBRESOURCE_EVENT_HUBS: &str = "eventhubs";

const STORAGE_DIR: &str = "eventhub";

/// Namespace properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceProperties {
    /// Always `Succeeded`; provisioning is instantaneous locally.
    pub provisioning_state: String,
    /// Creation timestamp.
    pub created_on: DateTime<Utc>,
}

impl NamespaceProperties {
    fn now() -> Self {
        Self {
            provisioning_state: "Succeeded".to_owned(),
            created_on: Utc::now(),
        }
    }
}

/// A stored Event Hub namespace.
pub type EventHubNamespace = ArmResource<NamespaceProperties>;

/// Properties of one event hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventHubProperties {
    /// Partition count, defaulting to 4 as the cloud does.
    pub partition_count: u32,
    /// Retention window for messages.
    pub message_retention_in_days: u32,
    /// Always `Active`.
    pub status: String,
    /// Creation timestamp.
    pub created_on: DateTime<Utc>,
}

/// A stored event hub.
pub type EventHub = ArmSubresource<EventHubProperties>;

/// Body of a namespace `createOrUpdate` request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceRequest {
    /// Region label; required.
    pub location: String,
    /// Optional SKU.
    #[serde(default)]
    pub sku: Option<Sku>,
    /// Optional tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// Caller-settable properties of an event hub `createOrUpdate`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventHubRequestProperties {
    /// Partition count; 4 when omitted.
    #[serde(default)]
    pub partition_count: Option<u32>,
    /// Retention window; 7 days when omitted.
    #[serde(default)]
    pub message_retention_in_days: Option<u32>,
}

/// Body of an event hub `createOrUpdate` request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventHubRequest {
    /// Optional properties block.
    #[serde(default)]
    pub properties: EventHubRequestProperties,
}

/// Control plane for Event Hub namespaces and hubs.
#[derive(Debug)]
pub struct EventHubControlPlane {
    storage: Arc<ServiceStorage>,
    resource_groups: Arc<ResourceGroupControlPlane>,
}

impl EventHubControlPlane {
    /// Wires the plane against the context's storage root.
    #[must_use]
    pub fn new(ctx: &ServiceContext, resource_groups: Arc<ResourceGroupControlPlane>) -> Self {
        Self {
            storage: Arc::new(ServiceStorage::new(
                &ctx.storage_root,
                STORAGE_DIR,
                [SUBRESOURCE_EVENT_HUBS],
            )),
            resource_groups,
        }
    }

    /// `createOrUpdate` for a namespace. Ancestors must exist; an
    /// existing namespace is returned unchanged.
    pub fn create_or_update_namespace(
        &self,
        sub: &str,
        rg: &str,
        name: &str,
        request: NamespaceRequest,
    ) -> Result<ControlPlaneResult<EventHubNamespace>, EmulatorError> {
        self.resource_groups.ensure_exists(sub, rg)?;
        if request.location.trim().is_empty() {
            return Err(EmulatorError::validation("namespace location must not be empty"));
        }

        let (result, namespace) = upsert_scoped(
            &self.storage,
            name,
            |ns: &EventHubNamespace| ns.is_in_subscription(sub) && ns.is_in_resource_group(rg),
            || {
                let id = ResourceId::regional(sub, rg, PROVIDER_NAMESPACE, "namespaces", name);
                let mut namespace =
                    ArmResource::new(id, request.location.clone(), NamespaceProperties::now())
                        .with_tags(request.tags.clone());
                if let Some(sku) = request.sku.clone() {
                    namespace = namespace.with_sku(sku);
                }
                namespace
            },
        )?;
        Ok(match result {
            OperationResult::Created => OperationOutcome::created(namespace),
            _ => OperationOutcome::updated(namespace),
        })
    }

    /// Looks up a namespace within its scope.
    pub fn get_namespace(
        &self,
        sub: &str,
        rg: &str,
        name: &str,
    ) -> Result<ControlPlaneResult<EventHubNamespace>, EmulatorError> {
        self.resource_groups.ensure_exists(sub, rg)?;
        let found = read_scoped(&self.storage, name, |ns: &EventHubNamespace| {
            ns.is_in_subscription(sub) && ns.is_in_resource_group(rg)
        })?;
        Ok(read_outcome(found, "namespace", name))
    }

    /// Deletes a namespace and every hub under it.
    pub fn delete_namespace(
        &self,
        sub: &str,
        rg: &str,
        name: &str,
    ) -> Result<ControlPlaneResult<EventHubNamespace>, EmulatorError> {
        self.resource_groups.ensure_exists(sub, rg)?;
        let _guard = self.storage.write_lock();
        let found = read_scoped(&self.storage, name, |ns: &EventHubNamespace| {
            ns.is_in_subscription(sub) && ns.is_in_resource_group(rg)
        })?;
        match found {
            Some(_) => {
                self.storage.delete(name)?;
                Ok(OperationOutcome::deleted())
            }
            None => Ok(OperationOutcome::not_found(format!(
                "namespace '{name}' does not exist"
            ))),
        }
    }

    /// Lists the namespaces of one resource group.
    pub fn list_namespaces(
        &self,
        sub: &str,
        rg: &str,
    ) -> Result<Vec<EventHubNamespace>, EmulatorError> {
        self.resource_groups.ensure_exists(sub, rg)?;
        self.storage
            .list()?
            .into_iter()
            // list() walks subresources too; keep only namespace docs.
            .filter_map(|doc| serde_json::from_value::<GenericResource>(doc).ok())
            .filter(|ns| {
                ns.resource_type == format!("{PROVIDER_NAMESPACE}/namespaces")
                    && ns.is_in_subscription(sub)
                    && ns.is_in_resource_group(rg)
            })
            .map(|ns| {
                // A document that claims the namespace type but does
                // not parse as one is corrupt, not skippable.
                ns.into_typed()
                    .map_err(|e| EmulatorError::StorageCorruption {
                        message: e.to_string(),
                    })
            })
            .collect()
    }

    fn ensure_namespace(&self, sub: &str, rg: &str, name: &str) -> Result<(), EmulatorError> {
        self.resource_groups.ensure_exists(sub, rg)?;
        let found = read_scoped(&self.storage, name, |ns: &EventHubNamespace| {
            ns.is_in_subscription(sub) && ns.is_in_resource_group(rg)
        })?;
        ensure_scope(found.is_some(), "namespace", name)
    }

    /// `createOrUpdate` for an event hub under a namespace.
    pub fn create_or_update_event_hub(
        &self,
        sub: &str,
        rg: &str,
        namespace: &str,
        name: &str,
        request: EventHubRequest,
    ) -> Result<ControlPlaneResult<EventHub>, EmulatorError> {
        self.ensure_namespace(sub, rg, namespace)?;

        let (result, hub) = upsert_subresource(
            &self.storage,
            namespace,
            SUBRESOURCE_EVENT_HUBS,
            name,
            || {
                let id = ResourceId::regional(sub, rg, PROVIDER_NAMESPACE, "namespaces", namespace)
                    .subresource(SUBRESOURCE_EVENT_HUBS, name);
                ArmSubresource::new(
                    id,
                    EventHubProperties {
                        partition_count: request.properties.partition_count.unwrap_or(4),
                        message_retention_in_days: request
                            .properties
                            .message_retention_in_days
                            .unwrap_or(7),
                        status: "Active".to_owned(),
                        created_on: Utc::now(),
                    },
                )
            },
        )?;
        Ok(match result {
            OperationResult::Created => OperationOutcome::created(hub),
            _ => OperationOutcome::updated(hub),
        })
    }

    /// Looks up one event hub.
    pub fn get_event_hub(
        &self,
        sub: &str,
        rg: &str,
        namespace: &str,
        name: &str,
    ) -> Result<ControlPlaneResult<EventHub>, EmulatorError> {
        self.ensure_namespace(sub, rg, namespace)?;
        let found = self
            .storage
            .get_subresource_typed::<EventHub>(namespace, SUBRESOURCE_EVENT_HUBS, name)?;
        Ok(read_outcome(found, "event hub", name))
    }

    /// Deletes one event hub.
    pub fn delete_event_hub(
        &self,
        sub: &str,
        rg: &str,
        namespace: &str,
        name: &str,
    ) -> Result<ControlPlaneResult<EventHub>, EmulatorError> {
        self.ensure_namespace(sub, rg, namespace)?;
        let _guard = self.storage.write_lock();
        let found = self
            .storage
            .get_subresource_typed::<EventHub>(namespace, SUBRESOURCE_EVENT_HUBS, name)?;
        match found {
            Some(_) => {
                self.storage
                    .delete_subresource(namespace, SUBRESOURCE_EVENT_HUBS, name)?;
                Ok(OperationOutcome::deleted())
            }
            None => Ok(OperationOutcome::not_found(format!(
                "event hub '{name}' does not exist"
            ))),
        }
    }

    /// Lists the hubs of one namespace.
    pub fn list_event_hubs(
        &self,
        sub: &str,
        rg: &str,
        namespace: &str,
    ) -> Result<Vec<EventHub>, EmulatorError> {
        self.ensure_namespace(sub, rg, namespace)?;
        self.storage
            .list_subresources(namespace, SUBRESOURCE_EVENT_HUBS)?
            .into_iter()
            .map(|doc| {
                serde_json::from_value(doc).map_err(|e| EmulatorError::StorageCorruption {
                    message: format!("stored event hub does not parse: {e}"),
                })
            })
            .collect()
    }

    pub(crate) fn storage(&self) -> Arc<ServiceStorage> {
        Arc::clone(&self.storage)
    }
}

fn scope(req: &ServiceRequest) -> Result<(&str, &str), EmulatorError> {
    Ok((
        req.param("subscriptionId")?,
        req.param("resourceGroupName")?,
    ))
}

/// Builds the service definition.
#[allow(clippy::too_many_lines)]
pub fn service(
    plane: &Arc<EventHubControlPlane>,
    bind: BindPoint,
) -> Result<ServiceDefinition, TemplateError> {
    const NS: &str = "/subscriptions/{subscriptionId}/resourceGroups/{resourceGroupName}\
                      /providers/Microsoft.EventHub/namespaces/{namespaceName}";
    const HUB: &str = "/subscriptions/{subscriptionId}/resourceGroups/{resourceGroupName}\
                      /providers/Microsoft.EventHub/namespaces/{namespaceName}\
                      /eventhubs/{eventHubName}";

    let ns_put = Arc::clone(plane);
    let ns_get = Arc::clone(plane);
    let ns_delete = Arc::clone(plane);
    let ns_list = Arc::clone(plane);
    let hub_put = Arc::clone(plane);
    let hub_get = Arc::clone(plane);
    let hub_delete = Arc::clone(plane);
    let hub_list = Arc::clone(plane);

    let endpoints = vec![
        EndpointDefinition::new(
            bind,
            &[&format!("PUT {NS}")],
            Arc::new(move |req: &ServiceRequest| {
                let (sub, rg) = scope(req)?;
                let name = req.param("namespaceName")?;
                let outcome = ns_put.create_or_update_namespace(sub, rg, name, req.json()?)?;
                ServiceResponse::from_outcome(&outcome)
            }),
        )?,
        EndpointDefinition::new(
            bind,
            &[&format!("GET {NS}")],
            Arc::new(move |req: &ServiceRequest| {
                let (sub, rg) = scope(req)?;
                let outcome = ns_get.get_namespace(sub, rg, req.param("namespaceName")?)?;
                ServiceResponse::from_outcome(&outcome)
            }),
        )?,
        EndpointDefinition::new(
            bind,
            &[&format!("DELETE {NS}")],
            Arc::new(move |req: &ServiceRequest| {
                let (sub, rg) = scope(req)?;
                let outcome = ns_delete.delete_namespace(sub, rg, req.param("namespaceName")?)?;
                ServiceResponse::from_outcome(&outcome)
            }),
        )?,
        EndpointDefinition::new(
            bind,
            &["GET /subscriptions/{subscriptionId}/resourceGroups/{resourceGroupName}\
               /providers/Microsoft.EventHub/namespaces"],
            Arc::new(move |req: &ServiceRequest| {
                let (sub, rg) = scope(req)?;
                let namespaces: ResourceCollection<_> =
                    ns_list.list_namespaces(sub, rg)?.into_iter().collect();
                ServiceResponse::json(StatusCode::OK, &namespaces)
            }),
        )?,
        EndpointDefinition::new(
            bind,
            &[&format!("PUT {HUB}")],
            Arc::new(move |req: &ServiceRequest| {
                let (sub, rg) = scope(req)?;
                let namespace = req.param("namespaceName")?;
                let name = req.param("eventHubName")?;
                let request: EventHubRequest = if req.body.is_empty() {
                    EventHubRequest::default()
                } else {
                    req.json()?
                };
                let outcome =
                    hub_put.create_or_update_event_hub(sub, rg, namespace, name, request)?;
                ServiceResponse::from_outcome(&outcome)
            }),
        )?,
        EndpointDefinition::new(
            bind,
            &[&format!("GET {HUB}")],
            Arc::new(move |req: &ServiceRequest| {
                let (sub, rg) = scope(req)?;
                let namespace = req.param("namespaceName")?;
                let outcome =
                    hub_get.get_event_hub(sub, rg, namespace, req.param("eventHubName")?)?;
                ServiceResponse::from_outcome(&outcome)
            }),
        )?,
        EndpointDefinition::new(
            bind,
            &[&format!("DELETE {HUB}")],
            Arc::new(move |req: &ServiceRequest| {
                let (sub, rg) = scope(req)?;
                let namespace = req.param("namespaceName")?;
                let outcome =
                    hub_delete.delete_event_hub(sub, rg, namespace, req.param("eventHubName")?)?;
                ServiceResponse::from_outcome(&outcome)
            }),
        )?,
        EndpointDefinition::new(
            bind,
            &["GET /subscriptions/{subscriptionId}/resourceGroups/{resourceGroupName}\
               /providers/Microsoft.EventHub/namespaces/{namespaceName}/eventhubs"],
            Arc::new(move |req: &ServiceRequest| {
                let (sub, rg) = scope(req)?;
                let hubs: ResourceCollection<_> = hub_list
                    .list_event_hubs(sub, rg, req.param("namespaceName")?)?
                    .into_iter()
                    .collect();
                ServiceResponse::json(StatusCode::OK, &hubs)
            }),
        )?,
    ];

    Ok(ServiceDefinition {
        name: "event-hub".to_owned(),
        storage: plane.storage(),
        endpoints,
        bootstrap: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource_groups::ResourceGroupRequest;
    use crate::subscriptions::SubscriptionControlPlane;
    use tempfile::TempDir;

    fn plane(dir: &TempDir) -> EventHubControlPlane {
        let ctx = ServiceContext {
            storage_root: dir.path().to_path_buf(),
            control_plane_bind: BindPoint::http(8080),
        };
        let subscriptions = Arc::new(SubscriptionControlPlane::new(&ctx));
        subscriptions.storage().ensure_root().unwrap();
        subscriptions.create_or_update("sub-one", "Team One").unwrap();
        let groups = Arc::new(ResourceGroupControlPlane::new(&ctx, subscriptions));
        groups.storage().ensure_root().unwrap();
        groups
            .create_or_update(
                "sub-one",
                "rg1",
                ResourceGroupRequest {
                    location: "westeurope".to_owned(),
                    tags: std::collections::BTreeMap::new(),
                },
            )
            .unwrap();
        let plane = EventHubControlPlane::new(&ctx, groups);
        plane.storage.ensure_root().unwrap();
        plane
    }

    fn namespace_request() -> NamespaceRequest {
        NamespaceRequest {
            location: "westeurope".to_owned(),
            sku: None,
            tags: BTreeMap::new(),
        }
    }

    #[test]
    fn test_namespace_requires_resource_group() {
        let dir = TempDir::new().unwrap();
        let plane = plane(&dir);

        let err = plane
            .create_or_update_namespace("sub-one", "absent", "ns1", namespace_request())
            .unwrap_err();
        assert!(matches!(err, EmulatorError::NotFound { .. }));
    }

    #[test]
    fn test_namespace_lifecycle() {
        let dir = TempDir::new().unwrap();
        let plane = plane(&dir);

        let outcome = plane
            .create_or_update_namespace("sub-one", "rg1", "ns1", namespace_request())
            .unwrap();
        assert_eq!(outcome.result, OperationResult::Created);
        let namespace = outcome.resource.unwrap();
        assert_eq!(namespace.resource_type, "Microsoft.EventHub/namespaces");
        assert_eq!(
            namespace.id.as_str(),
            "/subscriptions/sub-one/resourceGroups/rg1/providers/Microsoft.EventHub/namespaces/ns1"
        );

        let fetched = plane.get_namespace("sub-one", "rg1", "ns1").unwrap();
        assert_eq!(fetched.result, OperationResult::Success);

        let deleted = plane.delete_namespace("sub-one", "rg1", "ns1").unwrap();
        assert_eq!(deleted.result, OperationResult::Deleted);
        let gone = plane.get_namespace("sub-one", "rg1", "ns1").unwrap();
        assert_eq!(gone.result, OperationResult::NotFound);
    }

    #[test]
    fn test_event_hub_requires_namespace() {
        let dir = TempDir::new().unwrap();
        let plane = plane(&dir);

        let err = plane
            .create_or_update_event_hub("sub-one", "rg1", "ns1", "hub1", EventHubRequest::default())
            .unwrap_err();
        assert!(matches!(err, EmulatorError::NotFound { .. }));
    }

    #[test]
    fn test_event_hub_lifecycle_under_namespace() {
        let dir = TempDir::new().unwrap();
        let plane = plane(&dir);
        plane
            .create_or_update_namespace("sub-one", "rg1", "ns1", namespace_request())
            .unwrap();

        let outcome = plane
            .create_or_update_event_hub("sub-one", "rg1", "ns1", "hub1", EventHubRequest::default())
            .unwrap();
        assert_eq!(outcome.result, OperationResult::Created);
        let hub = outcome.resource.unwrap();
        assert_eq!(hub.properties.partition_count, 4);
        assert!(hub.id.as_str().ends_with("/namespaces/ns1/eventhubs/hub1"));

        let listed = plane.list_event_hubs("sub-one", "rg1", "ns1").unwrap();
        assert_eq!(listed.len(), 1);

        let deleted = plane
            .delete_event_hub("sub-one", "rg1", "ns1", "hub1")
            .unwrap();
        assert_eq!(deleted.result, OperationResult::Deleted);
    }

    #[test]
    fn test_namespace_unreachable_once_resource_group_is_gone() {
        let dir = TempDir::new().unwrap();
        let plane = plane(&dir);
        plane
            .create_or_update_namespace("sub-one", "rg1", "ns1", namespace_request())
            .unwrap();

        plane.resource_groups.delete("sub-one", "rg1").unwrap();

        let err = plane.get_namespace("sub-one", "rg1", "ns1").unwrap_err();
        assert!(matches!(err, EmulatorError::NotFound { .. }));
        let err = plane.delete_namespace("sub-one", "rg1", "ns1").unwrap_err();
        assert!(matches!(err, EmulatorError::NotFound { .. }));
    }

    #[test]
    fn test_namespace_list_excludes_hub_documents() {
        let dir = TempDir::new().unwrap();
        let plane = plane(&dir);
        plane
            .create_or_update_namespace("sub-one", "rg1", "ns1", namespace_request())
            .unwrap();
        plane
            .create_or_update_event_hub("sub-one", "rg1", "ns1", "hub1", EventHubRequest::default())
            .unwrap();

        let namespaces = plane.list_namespaces("sub-one", "rg1").unwrap();
        assert_eq!(namespaces.len(), 1);
        assert_eq!(namespaces[0].name, "ns1");
    }

    #[test]
    fn test_list_reports_mistyped_namespace_documents() {
        let dir = TempDir::new().unwrap();
        let plane = plane(&dir);

        // Claims the namespace type but lacks the namespace properties.
        plane
            .storage
            .create_or_update(
                "bad",
                &serde_json::json!({
                    "id": "/subscriptions/sub-one/resourceGroups/rg1\
                           /providers/Microsoft.EventHub/namespaces/bad",
                    "name": "bad",
                    "type": "Microsoft.EventHub/namespaces",
                    "location": "westeurope",
                    "properties": {}
                }),
            )
            .unwrap();

        let err = plane.list_namespaces("sub-one", "rg1").unwrap_err();
        assert!(matches!(err, EmulatorError::StorageCorruption { .. }));
    }
}
