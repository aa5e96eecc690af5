//! The Service Bus service: `Microsoft.ServiceBus/namespaces` and the
//! `queues` subresources under them.
//!
//! The route shapes are structurally identical to the Event Hub ones
//! up to the provider-namespace literal; the router keeps the two
//! services apart on that literal alone.

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
use nimbus_resource::{ArmResource, ArmSubresource, ResourceId, Sku};
use nimbus_router::{BindPoint, TemplateError};
use nimbus_store::ServiceStorage;

use crate::resource_groups::ResourceGroupControlPlane;

/// Provider namespace for all Service Bus resource types.
pub const PROVIDER_NAMESPACE: &str = "Microsoft.ServiceBus";
/// Declared subresource type for queues under a namespace.
pub const SUBRESOURCE_QUEUES: &str = "queues";

const STORAGE_DIR: &str = "servicebus";

/// Namespace properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceProperties {
    /// Always `Succeeded`.
    pub provisioning_state: String,
    /// Creation timestamp.
    pub created_on: DateTime<Utc>,
}

/// A stored Service Bus namespace.
pub type ServiceBusNamespace = ArmResource<NamespaceProperties>;

/// Properties of one queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueProperties {
    /// Queue quota; 1024 MB when the request omits it.
    pub max_size_in_megabytes: u32,
    /// Session support flag.
    pub requires_session: bool,
    /// Always `Active`.
    pub status: String,
    /// Creation timestamp.
    pub created_on: DateTime<Utc>,
}

/// A stored queue.
pub type Queue = ArmSubresource<QueueProperties>;

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

/// Caller-settable properties of a queue `createOrUpdate`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueRequestProperties {
    /// Queue quota.
    #[serde(default)]
    pub max_size_in_megabytes: Option<u32>,
    /// Session support flag.
    #[serde(default)]
    pub requires_session: Option<bool>,
}

/// Body of a queue `createOrUpdate` request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueRequest {
    /// Optional properties block.
    #[serde(default)]
    pub properties: QueueRequestProperties,
}

/// Control plane for Service Bus namespaces and queues.
#[derive(Debug)]
pub struct ServiceBusControlPlane {
    storage: Arc<ServiceStorage>,
    resource_groups: Arc<ResourceGroupControlPlane>,
}

impl ServiceBusControlPlane {
    /// Wires the plane against the context's storage root.
    #[must_use]
    pub fn new(ctx: &ServiceContext, resource_groups: Arc<ResourceGroupControlPlane>) -> Self {
        Self {
            storage: Arc::new(ServiceStorage::new(
                &ctx.storage_root,
                STORAGE_DIR,
                [SUBRESOURCE_QUEUES],
            )),
            resource_groups,
        }
    }

    /// `createOrUpdate` for a namespace.
    pub fn create_or_update_namespace(
        &self,
        sub: &str,
        rg: &str,
        name: &str,
        request: NamespaceRequest,
    ) -> Result<ControlPlaneResult<ServiceBusNamespace>, EmulatorError> {
        self.resource_groups.ensure_exists(sub, rg)?;
        if request.location.trim().is_empty() {
            return Err(EmulatorError::validation("namespace location must not be empty"));
        }

        let (result, namespace) = upsert_scoped(
            &self.storage,
            name,
            |ns: &ServiceBusNamespace| ns.is_in_subscription(sub) && ns.is_in_resource_group(rg),
            || {
                let id = ResourceId::regional(sub, rg, PROVIDER_NAMESPACE, "namespaces", name);
                let mut namespace = ArmResource::new(
                    id,
                    request.location.clone(),
                    NamespaceProperties {
                        provisioning_state: "Succeeded".to_owned(),
                        created_on: Utc::now(),
                    },
                )
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
    ) -> Result<ControlPlaneResult<ServiceBusNamespace>, EmulatorError> {
        self.resource_groups.ensure_exists(sub, rg)?;
        let found = read_scoped(&self.storage, name, |ns: &ServiceBusNamespace| {
            ns.is_in_subscription(sub) && ns.is_in_resource_group(rg)
        })?;
        Ok(read_outcome(found, "namespace", name))
    }

    /// Deletes a namespace and every queue under it.
    pub fn delete_namespace(
        &self,
        sub: &str,
        rg: &str,
        name: &str,
    ) -> Result<ControlPlaneResult<ServiceBusNamespace>, EmulatorError> {
        self.resource_groups.ensure_exists(sub, rg)?;
        let _guard = self.storage.write_lock();
        let found = read_scoped(&self.storage, name, |ns: &ServiceBusNamespace| {
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

    fn ensure_namespace(&self, sub: &str, rg: &str, name: &str) -> Result<(), EmulatorError> {
        self.resource_groups.ensure_exists(sub, rg)?;
        let found = read_scoped(&self.storage, name, |ns: &ServiceBusNamespace| {
            ns.is_in_subscription(sub) && ns.is_in_resource_group(rg)
        })?;
        ensure_scope(found.is_some(), "namespace", name)
    }

    /// `createOrUpdate` for a queue under a namespace.
    pub fn create_or_update_queue(
        &self,
        sub: &str,
        rg: &str,
        namespace: &str,
        name: &str,
        request: QueueRequest,
    ) -> Result<ControlPlaneResult<Queue>, EmulatorError> {
        self.ensure_namespace(sub, rg, namespace)?;

        let (result, queue) =
            upsert_subresource(&self.storage, namespace, SUBRESOURCE_QUEUES, name, || {
                let id = ResourceId::regional(sub, rg, PROVIDER_NAMESPACE, "namespaces", namespace)
                    .subresource(SUBRESOURCE_QUEUES, name);
                ArmSubresource::new(
                    id,
                    QueueProperties {
                        max_size_in_megabytes: request
                            .properties
                            .max_size_in_megabytes
                            .unwrap_or(1024),
                        requires_session: request.properties.requires_session.unwrap_or(false),
                        status: "Active".to_owned(),
                        created_on: Utc::now(),
                    },
                )
            })?;
        Ok(match result {
            OperationResult::Created => OperationOutcome::created(queue),
            _ => OperationOutcome::updated(queue),
        })
    }

    /// Looks up one queue.
    pub fn get_queue(
        &self,
        sub: &str,
        rg: &str,
        namespace: &str,
        name: &str,
    ) -> Result<ControlPlaneResult<Queue>, EmulatorError> {
        self.ensure_namespace(sub, rg, namespace)?;
        let found = self
            .storage
            .get_subresource_typed::<Queue>(namespace, SUBRESOURCE_QUEUES, name)?;
        Ok(read_outcome(found, "queue", name))
    }

    /// Deletes one queue.
    pub fn delete_queue(
        &self,
        sub: &str,
        rg: &str,
        namespace: &str,
        name: &str,
    ) -> Result<ControlPlaneResult<Queue>, EmulatorError> {
        self.ensure_namespace(sub, rg, namespace)?;
        let _guard = self.storage.write_lock();
        let found = self
            .storage
            .get_subresource_typed::<Queue>(namespace, SUBRESOURCE_QUEUES, name)?;
        match found {
            Some(_) => {
                self.storage
                    .delete_subresource(namespace, SUBRESOURCE_QUEUES, name)?;
                Ok(OperationOutcome::deleted())
            }
            None => Ok(OperationOutcome::not_found(format!(
                "queue '{name}' does not exist"
            ))),
        }
    }

    /// Lists the queues of one namespace.
    pub fn list_queues(
        &self,
        sub: &str,
        rg: &str,
        namespace: &str,
    ) -> Result<Vec<Queue>, EmulatorError> {
        self.ensure_namespace(sub, rg, namespace)?;
        self.storage
            .list_subresources(namespace, SUBRESOURCE_QUEUES)?
            .into_iter()
            .map(|doc| {
                serde_json::from_value(doc).map_err(|e| EmulatorError::StorageCorruption {
                    message: format!("stored queue does not parse: {e}"),
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
    plane: &Arc<ServiceBusControlPlane>,
    bind: BindPoint,
) -> Result<ServiceDefinition, TemplateError> {
    const NS: &str = "/subscriptions/{subscriptionId}/resourceGroups/{resourceGroupName}\
                      /providers/Microsoft.ServiceBus/namespaces/{namespaceName}";
    const QUEUE: &str = "/subscriptions/{subscriptionId}/resourceGroups/{resourceGroupName}\
                      /providers/Microsoft.ServiceBus/namespaces/{namespaceName}\
                      /queues/{queueName}";

    let ns_put = Arc::clone(plane);
    let ns_get = Arc::clone(plane);
    let ns_delete = Arc::clone(plane);
    let queue_put = Arc::clone(plane);
    let queue_get = Arc::clone(plane);
    let queue_delete = Arc::clone(plane);
    let queue_list = Arc::clone(plane);

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
            &[&format!("PUT {QUEUE}")],
            Arc::new(move |req: &ServiceRequest| {
                let (sub, rg) = scope(req)?;
                let namespace = req.param("namespaceName")?;
                let name = req.param("queueName")?;
                let request: QueueRequest = if req.body.is_empty() {
                    QueueRequest::default()
                } else {
                    req.json()?
                };
                let outcome = queue_put.create_or_update_queue(sub, rg, namespace, name, request)?;
                ServiceResponse::from_outcome(&outcome)
            }),
        )?,
        EndpointDefinition::new(
            bind,
            &[&format!("GET {QUEUE}")],
            Arc::new(move |req: &ServiceRequest| {
                let (sub, rg) = scope(req)?;
                let namespace = req.param("namespaceName")?;
                let outcome = queue_get.get_queue(sub, rg, namespace, req.param("queueName")?)?;
                ServiceResponse::from_outcome(&outcome)
            }),
        )?,
        EndpointDefinition::new(
            bind,
            &[&format!("DELETE {QUEUE}")],
            Arc::new(move |req: &ServiceRequest| {
                let (sub, rg) = scope(req)?;
                let namespace = req.param("namespaceName")?;
                let outcome =
                    queue_delete.delete_queue(sub, rg, namespace, req.param("queueName")?)?;
                // Queue deletion renders 204 whether or not the queue
                // was there.
                ServiceResponse::from_outcome_with(&outcome, |result| match result {
                    OperationResult::Deleted | OperationResult::NotFound => {
                        StatusCode::NO_CONTENT
                    }
                    other => other.http_status(),
                })
            }),
        )?,
        EndpointDefinition::new(
            bind,
            &["GET /subscriptions/{subscriptionId}/resourceGroups/{resourceGroupName}\
               /providers/Microsoft.ServiceBus/namespaces/{namespaceName}/queues"],
            Arc::new(move |req: &ServiceRequest| {
                let (sub, rg) = scope(req)?;
                let queues: ResourceCollection<_> = queue_list
                    .list_queues(sub, rg, req.param("namespaceName")?)?
                    .into_iter()
                    .collect();
                ServiceResponse::json(StatusCode::OK, &queues)
            }),
        )?,
    ];

    Ok(ServiceDefinition {
        name: "service-bus".to_owned(),
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

    fn plane(dir: &TempDir) -> ServiceBusControlPlane {
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
                    tags: BTreeMap::new(),
                },
            )
            .unwrap();
        let plane = ServiceBusControlPlane::new(&ctx, groups);
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
    fn test_queue_lifecycle() {
        let dir = TempDir::new().unwrap();
        let plane = plane(&dir);
        plane
            .create_or_update_namespace("sub-one", "rg1", "ns1", namespace_request())
            .unwrap();

        let request = QueueRequest {
            properties: QueueRequestProperties {
                max_size_in_megabytes: Some(2048),
                requires_session: Some(true),
            },
        };
        let outcome = plane
            .create_or_update_queue("sub-one", "rg1", "ns1", "q1", request)
            .unwrap();
        assert_eq!(outcome.result, OperationResult::Created);
        let queue = outcome.resource.unwrap();
        assert_eq!(queue.properties.max_size_in_megabytes, 2048);
        assert!(queue.properties.requires_session);
        assert!(queue.id.as_str().ends_with("/namespaces/ns1/queues/q1"));

        let fetched = plane.get_queue("sub-one", "rg1", "ns1", "q1").unwrap();
        assert_eq!(fetched.result, OperationResult::Success);

        let deleted = plane.delete_queue("sub-one", "rg1", "ns1", "q1").unwrap();
        assert_eq!(deleted.result, OperationResult::Deleted);
        let again = plane.delete_queue("sub-one", "rg1", "ns1", "q1").unwrap();
        assert_eq!(again.result, OperationResult::NotFound);
    }

    #[test]
    fn test_queue_requires_namespace_in_same_scope() {
        let dir = TempDir::new().unwrap();
        let plane = plane(&dir);
        plane
            .create_or_update_namespace("sub-one", "rg1", "ns1", namespace_request())
            .unwrap();

        // The namespace name exists, but not under this subscription.
        let err = plane
            .get_queue("sub-other", "rg1", "ns1", "q1")
            .unwrap_err();
        assert!(matches!(err, EmulatorError::NotFound { .. }));
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
    fn test_namespace_type_string() {
        let dir = TempDir::new().unwrap();
        let plane = plane(&dir);

        let outcome = plane
            .create_or_update_namespace("sub-one", "rg1", "ns1", namespace_request())
            .unwrap();
        let namespace = outcome.resource.unwrap();
        assert_eq!(namespace.resource_type, "Microsoft.ServiceBus/namespaces");
    }
}
