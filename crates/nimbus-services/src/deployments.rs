//! The deployments service, `Microsoft.Resources/deployments`.
//!
//! A deployment request carries an already-evaluated resource list;
//! the emulator does no template-expression evaluation. Each declared
//! resource is routed through a [`ResourceDispatcher`]: an explicit
//! table from fully qualified ARM type strings to typed creation
//! functions. Unknown types are rejected before any resource is
//! touched, so a failed lookup never leaves a half-applied deployment
//! behind. Re-running a deployment re-dispatches its resources; the
//! per-resource `createOrUpdate` semantics make that harmless.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use http::StatusCode;
use serde::{Deserialize, Serialize};

use nimbus_core::control::{read_outcome, read_scoped};
use nimbus_core::{
    ControlPlaneResult, EmulatorError, EndpointDefinition, OperationOutcome, OperationResult,
    ResourceCollection, ServiceContext, ServiceDefinition, ServiceRequest, ServiceResponse,
};
use nimbus_resource::{ArmResource, ResourceId, Sku};
use nimbus_router::{BindPoint, TemplateError};
use nimbus_store::ServiceStorage;

use crate::resource_groups::ResourceGroupControlPlane;

const STORAGE_DIR: &str = "deployments";

/// Deployment properties as stored and returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentProperties {
    /// Always `Succeeded`; a deployment either applies fully or the
    /// request fails.
    pub provisioning_state: String,
    /// Deployment mode from the request, `Incremental` by default.
    pub mode: String,
    /// Ids of the resources the deployment created or updated.
    pub output_resources: Vec<String>,
    /// When the deployment last ran.
    pub created_on: DateTime<Utc>,
}

/// A stored deployment.
pub type Deployment = ArmResource<DeploymentProperties>;

/// One resource declared by a deployment request. Names of nested
/// resources use the `parent/child` form.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclaredResource {
    /// Fully qualified type, e.g. `Microsoft.EventHub/namespaces`.
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Resource name, `parent/child` for nested types.
    pub name: String,
    /// Region label.
    #[serde(default)]
    pub location: Option<String>,
    /// Optional SKU.
    #[serde(default)]
    pub sku: Option<Sku>,
    /// Optional tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Type-specific properties, converted by the dispatch function.
    #[serde(default)]
    pub properties: serde_json::Value,
}

impl DeclaredResource {
    /// Converts the raw properties block into the target service's
    /// request-properties type. An absent block yields the default.
    pub fn typed_properties<T>(&self) -> Result<T, EmulatorError>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        if self.properties.is_null() {
            return Ok(T::default());
        }
        serde_json::from_value(self.properties.clone()).map_err(|e| {
            EmulatorError::validation(format!(
                "properties of '{}' do not match type '{}': {e}",
                self.name, self.resource_type
            ))
        })
    }
}

/// Properties block of a deployment request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRequestProperties {
    /// Deployment mode; only `Incremental` semantics are implemented.
    #[serde(default = "default_mode")]
    pub mode: String,
    /// The evaluated resource list.
    #[serde(default)]
    pub resources: Vec<DeclaredResource>,
}

fn default_mode() -> String {
    "Incremental".to_owned()
}

/// Body of a deployment `createOrUpdate` request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRequest {
    /// Region label; deployments usually omit it.
    #[serde(default)]
    pub location: Option<String>,
    /// The deployment content.
    pub properties: DeploymentRequestProperties,
}

/// The scope a deployment's resources are created in.
#[derive(Debug, Clone, Copy)]
pub struct DeploymentScope<'a> {
    /// Subscription segment of the request path.
    pub subscription: &'a str,
    /// Resource-group segment of the request path.
    pub resource_group: &'a str,
}

type DispatchFn = Box<
    dyn Fn(&DeploymentScope<'_>, &DeclaredResource) -> Result<ResourceId, EmulatorError>
        + Send
        + Sync,
>;

/// Maps fully qualified ARM type strings to the typed creation
/// functions of the registered services.
///
/// Type strings compare case-insensitively, as they do in the cloud.
/// The table is assembled once at wiring time; there is no runtime
/// discovery of handlers.
#[derive(Default)]
pub struct ResourceDispatcher {
    table: HashMap<String, DispatchFn>,
}

impl ResourceDispatcher {
    /// Registers the creation function for one resource type.
    pub fn register<F>(&mut self, resource_type: &str, dispatch: F)
    where
        F: Fn(&DeploymentScope<'_>, &DeclaredResource) -> Result<ResourceId, EmulatorError>
            + Send
            + Sync
            + 'static,
    {
        self.table
            .insert(resource_type.to_ascii_lowercase(), Box::new(dispatch));
    }

    /// Whether a type has a registered creation function.
    #[must_use]
    pub fn handles(&self, resource_type: &str) -> bool {
        self.table.contains_key(&resource_type.to_ascii_lowercase())
    }

    /// Creates or updates one declared resource, returning its id.
    pub fn dispatch(
        &self,
        scope: &DeploymentScope<'_>,
        declared: &DeclaredResource,
    ) -> Result<ResourceId, EmulatorError> {
        let Some(dispatch) = self.table.get(&declared.resource_type.to_ascii_lowercase()) else {
            return Err(EmulatorError::validation(format!(
                "no handler registered for resource type '{}'",
                declared.resource_type
            )));
        };
        dispatch(scope, declared)
    }
}

impl std::fmt::Debug for ResourceDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.table.keys().collect();
        types.sort();
        f.debug_struct("ResourceDispatcher")
            .field("types", &types)
            .finish()
    }
}

/// Splits a nested declared name into `(parent, child)`.
pub fn split_nested_name(name: &str) -> Result<(&str, &str), EmulatorError> {
    name.split_once('/').ok_or_else(|| {
        EmulatorError::validation(format!(
            "nested resource name '{name}' must have the form 'parent/child'"
        ))
    })
}

/// Control plane for deployments.
#[derive(Debug)]
pub struct DeploymentControlPlane {
    storage: Arc<ServiceStorage>,
    resource_groups: Arc<ResourceGroupControlPlane>,
    dispatcher: ResourceDispatcher,
}

impl DeploymentControlPlane {
    /// Wires the plane against the context's storage root.
    #[must_use]
    pub fn new(
        ctx: &ServiceContext,
        resource_groups: Arc<ResourceGroupControlPlane>,
        dispatcher: ResourceDispatcher,
    ) -> Self {
        Self {
            storage: Arc::new(ServiceStorage::new(
                &ctx.storage_root,
                STORAGE_DIR,
                Vec::<String>::new(),
            )),
            resource_groups,
            dispatcher,
        }
    }

    /// Runs a deployment: validates every declared type, creates the
    /// declared resources in order, then persists the deployment
    /// document. Re-running an existing deployment re-dispatches.
    pub fn create_or_update(
        &self,
        sub: &str,
        rg: &str,
        name: &str,
        request: &DeploymentRequest,
    ) -> Result<ControlPlaneResult<Deployment>, EmulatorError> {
        self.resource_groups.ensure_exists(sub, rg)?;

        for declared in &request.properties.resources {
            if !self.dispatcher.handles(&declared.resource_type) {
                return Ok(OperationOutcome::bad_request(format!(
                    "no handler registered for resource type '{}'",
                    declared.resource_type
                )));
            }
        }

        // The name check precedes dispatch: a Conflict response must
        // not leave declared resources already applied.
        let _guard = self.storage.write_lock();
        let result = match self.storage.get_typed::<Deployment>(name)? {
            Some(existing)
                if !(existing.is_in_subscription(sub) && existing.is_in_resource_group(rg)) =>
            {
                return Err(EmulatorError::conflict(format!(
                    "the name '{name}' is already taken in another scope"
                )));
            }
            Some(_) => OperationResult::Updated,
            None => OperationResult::Created,
        };

        let scope = DeploymentScope {
            subscription: sub,
            resource_group: rg,
        };
        let mut output_resources = Vec::with_capacity(request.properties.resources.len());
        for declared in &request.properties.resources {
            let id = self.dispatcher.dispatch(&scope, declared)?;
            tracing::info!(deployment = name, resource = %id, "applied declared resource");
            output_resources.push(id.as_str().to_owned());
        }

        let id = ResourceId::regional(sub, rg, "Microsoft.Resources", "deployments", name);
        let fresh = ArmResource::new(
            id,
            request.location.clone().unwrap_or_default(),
            DeploymentProperties {
                provisioning_state: "Succeeded".to_owned(),
                mode: request.properties.mode.clone(),
                output_resources,
                created_on: Utc::now(),
            },
        );
        self.storage.create_or_update(name, &fresh)?;
        Ok(match result {
            OperationResult::Created => OperationOutcome::created(fresh),
            _ => OperationOutcome::updated(fresh),
        })
    }

    /// Looks up a deployment. A document whose id belongs to another
    /// subscription or group is reported as absent.
    pub fn get(
        &self,
        sub: &str,
        rg: &str,
        name: &str,
    ) -> Result<ControlPlaneResult<Deployment>, EmulatorError> {
        self.resource_groups.ensure_exists(sub, rg)?;
        let found = read_scoped(&self.storage, name, |d: &Deployment| {
            d.is_in_subscription(sub) && d.is_in_resource_group(rg)
        })?;
        Ok(read_outcome(found, "deployment", name))
    }

    /// Deletes the deployment document. The resources it created are
    /// left in place.
    pub fn delete(
        &self,
        sub: &str,
        rg: &str,
        name: &str,
    ) -> Result<ControlPlaneResult<Deployment>, EmulatorError> {
        self.resource_groups.ensure_exists(sub, rg)?;
        let _guard = self.storage.write_lock();
        let found = read_scoped(&self.storage, name, |d: &Deployment| {
            d.is_in_subscription(sub) && d.is_in_resource_group(rg)
        })?;
        match found {
            Some(_) => {
                self.storage.delete(name)?;
                Ok(OperationOutcome::deleted())
            }
            None => Ok(OperationOutcome::not_found(format!(
                "deployment '{name}' does not exist"
            ))),
        }
    }

    /// Lists the deployments of one resource group.
    pub fn list(&self, sub: &str, rg: &str) -> Result<Vec<Deployment>, EmulatorError> {
        self.resource_groups.ensure_exists(sub, rg)?;
        let deployments = self
            .storage
            .list()?
            .into_iter()
            .map(|doc| {
                serde_json::from_value::<Deployment>(doc).map_err(|e| {
                    EmulatorError::StorageCorruption {
                        message: format!("stored deployment does not parse: {e}"),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(deployments
            .into_iter()
            .filter(|d| d.is_in_subscription(sub) && d.is_in_resource_group(rg))
            .collect())
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
pub fn service(
    plane: &Arc<DeploymentControlPlane>,
    bind: BindPoint,
) -> Result<ServiceDefinition, TemplateError> {
    const INSTANCE: &str = "/subscriptions/{subscriptionId}/resourceGroups/{resourceGroupName}\
                            /providers/Microsoft.Resources/deployments/{deploymentName}";

    let put_plane = Arc::clone(plane);
    let get_plane = Arc::clone(plane);
    let delete_plane = Arc::clone(plane);
    let list_plane = Arc::clone(plane);

    let endpoints = vec![
        EndpointDefinition::new(
            bind,
            &[&format!("PUT {INSTANCE}")],
            Arc::new(move |req: &ServiceRequest| {
                let (sub, rg) = scope(req)?;
                let name = req.param("deploymentName")?;
                let request: DeploymentRequest = req.json()?;
                let outcome = put_plane.create_or_update(sub, rg, name, &request)?;
                ServiceResponse::from_outcome(&outcome)
            }),
        )?,
        EndpointDefinition::new(
            bind,
            &[&format!("GET {INSTANCE}")],
            Arc::new(move |req: &ServiceRequest| {
                let (sub, rg) = scope(req)?;
                let outcome = get_plane.get(sub, rg, req.param("deploymentName")?)?;
                ServiceResponse::from_outcome(&outcome)
            }),
        )?,
        EndpointDefinition::new(
            bind,
            &[&format!("DELETE {INSTANCE}")],
            Arc::new(move |req: &ServiceRequest| {
                let (sub, rg) = scope(req)?;
                let outcome = delete_plane.delete(sub, rg, req.param("deploymentName")?)?;
                ServiceResponse::from_outcome(&outcome)
            }),
        )?,
        EndpointDefinition::new(
            bind,
            &["GET /subscriptions/{subscriptionId}/resourceGroups/{resourceGroupName}\
               /providers/Microsoft.Resources/deployments"],
            Arc::new(move |req: &ServiceRequest| {
                let (sub, rg) = scope(req)?;
                let deployments: ResourceCollection<_> =
                    list_plane.list(sub, rg)?.into_iter().collect();
                ServiceResponse::json(StatusCode::OK, &deployments)
            }),
        )?,
    ];

    Ok(ServiceDefinition {
        name: "deployments".to_owned(),
        storage: plane.storage(),
        endpoints,
        bootstrap: None,
    })
}
