//! The subscriptions service.
//!
//! Subscriptions are the root of the resource hierarchy. The emulator
//! seeds one well-known subscription at bootstrap so clients work out
//! of the box with their default credentials; additional subscriptions
//! can be created through the control plane for multi-tenant test
//! setups.

use std::sync::Arc;

use http::StatusCode;
use serde::{Deserialize, Serialize};

use nimbus_core::control::{ensure_scope, read_outcome, upsert};
use nimbus_core::{
    ControlPlaneResult, EmulatorError, EndpointDefinition, OperationOutcome, OperationResult,
    ResourceCollection, ServiceContext, ServiceDefinition, ServiceRequest, ServiceResponse,
};
use nimbus_resource::ResourceId;
use nimbus_router::{BindPoint, TemplateError};
use nimbus_store::ServiceStorage;

/// The subscription every fresh emulator instance starts with.
pub const DEFAULT_SUBSCRIPTION_ID: &str = "00000000-0000-0000-0000-000000000000";

const STORAGE_DIR: &str = "subscriptions";

/// A subscription document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Fully qualified id, `/subscriptions/{id}`.
    pub id: ResourceId,
    /// The bare subscription id segment.
    pub subscription_id: String,
    /// Human-readable name shown by CLI tooling.
    pub display_name: String,
    /// Lifecycle state; the emulator only ever reports `Enabled`.
    pub state: String,
}

impl Subscription {
    /// Builds an enabled subscription document.
    #[must_use]
    pub fn new(subscription_id: &str, display_name: &str) -> Self {
        Self {
            id: ResourceId::subscription_id(subscription_id),
            subscription_id: subscription_id.to_owned(),
            display_name: display_name.to_owned(),
            state: "Enabled".to_owned(),
        }
    }
}

/// Control plane for subscription documents.
#[derive(Debug)]
pub struct SubscriptionControlPlane {
    storage: Arc<ServiceStorage>,
}

impl SubscriptionControlPlane {
    /// Wires the plane against the context's storage root.
    #[must_use]
    pub fn new(ctx: &ServiceContext) -> Self {
        Self {
            storage: Arc::new(ServiceStorage::new(
                &ctx.storage_root,
                STORAGE_DIR,
                Vec::<String>::new(),
            )),
        }
    }

    /// Registers a subscription. An existing document is returned
    /// unchanged.
    pub fn create_or_update(
        &self,
        subscription_id: &str,
        display_name: &str,
    ) -> Result<ControlPlaneResult<Subscription>, EmulatorError> {
        let (result, subscription) = upsert(&self.storage, subscription_id, || {
            Subscription::new(subscription_id, display_name)
        })?;
        Ok(match result {
            OperationResult::Created => OperationOutcome::created(subscription),
            _ => OperationOutcome::updated(subscription),
        })
    }

    /// Looks up one subscription.
    pub fn get(
        &self,
        subscription_id: &str,
    ) -> Result<ControlPlaneResult<Subscription>, EmulatorError> {
        let found = self.storage.get_typed::<Subscription>(subscription_id)?;
        Ok(read_outcome(found, "subscription", subscription_id))
    }

    /// Lists every registered subscription.
    pub fn list(&self) -> Result<Vec<Subscription>, EmulatorError> {
        self.storage
            .list()?
            .into_iter()
            .map(|doc| {
                serde_json::from_value(doc).map_err(|e| EmulatorError::StorageCorruption {
                    message: format!("stored subscription does not parse: {e}"),
                })
            })
            .collect()
    }

    /// Whether a subscription exists.
    pub fn exists(&self, subscription_id: &str) -> Result<bool, EmulatorError> {
        Ok(self.storage.get(subscription_id)?.is_some())
    }

    /// Ancestor check used by every subscription-scoped service.
    pub fn ensure_exists(&self, subscription_id: &str) -> Result<(), EmulatorError> {
        ensure_scope(self.exists(subscription_id)?, "subscription", subscription_id)
    }

    pub(crate) fn storage(&self) -> Arc<ServiceStorage> {
        Arc::clone(&self.storage)
    }
}

/// Builds the service definition, including the bootstrap hook that
/// seeds [`DEFAULT_SUBSCRIPTION_ID`].
pub fn service(
    plane: &Arc<SubscriptionControlPlane>,
    bind: BindPoint,
) -> Result<ServiceDefinition, TemplateError> {
    let get_plane = Arc::clone(plane);
    let list_plane = Arc::clone(plane);

    let endpoints = vec![
        EndpointDefinition::new(
            bind,
            &["GET /subscriptions/{subscriptionId}"],
            Arc::new(move |req: &ServiceRequest| {
                let outcome = get_plane.get(req.param("subscriptionId")?)?;
                ServiceResponse::from_outcome(&outcome)
            }),
        )?,
        EndpointDefinition::new(
            bind,
            &["GET /subscriptions"],
            Arc::new(move |_req: &ServiceRequest| {
                let subscriptions: ResourceCollection<_> = list_plane.list()?.into_iter().collect();
                ServiceResponse::json(StatusCode::OK, &subscriptions)
            }),
        )?,
    ];

    Ok(ServiceDefinition {
        name: "subscriptions".to_owned(),
        storage: plane.storage(),
        endpoints,
        bootstrap: Some(Box::new(|storage| {
            if storage.get(DEFAULT_SUBSCRIPTION_ID)?.is_none() {
                let seeded = Subscription::new(DEFAULT_SUBSCRIPTION_ID, "Default Subscription");
                storage.create(DEFAULT_SUBSCRIPTION_ID, &seeded)?;
                tracing::info!(subscription = DEFAULT_SUBSCRIPTION_ID, "seeded default subscription");
            }
            Ok(())
        })),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn plane(dir: &TempDir) -> SubscriptionControlPlane {
        let ctx = ServiceContext {
            storage_root: dir.path().to_path_buf(),
            control_plane_bind: BindPoint::http(8080),
        };
        let plane = SubscriptionControlPlane::new(&ctx);
        plane.storage.ensure_root().unwrap();
        plane
    }

    #[test]
    fn test_create_get_list() {
        let dir = TempDir::new().unwrap();
        let plane = plane(&dir);

        let outcome = plane.create_or_update("sub-one", "Team One").unwrap();
        assert_eq!(outcome.result, OperationResult::Created);

        let fetched = plane.get("sub-one").unwrap();
        assert_eq!(fetched.result, OperationResult::Success);
        let subscription = fetched.resource.unwrap();
        assert_eq!(subscription.id.as_str(), "/subscriptions/sub-one");
        assert_eq!(subscription.state, "Enabled");

        plane.create_or_update("sub-two", "Team Two").unwrap();
        assert_eq!(plane.list().unwrap().len(), 2);
    }

    #[test]
    fn test_get_missing_is_not_found_outcome() {
        let dir = TempDir::new().unwrap();
        let plane = plane(&dir);

        let outcome = plane.get("nope").unwrap();
        assert_eq!(outcome.result, OperationResult::NotFound);
        assert!(outcome.resource.is_none());
    }

    #[test]
    fn test_ensure_exists() {
        let dir = TempDir::new().unwrap();
        let plane = plane(&dir);
        plane.create_or_update("sub-one", "Team One").unwrap();

        assert!(plane.ensure_exists("sub-one").is_ok());
        let err = plane.ensure_exists("sub-two").unwrap_err();
        assert!(matches!(err, EmulatorError::NotFound { .. }));
    }

    #[test]
    fn test_bootstrap_seeds_default_subscription() {
        let dir = TempDir::new().unwrap();
        let plane = Arc::new(plane(&dir));

        let definition = service(&plane, BindPoint::http(8080)).unwrap();
        let hook = definition.bootstrap.as_ref().unwrap();
        hook(&definition.storage).unwrap();
        // Re-running the hook must not fail on the existing document.
        hook(&definition.storage).unwrap();

        let outcome = plane.get(DEFAULT_SUBSCRIPTION_ID).unwrap();
        assert_eq!(outcome.result, OperationResult::Success);
    }
}
