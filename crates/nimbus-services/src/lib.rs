//! Built-in emulated services.
//!
//! Each module owns one service: its document types, its control
//! plane, and a `service()` function producing the
//! [`ServiceDefinition`] the host registers. Control planes form a
//! chain along the resource hierarchy — resource groups hold the
//! subscription plane, regional services hold the resource-group
//! plane — so ancestor checks are one call away and never reach into
//! another service's storage directly.
//!
//! [`built_in_services`] wires the whole set, including the deployment
//! dispatch table.

pub mod deployments;
pub mod event_hub;
pub mod resource_groups;
pub mod service_bus;
pub mod subscriptions;

use std::sync::Arc;

use nimbus_core::{EmulatorError, ServiceContext, ServiceDefinition};
use nimbus_router::TemplateError;

use deployments::{
    split_nested_name, DeploymentControlPlane, DeploymentScope, ResourceDispatcher,
};
use event_hub::EventHubControlPlane;
use resource_groups::ResourceGroupControlPlane;
use service_bus::ServiceBusControlPlane;
use subscriptions::SubscriptionControlPlane;

pub use subscriptions::DEFAULT_SUBSCRIPTION_ID;

/// Wires every built-in service against one storage root and returns
/// the definitions in registration order.
pub fn built_in_services(ctx: &ServiceContext) -> Result<Vec<ServiceDefinition>, TemplateError> {
    let bind = ctx.control_plane_bind;

    let subscriptions = Arc::new(SubscriptionControlPlane::new(ctx));
    let resource_groups = Arc::new(ResourceGroupControlPlane::new(
        ctx,
        Arc::clone(&subscriptions),
    ));
    let event_hub = Arc::new(EventHubControlPlane::new(ctx, Arc::clone(&resource_groups)));
    let service_bus = Arc::new(ServiceBusControlPlane::new(
        ctx,
        Arc::clone(&resource_groups),
    ));
    let dispatcher = dispatch_table(&event_hub, &service_bus);
    let deployments = Arc::new(DeploymentControlPlane::new(
        ctx,
        Arc::clone(&resource_groups),
        dispatcher,
    ));

    Ok(vec![
        subscriptions::service(&subscriptions, bind)?,
        resource_groups::service(&resource_groups, bind)?,
        event_hub::service(&event_hub, bind)?,
        service_bus::service(&service_bus, bind)?,
        deployments::service(&deployments, bind)?,
    ])
}

/// Builds the deployment dispatch table over the deployable resource
/// types. Adding a deployable type means adding a row here.
fn dispatch_table(
    event_hub: &Arc<EventHubControlPlane>,
    service_bus: &Arc<ServiceBusControlPlane>,
) -> ResourceDispatcher {
    let mut dispatcher = ResourceDispatcher::default();

    let plane = Arc::clone(event_hub);
    dispatcher.register("Microsoft.EventHub/namespaces", move |scope, declared| {
        let request = event_hub::NamespaceRequest {
            location: declared.location.clone().unwrap_or_default(),
            sku: declared.sku.clone(),
            tags: declared.tags.clone(),
        };
        let outcome = plane.create_or_update_namespace(
            scope.subscription,
            scope.resource_group,
            &declared.name,
            request,
        )?;
        dispatched_id(scope, &outcome.map(|ns| ns.id))
    });

    let plane = Arc::clone(event_hub);
    dispatcher.register(
        "Microsoft.EventHub/namespaces/eventhubs",
        move |scope, declared| {
            let (namespace, name) = split_nested_name(&declared.name)?;
            let request = event_hub::EventHubRequest {
                properties: declared.typed_properties()?,
            };
            let outcome = plane.create_or_update_event_hub(
                scope.subscription,
                scope.resource_group,
                namespace,
                name,
                request,
            )?;
            dispatched_id(scope, &outcome.map(|hub| hub.id))
        },
    );

    let plane = Arc::clone(service_bus);
    dispatcher.register("Microsoft.ServiceBus/namespaces", move |scope, declared| {
        let request = service_bus::NamespaceRequest {
            location: declared.location.clone().unwrap_or_default(),
            sku: declared.sku.clone(),
            tags: declared.tags.clone(),
        };
        let outcome = plane.create_or_update_namespace(
            scope.subscription,
            scope.resource_group,
            &declared.name,
            request,
        )?;
        dispatched_id(scope, &outcome.map(|ns| ns.id))
    });

    let plane = Arc::clone(service_bus);
    dispatcher.register(
        "Microsoft.ServiceBus/namespaces/queues",
        move |scope, declared| {
            let (namespace, name) = split_nested_name(&declared.name)?;
            let request = service_bus::QueueRequest {
                properties: declared.typed_properties()?,
            };
            let outcome = plane.create_or_update_queue(
                scope.subscription,
                scope.resource_group,
                namespace,
                name,
                request,
            )?;
            dispatched_id(scope, &outcome.map(|queue| queue.id))
        },
    );

    dispatcher
}

/// Extracts the created resource's id from a dispatch outcome. The
/// per-type `createOrUpdate` either succeeds with a resource or
/// errors, so an id-less outcome is an internal fault.
fn dispatched_id(
    scope: &DeploymentScope<'_>,
    outcome: &nimbus_core::OperationOutcome<nimbus_resource::ResourceId>,
) -> Result<nimbus_resource::ResourceId, EmulatorError> {
    outcome.resource.clone().ok_or_else(|| {
        EmulatorError::unhandled(format!(
            "dispatch in '{}/{}' produced no resource: {:?}",
            scope.subscription, scope.resource_group, outcome.reason
        ))
    })
}
