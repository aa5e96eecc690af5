//! Nimbus: a local cloud control-plane emulator.
//!
//! The emulator serves ARM-style resource lifecycle APIs over HTTP and
//! persists every resource as a JSON document tree on the local
//! filesystem, so state survives restarts and can be inspected (or
//! doctored) with ordinary shell tools.
//!
//! This crate is the assembly point: it re-exports the public surface
//! of the component crates and ships the `nimbus` binary.
//!
//! # Example
//!
//! ```rust,no_run
//! use nimbus::{built_in_services, EmulatorConfig, Host, ServiceContext};
//! use nimbus::router::BindPoint;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = EmulatorConfig::from_env();
//!     let ctx = ServiceContext {
//!         storage_root: config.storage_root().to_path_buf(),
//!         control_plane_bind: BindPoint::http(config.control_plane_port()),
//!     };
//!     let mut host = Host::new(config);
//!     for service in built_in_services(&ctx)? {
//!         host.register(service)?;
//!     }
//!     host.run().await?;
//!     Ok(())
//! }
//! ```

pub use nimbus_core::{
    ControlPlaneResult, EmulatorError, EndpointDefinition, EndpointHandler, OperationOutcome,
    OperationResult, ResourceCollection, ServiceContext, ServiceDefinition, ServiceRequest,
    ServiceResponse,
};
pub use nimbus_server::{EmulatorConfig, Host, ServerError, ShutdownSignal};
pub use nimbus_services::{built_in_services, DEFAULT_SUBSCRIPTION_ID};

/// Resource identifiers and the ARM resource model.
pub mod resource {
    pub use nimbus_resource::*;
}

/// Route templates, bind points and the request router.
pub mod router {
    pub use nimbus_router::*;
}

/// The filesystem-backed document store.
pub mod store {
    pub use nimbus_store::*;
}

/// The built-in service modules.
pub mod services {
    pub use nimbus_services::*;
}
