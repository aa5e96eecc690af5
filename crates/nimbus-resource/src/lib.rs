//! ARM resource and identifier model for the Nimbus emulator.
//!
//! This crate defines the canonical shape of an emulated cloud resource
//! and the identifier conventions every service shares:
//!
//! - [`ResourceId`] — the single place where the positional segment
//!   convention of ARM ids is defined. Every other crate goes through
//!   its named accessors instead of indexing into split paths.
//! - [`ArmResource`] / [`ArmSubresource`] — the typed resource
//!   envelopes persisted by control planes.
//! - [`GenericResource`] — the untyped variant used when a
//!   heterogeneous list of resources (e.g. a deployment's declared
//!   resources) must be dispatched to per-service control planes.
//!
//! # Example
//!
//! ```rust
//! use nimbus_resource::{ArmResource, ResourceId};
//!
//! let id = ResourceId::regional("sub1", "rg1", "Microsoft.EventHub", "namespaces", "ns1");
//! let resource = ArmResource::new(id, "westeurope", serde_json::json!({}));
//!
//! assert_eq!(resource.name, "ns1");
//! assert!(resource.is_in_resource_group("rg1"));
//! assert!(!resource.is_in_resource_group("rg2"));
//! ```

mod arm;
mod id;

pub use arm::{ArmResource, ArmSubresource, ConversionError, GenericResource, Sku};
pub use id::{IdError, ResourceId, ResourceScope};
