//! Shared engine types every Nimbus service module is built on.
//!
//! This crate carries the pieces that must mean the same thing in all
//! ~15 emulated services:
//!
//! - [`EmulatorError`] — the error taxonomy and its HTTP rendering.
//! - [`OperationResult`] / [`OperationOutcome`] — the
//!   `{Result, Resource, Reason, Code}` envelope control planes and
//!   data planes hand back to endpoints.
//! - [`ServiceDefinition`] / [`EndpointDefinition`] — how a service
//!   declares its storage namespace, subresource types, bootstrap hook
//!   and route templates.
//! - [`control`] — the small helpers encoding the shared control-plane
//!   pattern (locked upserts, ancestor-scope checks).

pub mod control;
mod error;
mod outcome;
mod service;

pub use error::{EmulatorError, ErrorBody, ErrorEnvelope};
pub use outcome::{
    ControlPlaneResult, DataPlaneResult, OperationOutcome, OperationResult, ResourceCollection,
};
pub use service::{
    BootstrapHook, EndpointDefinition, EndpointHandler, ServiceContext, ServiceDefinition,
    ServiceRequest, ServiceResponse,
};
