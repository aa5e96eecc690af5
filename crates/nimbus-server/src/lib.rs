//! HTTP host and listener layer for the Nimbus emulator.
//!
//! The host opens one socket per (port, protocol) declared across all
//! registered services, normalizes each accepted connection into a
//! [`nimbus_core::ServiceRequest`], routes it through the shared
//! router and writes the handler's response back to the wire.
//!
//! Handlers perform synchronous filesystem I/O, so each invocation is
//! offloaded to the blocking thread pool instead of running on the
//! accept loop's reactor.

mod config;
mod host;
mod shutdown;

pub use config::{EmulatorConfig, EmulatorConfigBuilder};
pub use host::{Host, ServerError};
pub use shutdown::ShutdownSignal;
