//! Emulator host configuration.
//!
//! Built with the builder pattern; every field can also be overridden
//! through the environment so the binary runs with zero flags:
//!
//! - `NIMBUS_HOST` — IP the listeners bind on
//! - `NIMBUS_STORAGE_ROOT` — root directory of all service storage
//! - `NIMBUS_CONTROL_PLANE_PORT` — port the control-plane routes use
//! - `NIMBUS_SHUTDOWN_TIMEOUT_SECS` — drain window on shutdown

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default bind IP.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default storage root, relative to the working directory.
pub const DEFAULT_STORAGE_ROOT: &str = ".nimbus";

/// Default control-plane port.
pub const DEFAULT_CONTROL_PLANE_PORT: u16 = 8080;

/// Default graceful-shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// Host configuration.
///
/// # Example
///
/// ```rust
/// use nimbus_server::EmulatorConfig;
///
/// let config = EmulatorConfig::builder()
///     .storage_root("/tmp/nimbus-state")
///     .control_plane_port(9090)
///     .build();
///
/// assert_eq!(config.control_plane_port(), 9090);
/// ```
#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    host: String,
    storage_root: PathBuf,
    control_plane_port: u16,
    shutdown_timeout: Duration,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl EmulatorConfig {
    /// Creates a configuration builder with defaults.
    #[must_use]
    pub fn builder() -> EmulatorConfigBuilder {
        EmulatorConfigBuilder::default()
    }

    /// Builds a configuration from defaults plus environment
    /// overrides. Unparsable values fall back to the default with a
    /// warning rather than aborting startup.
    #[must_use]
    pub fn from_env() -> Self {
        let mut builder = Self::builder();
        if let Ok(host) = std::env::var("NIMBUS_HOST") {
            builder = builder.host(host);
        }
        if let Ok(root) = std::env::var("NIMBUS_STORAGE_ROOT") {
            builder = builder.storage_root(root);
        }
        if let Ok(port) = std::env::var("NIMBUS_CONTROL_PLANE_PORT") {
            match port.parse() {
                Ok(port) => builder = builder.control_plane_port(port),
                Err(_) => tracing::warn!(%port, "ignoring unparsable NIMBUS_CONTROL_PLANE_PORT"),
            }
        }
        if let Ok(secs) = std::env::var("NIMBUS_SHUTDOWN_TIMEOUT_SECS") {
            match secs.parse() {
                Ok(secs) => builder = builder.shutdown_timeout(Duration::from_secs(secs)),
                Err(_) => tracing::warn!(%secs, "ignoring unparsable NIMBUS_SHUTDOWN_TIMEOUT_SECS"),
            }
        }
        builder.build()
    }

    /// The IP listeners bind on.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Parses the bind IP.
    pub fn host_ip(&self) -> Result<IpAddr, std::net::AddrParseError> {
        self.host.parse()
    }

    /// Root directory all service storage namespaces live under.
    #[must_use]
    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// Port the control-plane routes are served on.
    #[must_use]
    pub fn control_plane_port(&self) -> u16 {
        self.control_plane_port
    }

    /// Graceful-shutdown drain window.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }
}

/// Builder for [`EmulatorConfig`].
#[derive(Debug, Default)]
pub struct EmulatorConfigBuilder {
    host: Option<String>,
    storage_root: Option<PathBuf>,
    control_plane_port: Option<u16>,
    shutdown_timeout: Option<Duration>,
}

impl EmulatorConfigBuilder {
    /// Sets the bind IP.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the storage root directory.
    #[must_use]
    pub fn storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_root = Some(root.into());
        self
    }

    /// Sets the control-plane port.
    #[must_use]
    pub fn control_plane_port(mut self, port: u16) -> Self {
        self.control_plane_port = Some(port);
        self
    }

    /// Sets the graceful-shutdown drain window.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> EmulatorConfig {
        EmulatorConfig {
            host: self.host.unwrap_or_else(|| DEFAULT_HOST.to_owned()),
            storage_root: self
                .storage_root
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_ROOT)),
            control_plane_port: self.control_plane_port.unwrap_or(DEFAULT_CONTROL_PLANE_PORT),
            shutdown_timeout: self
                .shutdown_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS)),
        }
    }
}
