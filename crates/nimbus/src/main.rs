//! The `nimbus` binary: configure from the environment, wire the
//! built-in services and serve until Ctrl-C.

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use nimbus::router::BindPoint;
use nimbus::{built_in_services, EmulatorConfig, Host, ServiceContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("NIMBUS_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = EmulatorConfig::from_env();
    tracing::info!(
        storage_root = %config.storage_root().display(),
        port = config.control_plane_port(),
        "starting nimbus emulator"
    );

    let ctx = ServiceContext {
        storage_root: config.storage_root().to_path_buf(),
        control_plane_bind: BindPoint::http(config.control_plane_port()),
    };
    let mut host = Host::new(config);
    for service in built_in_services(&ctx).context("invalid route template")? {
        host.register(service)
            .with_context(|| "service registration failed")?;
    }

    host.run().await.context("host terminated abnormally")?;
    Ok(())
}
