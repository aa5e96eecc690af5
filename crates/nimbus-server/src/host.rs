//! The emulator host: service registration, listeners and dispatch.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::net::TcpListener;
use uuid::Uuid;

use nimbus_core::{
    EmulatorError, EndpointHandler, ServiceDefinition, ServiceRequest, ServiceResponse,
};
use nimbus_router::{BindPoint, Router};

use crate::config::EmulatorConfig;
use crate::shutdown::ShutdownSignal;

/// Errors aborting host startup.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configured bind host is not a valid IP.
    #[error("invalid bind host '{host}': {source}")]
    InvalidHost {
        /// The configured host string.
        host: String,
        #[source]
        source: std::net::AddrParseError,
    },

    /// A listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address that failed to bind.
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// A service's storage setup or bootstrap hook failed.
    #[error("bootstrap of service '{service}' failed: {source}")]
    Bootstrap {
        /// The failing service's name.
        service: String,
        #[source]
        source: EmulatorError,
    },
}

/// The emulator host.
///
/// Services are registered once at startup; the host then owns one
/// accept loop per declared (port, protocol) and funnels every request
/// through the shared router.
///
/// # Example
///
/// ```rust,no_run
/// use nimbus_server::{EmulatorConfig, Host};
///
/// #[tokio::main]
/// async fn main() -> Result<(), nimbus_server::ServerError> {
///     let mut host = Host::new(EmulatorConfig::from_env());
///     // host.register(...service definitions...)?;
///     host.run().await
/// }
/// ```
pub struct Host {
    config: EmulatorConfig,
    services: Vec<ServiceDefinition>,
    router: Router<Arc<dyn EndpointHandler>>,
}

impl Host {
    /// Creates a host with no services registered.
    #[must_use]
    pub fn new(config: EmulatorConfig) -> Self {
        Self {
            config,
            services: Vec::new(),
            router: Router::new(),
        }
    }

    /// The host configuration.
    #[must_use]
    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    /// Names of the registered services, in registration order.
    #[must_use]
    pub fn service_names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.name.as_str()).collect()
    }

    /// Registers a service: ensures its storage root exists, runs its
    /// bootstrap hook and adds its route templates to the router.
    pub fn register(&mut self, service: ServiceDefinition) -> Result<(), ServerError> {
        let bootstrap_err = |source: EmulatorError| ServerError::Bootstrap {
            service: service.name.clone(),
            source,
        };

        service
            .storage
            .ensure_root()
            .map_err(|e| bootstrap_err(e.into()))?;
        if let Some(hook) = &service.bootstrap {
            hook(&service.storage).map_err(bootstrap_err)?;
        }

        let mut templates = 0;
        for endpoint in &service.endpoints {
            for template in &endpoint.templates {
                self.router
                    .register(template.clone(), endpoint.bind, Arc::clone(&endpoint.handler));
                templates += 1;
            }
        }
        tracing::info!(service = %service.name, templates, "registered service");
        self.services.push(service);
        Ok(())
    }

    /// Routes and executes one request, returning the response to
    /// write. Handlers run on the blocking pool; a handler panic
    /// reaches the wire as a 500 carrying only the panic's message.
    pub async fn dispatch(
        &self,
        bind: BindPoint,
        method: Method,
        path: &str,
        query: Option<&str>,
        headers: HashMap<String, String>,
        body: Bytes,
    ) -> ServiceResponse {
        let Some(route) = self.router.match_request(bind, &method, path) else {
            let err = EmulatorError::Routing {
                message: format!("{method} {path} on {bind}"),
            };
            tracing::debug!(%method, %path, %bind, "no endpoint matched");
            return ServiceResponse::from(&err);
        };

        let handler = Arc::clone(route.handler);
        let request = ServiceRequest {
            request_id: Uuid::now_v7(),
            method,
            path: path.to_owned(),
            params: route.params,
            query: parse_query(query),
            headers,
            body,
            principal: None,
        };
        let request_id = request.request_id;

        match tokio::task::spawn_blocking(move || handler.handle(&request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                tracing::warn!(%request_id, %path, error = %err, "handler failed");
                ServiceResponse::from(&err)
            }
            Err(join_err) => {
                tracing::error!(%request_id, %path, error = %join_err, "handler panicked");
                ServiceResponse::from(&EmulatorError::unhandled(join_err.to_string()))
            }
        }
    }

    /// Runs the host until Ctrl-C.
    pub async fn run(self) -> Result<(), ServerError> {
        let shutdown = ShutdownSignal::with_os_signals();
        self.run_with_shutdown(shutdown).await
    }

    /// Runs the host until `shutdown` triggers, then drains for the
    /// configured timeout.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let ip = self.config.host_ip().map_err(|source| ServerError::InvalidHost {
            host: self.config.host().to_owned(),
            source,
        })?;

        let binds = self.router.bind_points();
        let mut listeners = Vec::with_capacity(binds.len());
        for bind in binds {
            let addr = SocketAddr::new(ip, bind.port);
            let listener = TcpListener::bind(addr)
                .await
                .map_err(|source| ServerError::Bind { addr, source })?;
            tracing::info!(%bind, %addr, "listening");
            listeners.push((bind, listener));
        }

        let host = Arc::new(self);
        let mut loops = Vec::with_capacity(listeners.len());
        for (bind, listener) in listeners {
            loops.push(tokio::spawn(accept_loop(
                Arc::clone(&host),
                bind,
                listener,
                shutdown.clone(),
            )));
        }

        shutdown.recv().await;
        let drain = host.config.shutdown_timeout();
        tracing::info!(?drain, "shutdown signal received, draining");
        for task in loops {
            let _ = tokio::time::timeout(drain, task).await;
        }
        tracing::info!("host stopped");
        Ok(())
    }

    /// Handles one HTTP exchange on a listener.
    async fn handle_http(&self, bind: BindPoint, req: Request<Incoming>) -> Response<Full<Bytes>> {
        let method = req.method().clone();
        let path = req.uri().path().to_owned();
        let query = req.uri().query().map(str::to_owned);

        // Host-level health probe; not a service route.
        if method == Method::GET && path == "/health" {
            return render(&self.health_response());
        }

        let headers: HashMap<String, String> = req
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_owned(), v.to_owned()))
            })
            .collect();

        let body = match req.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                let err = EmulatorError::validation(format!("failed to read request body: {e}"));
                return render(&ServiceResponse::from(&err));
            }
        };

        let response = self
            .dispatch(bind, method, &path, query.as_deref(), headers, body)
            .await;
        render(&response)
    }

    fn health_response(&self) -> ServiceResponse {
        ServiceResponse {
            status: StatusCode::OK,
            body: Some(serde_json::json!({
                "service": "nimbus",
                "version": env!("CARGO_PKG_VERSION"),
                "status": "healthy",
                "services": self.service_names(),
            })),
        }
    }
}

/// Accepts connections on one listener until shutdown.
async fn accept_loop(
    host: Arc<Host>,
    bind: BindPoint,
    listener: TcpListener,
    shutdown: ShutdownSignal,
) {
    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, remote)) => {
                    let host = Arc::clone(&host);
                    let conn_shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let service = service_fn(move |req: Request<Incoming>| {
                            let host = Arc::clone(&host);
                            async move {
                                Ok::<_, Infallible>(host.handle_http(bind, req).await)
                            }
                        });
                        let conn = http1::Builder::new().serve_connection(io, service);
                        tokio::select! {
                            result = conn => {
                                if let Err(e) = result {
                                    tracing::debug!(%remote, error = %e, "connection error");
                                }
                            }
                            () = conn_shutdown.recv() => {}
                        }
                    });
                }
                Err(e) => tracing::error!(%bind, error = %e, "accept failed"),
            },
            () = shutdown.recv() => break,
        }
    }
}

/// Writes a [`ServiceResponse`] as an HTTP response with a JSON
/// content type.
fn render(response: &ServiceResponse) -> Response<Full<Bytes>> {
    let body = response
        .body
        .as_ref()
        .map(serde_json::Value::to_string)
        .unwrap_or_default();
    Response::builder()
        .status(response.status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    let Some(query) = query else {
        return HashMap::new();
    };
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key.to_owned(), value.to_owned()),
            None => (pair.to_owned(), String::new()),
        })
        .collect()
}
