//! Service and endpoint definitions, and the request/response types
//! handlers see.
//!
//! A [`ServiceDefinition`] is constructed once at process start and
//! lives for the process lifetime. Its endpoints are immutable; every
//! request is resolved against the current on-disk state.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use nimbus_router::{BindPoint, Params, RouteTemplate, TemplateError};
use nimbus_store::ServiceStorage;

use crate::error::EmulatorError;
use crate::outcome::{OperationOutcome, OperationResult};

/// Process-wide wiring context handed to service constructors.
#[derive(Debug, Clone)]
pub struct ServiceContext {
    /// Root directory all service storage namespaces live under.
    pub storage_root: PathBuf,
    /// The bind point control-plane endpoints are served on.
    pub control_plane_bind: BindPoint,
}

/// A normalized inbound request as seen by endpoint handlers.
#[derive(Debug)]
pub struct ServiceRequest {
    /// Per-request correlation id.
    pub request_id: Uuid,
    /// HTTP method.
    pub method: Method,
    /// Request path.
    pub path: String,
    /// Parameters captured by the matched route template.
    pub params: Params,
    /// Decoded query string pairs.
    pub query: HashMap<String, String>,
    /// Request headers (lower-cased names).
    pub headers: HashMap<String, String>,
    /// Raw request body.
    pub body: Bytes,
    /// Authenticated principal, when the identity stub supplied one.
    pub principal: Option<String>,
}

impl ServiceRequest {
    /// Looks up a required path parameter.
    ///
    /// A missing parameter means the route template and the handler
    /// disagree about parameter names, which surfaces as a validation
    /// failure rather than a panic.
    pub fn param(&self, name: &str) -> Result<&str, EmulatorError> {
        self.params
            .get(name)
            .ok_or_else(|| EmulatorError::validation(format!("missing path parameter '{name}'")))
    }

    /// Deserializes the JSON request body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, EmulatorError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| EmulatorError::validation(format!("invalid request body: {e}")))
    }
}

/// The response a handler returns; the host renders it onto the wire
/// with a JSON content type.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceResponse {
    /// HTTP status.
    pub status: StatusCode,
    /// JSON body, if any.
    pub body: Option<serde_json::Value>,
}

impl ServiceResponse {
    /// A response with a serialized JSON body.
    pub fn json<T: Serialize>(status: StatusCode, body: &T) -> Result<Self, EmulatorError> {
        let body = serde_json::to_value(body)
            .map_err(|e| EmulatorError::unhandled(format!("cannot serialize response: {e}")))?;
        Ok(Self {
            status,
            body: Some(body),
        })
    }

    /// A bodyless response.
    #[must_use]
    pub fn status_only(status: StatusCode) -> Self {
        Self { status, body: None }
    }

    /// Renders an operation outcome with the default
    /// [`OperationResult::http_status`] mapping: the resource on
    /// success, the error envelope keyed by the outcome's `Code`
    /// otherwise.
    pub fn from_outcome<T: Serialize>(
        outcome: &OperationOutcome<T>,
    ) -> Result<Self, EmulatorError> {
        Self::from_outcome_with(outcome, OperationResult::http_status)
    }

    /// Renders an operation outcome with a per-endpoint status
    /// mapping. Delete-style endpoints use this to report a missing
    /// resource as success (a cloud-compatibility quirk that is
    /// resource-kind specific and must not be unified).
    pub fn from_outcome_with<T: Serialize>(
        outcome: &OperationOutcome<T>,
        status_for: impl Fn(OperationResult) -> StatusCode,
    ) -> Result<Self, EmulatorError> {
        let status = status_for(outcome.result);
        if status.is_success() {
            return match &outcome.resource {
                Some(resource) => Self::json(status, resource),
                None => Ok(Self::status_only(status)),
            };
        }
        let body = serde_json::json!({
            "error": {
                "code": outcome.code.clone().unwrap_or_else(|| "Failed".to_owned()),
                "message": outcome.reason.clone().unwrap_or_default(),
            }
        });
        Ok(Self {
            status,
            body: Some(body),
        })
    }
}

impl From<&EmulatorError> for ServiceResponse {
    fn from(err: &EmulatorError) -> Self {
        let envelope = err.to_envelope();
        Self {
            status: err.status_code(),
            // The envelope is two strings; serialization cannot fail.
            body: serde_json::to_value(&envelope).ok(),
        }
    }
}

/// One endpoint handler. Implementations run on the blocking thread
/// pool because store operations are synchronous filesystem calls.
pub trait EndpointHandler: Send + Sync {
    /// Handles a routed request.
    fn handle(&self, req: &ServiceRequest) -> Result<ServiceResponse, EmulatorError>;
}

impl<F> EndpointHandler for F
where
    F: Fn(&ServiceRequest) -> Result<ServiceResponse, EmulatorError> + Send + Sync,
{
    fn handle(&self, req: &ServiceRequest) -> Result<ServiceResponse, EmulatorError> {
        self(req)
    }
}

/// One or more route templates bound to a handler on a bind point.
pub struct EndpointDefinition {
    /// Route templates this endpoint answers.
    pub templates: Vec<RouteTemplate>,
    /// The (port, protocol) the endpoint is served on.
    pub bind: BindPoint,
    /// The handler invoked on a match.
    pub handler: Arc<dyn EndpointHandler>,
}

impl EndpointDefinition {
    /// Parses the template specifications and builds the definition.
    ///
    /// # Errors
    ///
    /// Returns the first [`TemplateError`] among the specifications.
    pub fn new(
        bind: BindPoint,
        template_specs: &[&str],
        handler: Arc<dyn EndpointHandler>,
    ) -> Result<Self, TemplateError> {
        let templates = template_specs
            .iter()
            .map(|spec| spec.parse())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            templates,
            bind,
            handler,
        })
    }
}

impl std::fmt::Debug for EndpointDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointDefinition")
            .field("templates", &self.templates)
            .field("bind", &self.bind)
            .finish_non_exhaustive()
    }
}

/// Hook run once when a service is registered, after its storage root
/// exists. Used to seed initial state.
pub type BootstrapHook = Box<dyn Fn(&ServiceStorage) -> Result<(), EmulatorError> + Send + Sync>;

/// Everything the host needs to serve one emulated service.
pub struct ServiceDefinition {
    /// Service name, used in logs and diagnostics.
    pub name: String,
    /// The service's storage handle (namespace root plus declared
    /// subresource types).
    pub storage: Arc<ServiceStorage>,
    /// Endpoints owned by this service.
    pub endpoints: Vec<EndpointDefinition>,
    /// Optional state-seeding hook, run once at registration.
    pub bootstrap: Option<BootstrapHook>,
}

impl std::fmt::Debug for ServiceDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDefinition")
            .field("name", &self.name)
            .field("endpoints", &self.endpoints.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(body: &str) -> ServiceRequest {
        let mut params = Params::new();
        params.push("name", "rg1");
        ServiceRequest {
            request_id: Uuid::now_v7(),
            method: Method::PUT,
            path: "/x/rg1".to_owned(),
            params,
            query: HashMap::new(),
            headers: HashMap::new(),
            body: Bytes::from(body.to_owned()),
            principal: None,
        }
    }

    #[test]
    fn test_param_lookup() {
        let req = request("{}");
        assert_eq!(req.param("name").unwrap(), "rg1");
        assert!(matches!(
            req.param("missing"),
            Err(EmulatorError::Validation { .. })
        ));
    }

    #[test]
    fn test_json_body_validation() {
        #[derive(serde::Deserialize)]
        struct Body {
            location: String,
        }

        let req = request(r#"{"location":"westeurope"}"#);
        let body: Body = req.json().unwrap();
        assert_eq!(body.location, "westeurope");

        let bad = request("not json");
        assert!(matches!(
            bad.json::<Body>(),
            Err(EmulatorError::Validation { .. })
        ));
    }

    #[test]
    fn test_outcome_rendering_success() {
        let outcome = OperationOutcome::created(serde_json::json!({"name": "rg1"}));
        let resp = ServiceResponse::from_outcome(&outcome).unwrap();
        assert_eq!(resp.status, StatusCode::CREATED);
        assert_eq!(resp.body.unwrap()["name"], "rg1");
    }

    #[test]
    fn test_outcome_rendering_failure_envelope() {
        let outcome: OperationOutcome<serde_json::Value> =
            OperationOutcome::not_found("no such group");
        let resp = ServiceResponse::from_outcome(&outcome).unwrap();
        assert_eq!(resp.status, StatusCode::NOT_FOUND);
        let body = resp.body.unwrap();
        assert_eq!(body["error"]["code"], "ResourceNotFound");
        assert_eq!(body["error"]["message"], "no such group");
    }

    #[test]
    fn test_outcome_rendering_with_delete_override() {
        // A delete endpoint that reports a missing resource as 200.
        let outcome: OperationOutcome<serde_json::Value> = OperationOutcome::not_found("gone");
        let resp = ServiceResponse::from_outcome_with(&outcome, |result| match result {
            OperationResult::NotFound => StatusCode::OK,
            other => other.http_status(),
        })
        .unwrap();
        assert_eq!(resp.status, StatusCode::OK);
    }

    #[test]
    fn test_error_to_response() {
        let err = EmulatorError::Routing {
            message: "GET /nope".to_owned(),
        };
        let resp = ServiceResponse::from(&err);
        assert_eq!(resp.status, StatusCode::NOT_FOUND);
        assert_eq!(resp.body.unwrap()["error"]["code"], "EndpointNotFound");
    }

    #[test]
    fn test_closure_is_a_handler() {
        let handler = |req: &ServiceRequest| {
            Ok(ServiceResponse::status_only(if req.method == Method::PUT {
                StatusCode::OK
            } else {
                StatusCode::METHOD_NOT_ALLOWED
            }))
        };
        let resp = handler.handle(&request("{}")).unwrap();
        assert_eq!(resp.status, StatusCode::OK);
    }
}
