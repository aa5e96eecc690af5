//! The operation-result protocol shared by every control plane.

use http::StatusCode;
use serde::{Deserialize, Serialize};

/// The result taxonomy of control- and data-plane operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationResult {
    /// A new resource was created.
    Created,
    /// An existing resource was updated (or deliberately left as-is).
    Updated,
    /// The operation failed for a non-client reason.
    Failed,
    /// The resource or an ancestor scope does not exist.
    NotFound,
    /// A read or ancillary operation succeeded.
    Success,
    /// A resource was deleted (idempotently).
    Deleted,
    /// The request was malformed.
    BadRequest,
}

impl OperationResult {
    /// The default HTTP status for this result.
    ///
    /// A few delete-style endpoints deliberately deviate (a missing
    /// resource still reads as success for some resource kinds); those
    /// endpoints override the mapping at render time, this table is
    /// never special-cased.
    #[must_use]
    pub fn http_status(self) -> StatusCode {
        match self {
            Self::Created => StatusCode::CREATED,
            Self::Updated | Self::Success | Self::Deleted => StatusCode::OK,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Failed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// The `{Result, Resource, Reason, Code}` envelope every operation
/// returns.
///
/// `Reason` and `Code` are only populated on non-success results, so a
/// single response-building helper keyed by `Code` can render every
/// endpoint's failures identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OperationOutcome<T> {
    /// What happened.
    pub result: OperationResult,
    /// The affected resource, when one exists to report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<T>,
    /// Human-readable failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Machine-readable failure code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// The `{"value":[...]}` envelope list endpoints return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceCollection<T> {
    /// The listed resources.
    pub value: Vec<T>,
}

impl<T> FromIterator<T> for ResourceCollection<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            value: iter.into_iter().collect(),
        }
    }
}

/// Outcome of a control-plane (resource lifecycle) operation.
pub type ControlPlaneResult<T> = OperationOutcome<T>;

/// Outcome of a data-plane (runtime) operation.
pub type DataPlaneResult<T> = OperationOutcome<T>;

impl<T> OperationOutcome<T> {
    /// A `Created` outcome carrying the new resource.
    #[must_use]
    pub fn created(resource: T) -> Self {
        Self {
            result: OperationResult::Created,
            resource: Some(resource),
            reason: None,
            code: None,
        }
    }

    /// An `Updated` outcome carrying the (possibly unchanged) resource.
    #[must_use]
    pub fn updated(resource: T) -> Self {
        Self {
            result: OperationResult::Updated,
            resource: Some(resource),
            reason: None,
            code: None,
        }
    }

    /// A `Success` outcome carrying the resource read.
    #[must_use]
    pub fn success(resource: T) -> Self {
        Self {
            result: OperationResult::Success,
            resource: Some(resource),
            reason: None,
            code: None,
        }
    }

    /// A `Deleted` outcome. Carries no resource: deletes are
    /// idempotent and there may never have been one.
    #[must_use]
    pub fn deleted() -> Self {
        Self {
            result: OperationResult::Deleted,
            resource: None,
            reason: None,
            code: None,
        }
    }

    /// A `NotFound` outcome with a reason.
    #[must_use]
    pub fn not_found(reason: impl Into<String>) -> Self {
        Self {
            result: OperationResult::NotFound,
            resource: None,
            reason: Some(reason.into()),
            code: Some("ResourceNotFound".to_owned()),
        }
    }

    /// A `BadRequest` outcome with a reason.
    #[must_use]
    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self {
            result: OperationResult::BadRequest,
            resource: None,
            reason: Some(reason.into()),
            code: Some("BadRequest".to_owned()),
        }
    }

    /// Maps the resource type, keeping result/reason/code intact.
    #[must_use]
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> OperationOutcome<U> {
        OperationOutcome {
            result: self.result,
            resource: self.resource.map(f),
            reason: self.reason,
            code: self.code,
        }
    }

}
