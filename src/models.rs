use axum::{Json, http::StatusCode, response::IntoResponse, response::Response};
use serde::Serialize;
use serde_json::Value;

/// Status text and property-error codes shared between create/update
/// payload validation and the tests that assert on them.
pub const INVALID_DATA: &str = "Invalid data";
pub const INVALID_DATA_MESSAGE: &str = "The request data did not pass validation";
pub const INVALID_PARAMETER: &str = "invalid_parameter";
pub const MISSING_REQUIRED_VALUE: &str = "missing_required_value";
pub const UNEXPECTED_ERROR: &str = "Unexpected error";

/// ResponseStatus
///
/// The three-way outcome of every endpoint: `ok` for success, `warning` for
/// application-level signals riding a structurally successful reply (element
/// not found, payload rejection), `error` for fatal failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Warning,
    Error,
}

/// PropertyError
///
/// Names the offending property when a request payload is rejected, carried
/// in the envelope's `detail` field.
#[derive(Debug, Clone, Serialize)]
pub struct PropertyError {
    pub property: String,
    pub error: String,
}

impl PropertyError {
    pub fn new(property: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            error: error.into(),
        }
    }
}

/// ApiResponse
///
/// The uniform success/warning/error wrapper every endpoint replies with:
/// a status, a short human-readable status text, and an optional payload
/// and/or detail object.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse {
    pub status: ResponseStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl ApiResponse {
    pub fn ok(payload: Value, message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Ok,
            message: message.into(),
            payload: Some(payload),
            detail: None,
        }
    }

    /// Success with no payload, the sentinel for update/delete/hide.
    pub fn ok_empty(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Ok,
            message: message.into(),
            payload: None,
            detail: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Warning,
            message: message.into(),
            payload: None,
            detail: None,
        }
    }

    pub fn warning_with_detail(message: impl Into<String>, detail: Value) -> Self {
        Self {
            status: ResponseStatus::Warning,
            message: message.into(),
            payload: None,
            detail: Some(detail),
        }
    }

    /// Rejected payload: the standard invalid-data warning with the
    /// offending property named in the detail.
    pub fn invalid_data(property_error: PropertyError) -> Self {
        Self::warning_with_detail(
            INVALID_DATA,
            serde_json::json!({
                "message": INVALID_DATA_MESSAGE,
                "property_errors": [property_error],
            }),
        )
    }

    pub fn error(detail: Value) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: UNEXPECTED_ERROR.to_string(),
            payload: None,
            detail: Some(detail),
        }
    }
}

impl IntoResponse for ApiResponse {
    /// Warnings are application-level signals, not protocol failures, so
    /// they ride an HTTP 200 like successes; only fatal failures map to a
    /// 5xx status.
    fn into_response(self) -> Response {
        let code = match self.status {
            ResponseStatus::Ok | ResponseStatus::Warning => StatusCode::OK,
            ResponseStatus::Error => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (code, Json(self)).into_response()
    }
}
