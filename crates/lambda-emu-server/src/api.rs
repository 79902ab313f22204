//! HTTP emulation of the function-invocation API surface.
//!
//! Routes and wire shapes follow the real service: create-function and
//! invoke, handler errors reported as transport-level 200s with the
//! `X-Amz-Function-Error` side channel, host errors mapped to the documented
//! status codes and JSON error bodies.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{SecondsFormat, Utc};
use lambda_emu_common::{function_arn, ErrorPayload, HostFault, InvocationOutcome};
use lambda_emu_host::DispatchResult;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::AppState;

pub const HEADER_FUNCTION_ERROR: &str = "X-Amz-Function-Error";
pub const HEADER_INVOCATION_TYPE: &str = "X-Amz-Invocation-Type";
pub const HEADER_LOG_TYPE: &str = "X-Amz-Log-Type";
pub const HEADER_LOG_RESULT: &str = "X-Amz-Log-Result";
pub const HEADER_EXECUTED_VERSION: &str = "X-Amz-Executed-Version";
pub const HEADER_REQUEST_ID: &str = "x-amzn-RequestId";
pub const HEADER_ERROR_TYPE: &str = "x-amzn-ErrorType";

/// Log tail reporting is capped at the last 4 KiB, like the real service.
const LOG_TAIL_LIMIT: usize = 4096;

#[derive(Debug, Deserialize)]
pub struct CreateFunctionRequest {
    #[serde(rename = "FunctionName")]
    pub function_name: Option<String>,
    #[serde(rename = "Role")]
    pub role: Option<String>,
    /// Accepted so SDK client validation succeeds; contents are never
    /// interpreted.
    #[serde(rename = "Code")]
    pub code: Option<serde_json::Value>,
    #[serde(rename = "Handler")]
    pub handler: Option<String>,
    #[serde(rename = "Runtime")]
    pub runtime: Option<String>,
    #[serde(rename = "Timeout")]
    pub timeout: Option<u64>,
    #[serde(rename = "MemorySize")]
    pub memory_size: Option<u32>,
}

/// Minimal function descriptor echoed back by create-function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionConfiguration {
    #[serde(rename = "FunctionName")]
    pub function_name: String,
    #[serde(rename = "FunctionArn")]
    pub function_arn: String,
    #[serde(rename = "Role")]
    pub role: String,
    #[serde(rename = "Handler")]
    pub handler: String,
    #[serde(rename = "Runtime", skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    #[serde(rename = "Timeout")]
    pub timeout: u64,
    #[serde(rename = "MemorySize")]
    pub memory_size: u32,
    #[serde(rename = "State")]
    pub state: String,
    #[serde(rename = "LastModified")]
    pub last_modified: String,
    #[serde(rename = "Version")]
    pub version: String,
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    InvalidParameter(String),
    ResourceConflict(String),
    ResourceNotFound(String),
    TooManyRequests,
    Service(String),
}

impl From<&HostFault> for ApiError {
    fn from(fault: &HostFault) -> Self {
        match fault {
            HostFault::NotFound(name) => ApiError::ResourceNotFound(name.clone()),
            HostFault::Throttled => ApiError::TooManyRequests,
            // Timeouts are reported through the 200-level function-error
            // channel, never through this mapping.
            HostFault::Timeout { request_id, .. } => ApiError::Service(format!(
                "timeout for request {request_id} reached the transport error path"
            )),
            HostFault::Internal(message) => ApiError::Service(message.clone()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Field casing inside the bodies mirrors the live service, which is
        // not consistent across its own error shapes.
        let (status, error_type, body) = match self {
            ApiError::InvalidParameter(message) => (
                StatusCode::BAD_REQUEST,
                "InvalidParameterValueException",
                serde_json::json!({ "Type": "User", "message": message }),
            ),
            ApiError::ResourceConflict(name) => (
                StatusCode::CONFLICT,
                "ResourceConflictException",
                serde_json::json!({
                    "Type": "User",
                    "message": format!("Function already exist: {name}"),
                }),
            ),
            ApiError::ResourceNotFound(name) => (
                StatusCode::NOT_FOUND,
                "ResourceNotFoundException",
                serde_json::json!({
                    "Type": "User",
                    "Message": format!("Function not found: {}", function_arn(&name)),
                }),
            ),
            ApiError::TooManyRequests => (
                StatusCode::TOO_MANY_REQUESTS,
                "TooManyRequestsException",
                serde_json::json!({
                    "Reason": "ConcurrentInvocationLimitExceeded",
                    "Type": "User",
                    "message": "Rate Exceeded.",
                }),
            ),
            ApiError::Service(message) => {
                error!("internal host error: {message}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "ServiceException",
                    serde_json::json!({ "Type": "Service", "Message": message }),
                )
            }
        };

        (
            status,
            [
                (HEADER_ERROR_TYPE, error_type.to_string()),
                (HEADER_REQUEST_ID, Uuid::new_v4().to_string()),
            ],
            Json(body),
        )
            .into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// `POST /2015-03-31/functions`
///
/// Validates that the minimal required fields are present and records the
/// created descriptor. Role and code are accepted but never interpreted; the
/// endpoint exists so a real SDK client's create call succeeds against the
/// emulator.
pub async fn create_function(
    State(state): State<AppState>,
    Json(request): Json<CreateFunctionRequest>,
) -> Result<Response, ApiError> {
    let function_name = require(request.function_name, "FunctionName")?;
    let role = require(request.role, "Role")?;
    if request.code.is_none() {
        return Err(ApiError::InvalidParameter(
            "Code is a required parameter".to_string(),
        ));
    }

    // Echo the locally-bound registration's configuration when one exists;
    // otherwise fall back to the request values.
    let (handler, timeout, memory_size) = match state.registry.resolve(&function_name) {
        Some(registration) => (
            registration.handler_name().to_string(),
            registration.timeout().as_secs(),
            registration.memory_mb(),
        ),
        None => (
            request.handler.unwrap_or_else(|| "handler".to_string()),
            request.timeout.unwrap_or(3),
            request.memory_size.unwrap_or(128),
        ),
    };

    let configuration = FunctionConfiguration {
        function_arn: function_arn(&function_name),
        function_name: function_name.clone(),
        role,
        handler,
        runtime: request.runtime,
        timeout,
        memory_size,
        state: "Active".to_string(),
        last_modified: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        version: "$LATEST".to_string(),
    };

    match state.created.entry(function_name.clone()) {
        dashmap::mapref::entry::Entry::Occupied(_) => {
            Err(ApiError::ResourceConflict(function_name))
        }
        dashmap::mapref::entry::Entry::Vacant(entry) => {
            entry.insert(configuration.clone());
            info!(function = %function_name, "function created");
            Ok((
                StatusCode::CREATED,
                [(HEADER_REQUEST_ID, Uuid::new_v4().to_string())],
                Json(configuration),
            )
                .into_response())
        }
    }
}

fn require(value: Option<String>, field: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::InvalidParameter(format!("{field} is a required parameter")))
}

/// `POST /2015-03-31/functions/{name}/invocations`
pub async fn invoke(
    State(state): State<AppState>,
    Path(function_name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let invocation_type = header_value(&headers, HEADER_INVOCATION_TYPE)
        .unwrap_or("RequestResponse");

    match invocation_type {
        "DryRun" => {
            if !state.registry.contains(&function_name) {
                return ApiError::ResourceNotFound(function_name).into_response();
            }
            (
                StatusCode::NO_CONTENT,
                [(HEADER_REQUEST_ID, Uuid::new_v4().to_string())],
                (),
            )
                .into_response()
        }
        "Event" => invoke_event(state, function_name, body).await,
        _ => {
            let wants_tail = header_value(&headers, HEADER_LOG_TYPE) == Some("Tail");
            let result = state.dispatcher.dispatch(&function_name, body.to_vec()).await;
            invoke_response(result, wants_tail)
        }
    }
}

/// Fire-and-forget invocation: answer 202 immediately, dispatch in the
/// background. Failures only surface in the host log.
async fn invoke_event(state: AppState, function_name: String, body: Bytes) -> Response {
    if !state.registry.contains(&function_name) {
        return ApiError::ResourceNotFound(function_name).into_response();
    }

    let dispatcher = state.dispatcher.clone();
    let payload = body.to_vec();
    tokio::spawn(async move {
        let result = dispatcher.dispatch(&function_name, payload).await;
        match result.outcome {
            InvocationOutcome::Success(_) => {}
            InvocationOutcome::HandlerError(fault) => warn!(
                request_id = %result.request_id,
                function = %function_name,
                "event invocation failed: {fault}"
            ),
            InvocationOutcome::HostError(fault) => warn!(
                request_id = %result.request_id,
                function = %function_name,
                "event invocation failed: {fault:?}"
            ),
        }
    });

    (
        StatusCode::ACCEPTED,
        [
            (HEADER_REQUEST_ID, Uuid::new_v4().to_string()),
            (HEADER_EXECUTED_VERSION, "$LATEST".to_string()),
        ],
        (),
    )
        .into_response()
}

fn invoke_response(result: DispatchResult, wants_tail: bool) -> Response {
    let log_result = wants_tail.then(|| encode_log_tail(&result.log_lines));

    let (function_error, body) = match result.outcome {
        InvocationOutcome::Success(payload) => (None, payload),
        InvocationOutcome::HandlerError(fault) => {
            let payload = ErrorPayload::from(&fault);
            (
                Some(fault.kind.as_str()),
                serde_json::to_vec(&payload).unwrap_or_default(),
            )
        }
        InvocationOutcome::HostError(HostFault::Timeout { request_id, timeout }) => {
            // Transport parity: the real service reports timeouts as a
            // 200-level unhandled function error, not a distinct status.
            let payload = ErrorPayload {
                error_message: format!(
                    "{} {} Task timed out after {:.2} seconds",
                    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                    request_id,
                    timeout.as_secs_f64(),
                ),
                error_type: "TimeoutError".to_string(),
                stack_trace: None,
            };
            (
                Some("Unhandled"),
                serde_json::to_vec(&payload).unwrap_or_default(),
            )
        }
        InvocationOutcome::HostError(fault) => {
            return ApiError::from(&fault).into_response();
        }
    };

    let mut response = (
        StatusCode::OK,
        [
            (HEADER_REQUEST_ID, result.request_id),
            (HEADER_EXECUTED_VERSION, "$LATEST".to_string()),
        ],
        body,
    )
        .into_response();

    let headers = response.headers_mut();
    if let Some(kind) = function_error {
        headers.insert(HEADER_FUNCTION_ERROR, HeaderValue::from_static(kind));
    }
    if let Some(encoded) = log_result {
        if let Ok(value) = encoded.parse() {
            headers.insert(HEADER_LOG_RESULT, value);
        }
    }
    response
}

/// Base64 of the last 4 KiB of the invocation's log output.
fn encode_log_tail(lines: &[String]) -> String {
    let joined = lines.join("\n");
    let bytes = joined.as_bytes();
    let tail = &bytes[bytes.len().saturating_sub(LOG_TAIL_LIMIT)..];
    BASE64.encode(tail)
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "functions": state.registry.len(),
        "in_flight": state.dispatcher.limiter().in_flight(),
    }))
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
