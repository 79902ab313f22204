//! # Invocation Host Client
//!
//! A small client for the locally-hosted function-invocation API, used by
//! test fixtures the way a real SDK client would talk to the managed service.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lambda_emu_sdk::{CreateFunctionRequest, LambdaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = LambdaClient::new("http://127.0.0.1:9001".to_string());
//!
//! client
//!     .create_function(CreateFunctionRequest::minimal(
//!         "reverse",
//!         "arn:aws:iam::123456789012:role/foo",
//!     ))
//!     .await?;
//!
//! let output = client.invoke("reverse", br#"{"Data":"Bar"}"#.to_vec()).await?;
//! assert!(output.function_error.is_none());
//! println!("payload: {}", String::from_utf8_lossy(&output.payload));
//! # Ok(())
//! # }
//! ```
//!
//! Handler failures are not client errors: the service reports them as
//! transport-level 200s with the `X-Amz-Function-Error` indicator, so they
//! surface on [`InvokeOutput::function_error`]. Only non-2xx responses become
//! [`SdkError::Api`].

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SdkError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("API error ({status} {error_type}): {message}")]
    Api {
        status: u16,
        error_type: String,
        message: String,
    },
}

/// Synchronous vs. fire-and-forget vs. validation-only invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvocationType {
    #[default]
    RequestResponse,
    Event,
    DryRun,
}

impl InvocationType {
    fn as_str(&self) -> &'static str {
        match self {
            InvocationType::RequestResponse => "RequestResponse",
            InvocationType::Event => "Event",
            InvocationType::DryRun => "DryRun",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogType {
    #[default]
    None,
    Tail,
}

/// Per-invoke options; the defaults match a plain synchronous invoke.
#[derive(Debug, Clone, Copy, Default)]
pub struct InvokeOptions {
    pub invocation_type: InvocationType,
    pub log_type: LogType,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct FunctionCode {
    #[serde(rename = "ZipFile", skip_serializing_if = "Option::is_none")]
    pub zip_file: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateFunctionRequest {
    #[serde(rename = "FunctionName")]
    pub function_name: String,
    #[serde(rename = "Role")]
    pub role: String,
    #[serde(rename = "Handler", skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    #[serde(rename = "Runtime", skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    /// Must be present for the service's request validation; the contents
    /// are ignored by the emulator.
    #[serde(rename = "Code")]
    pub code: FunctionCode,
}

impl CreateFunctionRequest {
    /// The smallest request the emulated create-function endpoint accepts.
    pub fn minimal(function_name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            role: role.into(),
            handler: None,
            runtime: None,
            code: FunctionCode {
                zip_file: Some(String::new()),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionConfiguration {
    #[serde(rename = "FunctionName")]
    pub function_name: String,
    #[serde(rename = "FunctionArn")]
    pub function_arn: String,
    #[serde(rename = "Handler")]
    pub handler: Option<String>,
    #[serde(rename = "Timeout")]
    pub timeout: Option<u64>,
    #[serde(rename = "MemorySize")]
    pub memory_size: Option<u32>,
    #[serde(rename = "State")]
    pub state: Option<String>,
    #[serde(rename = "Version")]
    pub version: Option<String>,
    #[serde(rename = "LastModified")]
    pub last_modified: Option<String>,
}

/// Result of one invoke call.
#[derive(Debug)]
pub struct InvokeOutput {
    pub status: u16,
    pub payload: Vec<u8>,
    /// `"Handled"` / `"Unhandled"` when the function failed; `None` on
    /// success.
    pub function_error: Option<String>,
    pub executed_version: Option<String>,
    /// Decoded log tail, when requested with [`LogType::Tail`].
    pub log_result: Option<String>,
    pub request_id: Option<String>,
}

/// Client for one invocation host, addressed by its base URL — the same
/// value the host reports as its service URL.
pub struct LambdaClient {
    client: Client,
    base_url: String,
}

impl LambdaClient {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Register a function with the control plane. The emulator validates
    /// the request shape and records the descriptor; handler code must
    /// already be bound host-side.
    pub async fn create_function(
        &self,
        request: CreateFunctionRequest,
    ) -> Result<FunctionConfiguration, SdkError> {
        let url = format!("{}/2015-03-31/functions", self.base_url);
        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(response.json().await?)
    }

    /// Synchronously invoke a function with a raw payload.
    pub async fn invoke(
        &self,
        function_name: &str,
        payload: Vec<u8>,
    ) -> Result<InvokeOutput, SdkError> {
        self.invoke_with_options(function_name, payload, InvokeOptions::default())
            .await
    }

    pub async fn invoke_with_options(
        &self,
        function_name: &str,
        payload: Vec<u8>,
        options: InvokeOptions,
    ) -> Result<InvokeOutput, SdkError> {
        let url = format!(
            "{}/2015-03-31/functions/{}/invocations",
            self.base_url, function_name
        );

        let mut request = self
            .client
            .post(&url)
            .header("X-Amz-Invocation-Type", options.invocation_type.as_str())
            .body(payload);
        if options.log_type == LogType::Tail {
            request = request.header("X-Amz-Log-Type", "Tail");
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let status = response.status().as_u16();
        let function_error = header_string(&response, "X-Amz-Function-Error");
        let executed_version = header_string(&response, "X-Amz-Executed-Version");
        let request_id = header_string(&response, "x-amzn-RequestId");
        let log_result = header_string(&response, "X-Amz-Log-Result").map(|encoded| {
            BASE64
                .decode(&encoded)
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                .unwrap_or(encoded)
        });
        let payload = response.bytes().await?.to_vec();

        Ok(InvokeOutput {
            status,
            payload,
            function_error,
            executed_version,
            log_result,
            request_id,
        })
    }
}

fn header_string(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}

/// The service's error bodies are not consistent about field casing, so
/// accept both spellings.
#[derive(Debug, Deserialize, Default)]
struct WireError {
    #[serde(alias = "Message")]
    message: Option<String>,
}

async fn api_error(response: reqwest::Response) -> SdkError {
    let status = response.status().as_u16();
    let error_type = header_string(&response, "x-amzn-ErrorType")
        .unwrap_or_else(|| "Unknown".to_string());
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<WireError>(&body)
        .ok()
        .and_then(|wire| wire.message)
        .unwrap_or(body);

    SdkError::Api {
        status,
        error_type,
        message,
    }
}
