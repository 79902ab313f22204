//! End-to-end tests driving a really-bound host through the SDK client,
//! the way an external collaborator (or a forwarding service emulator)
//! would reach the invoke endpoint.

use std::sync::Arc;
use std::time::Duration;

use lambda_emu_common::{handler_fn, json_handler};
use lambda_emu_host::FunctionRegistration;
use lambda_emu_sdk::{
    CreateFunctionRequest, InvocationType, InvokeOptions, LambdaClient, LogType, SdkError,
};
use lambda_emu_server::{HostSettings, InvocationHost};
use serde::{Deserialize, Serialize};

const TEST_ROLE: &str = "arn:aws:iam::123456789012:role/foo";

#[derive(Deserialize)]
struct ReverseInput {
    #[serde(rename = "Data")]
    data: String,
}

#[derive(Serialize)]
struct ReverseOutput {
    #[serde(rename = "Reverse")]
    reverse: String,
}

fn reverse_function() -> FunctionRegistration {
    FunctionRegistration::new(
        "reverse",
        Arc::new(json_handler(|input: ReverseInput, _ctx| async move {
            Ok(ReverseOutput {
                reverse: input.data.chars().rev().collect(),
            })
        })),
    )
    .with_handler_name("Reverse::Handler")
}

async fn start_host(settings: HostSettings) -> (InvocationHost, LambdaClient) {
    let host = InvocationHost::start(settings).await.unwrap();
    let client = LambdaClient::new(host.service_url());
    (host, client)
}

#[tokio::test]
async fn create_function_then_invoke_round_trips() {
    let settings = HostSettings::new().add_function(reverse_function()).unwrap();
    let (host, client) = start_host(settings).await;

    let configuration = client
        .create_function(CreateFunctionRequest::minimal("reverse", TEST_ROLE))
        .await
        .unwrap();
    assert_eq!(configuration.function_name, "reverse");
    assert_eq!(configuration.handler.as_deref(), Some("Reverse::Handler"));

    let output = client
        .invoke("reverse", br#"{"Data":"Bar"}"#.to_vec())
        .await
        .unwrap();

    assert_eq!(output.status, 200);
    assert!(output.function_error.is_none());
    assert!(String::from_utf8_lossy(&output.payload).starts_with(r#"{"Reverse":"raB"}"#));

    host.shutdown().await.unwrap();
}

#[tokio::test]
async fn unhandled_fault_reaches_the_client_as_a_200() {
    let settings = HostSettings::new()
        .add_function(FunctionRegistration::new(
            "panics",
            Arc::new(handler_fn(|_payload, _ctx| async move { panic!("boom") })),
        ))
        .unwrap();
    let (host, client) = start_host(settings).await;

    let output = client.invoke("panics", b"{}".to_vec()).await.unwrap();

    assert_eq!(output.status, 200);
    assert_eq!(output.function_error.as_deref(), Some("Unhandled"));
    assert!(String::from_utf8_lossy(&output.payload).contains("boom"));

    host.shutdown().await.unwrap();
}

#[tokio::test]
async fn unknown_function_is_a_not_found_api_error() {
    let (host, client) = start_host(HostSettings::new()).await;

    let err = client.invoke("ghost", Vec::new()).await.unwrap_err();
    match err {
        SdkError::Api {
            status, error_type, ..
        } => {
            assert_eq!(status, 404);
            assert_eq!(error_type, "ResourceNotFoundException");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    host.shutdown().await.unwrap();
}

#[tokio::test]
async fn limit_of_one_throttles_the_second_concurrent_invoke() {
    let settings = HostSettings::new()
        .with_account_concurrency_limit(1)
        .add_function(FunctionRegistration::new(
            "sleeper",
            Arc::new(handler_fn(|payload, _ctx| async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                Ok(payload)
            })),
        ))
        .unwrap();
    let (host, client) = start_host(settings).await;

    let first = client.invoke("sleeper", Vec::new());
    let second = async {
        // Give the first invoke time to take the only slot.
        tokio::time::sleep(Duration::from_millis(100)).await;
        client.invoke("sleeper", Vec::new()).await
    };
    let (first, second) = tokio::join!(first, second);

    let output = first.unwrap();
    assert_eq!(output.status, 200);
    assert!(output.function_error.is_none());

    match second.unwrap_err() {
        SdkError::Api {
            status, error_type, ..
        } => {
            assert_eq!(status, 429);
            assert_eq!(error_type, "TooManyRequestsException");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // Every admitted invocation released its slot.
    assert_eq!(host.in_flight(), 0);

    host.shutdown().await.unwrap();
}

#[tokio::test]
async fn log_tail_and_alternate_invocation_types() {
    let settings = HostSettings::new()
        .add_function(FunctionRegistration::new(
            "chatty",
            Arc::new(handler_fn(|payload, ctx| async move {
                ctx.log("starting work");
                Ok(payload)
            })),
        ))
        .unwrap();
    let (host, client) = start_host(settings).await;

    let output = client
        .invoke_with_options(
            "chatty",
            b"{}".to_vec(),
            InvokeOptions {
                log_type: LogType::Tail,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(output.log_result.unwrap().contains("starting work"));

    let event = client
        .invoke_with_options(
            "chatty",
            b"{}".to_vec(),
            InvokeOptions {
                invocation_type: InvocationType::Event,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(event.status, 202);
    assert!(event.payload.is_empty());

    let dry_run = client
        .invoke_with_options(
            "chatty",
            Vec::new(),
            InvokeOptions {
                invocation_type: InvocationType::DryRun,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(dry_run.status, 204);

    host.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_stops_accepting_connections() {
    let (host, client) = start_host(HostSettings::new()).await;

    host.shutdown().await.unwrap();

    let result = client.invoke("anything", Vec::new()).await;
    assert!(matches!(result, Err(SdkError::Http(_))));
}
