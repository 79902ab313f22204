//! The handler capability and its adapters.
//!
//! A registration binds a function name to an opaque callable: raw payload
//! bytes and a context in, raw payload bytes or a fault out. Serialization
//! semantics belong to the adapters, keeping the dispatcher reusable across
//! handler signatures.

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::context::InvocationContext;
use crate::HandlerFault;

/// In-process handler code hosted behind a function name.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(
        &self,
        payload: Vec<u8>,
        ctx: &InvocationContext,
    ) -> std::result::Result<Vec<u8>, HandlerFault>;
}

/// Adapt a plain async closure over raw bytes into a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Vec<u8>, InvocationContext) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<Vec<u8>, HandlerFault>> + Send,
{
    FnHandler { f }
}

pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Vec<u8>, InvocationContext) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<Vec<u8>, HandlerFault>> + Send,
{
    async fn handle(
        &self,
        payload: Vec<u8>,
        ctx: &InvocationContext,
    ) -> std::result::Result<Vec<u8>, HandlerFault> {
        (self.f)(payload, ctx.clone()).await
    }
}

/// Adapt a typed async closure into a [`Handler`] with JSON payload
/// (de)serialization at the boundary. A payload that fails to deserialize is
/// an `Unhandled` fault: the failure happens before the handler body runs, so
/// it is not a deliberate handler decision.
pub fn json_handler<F, Fut, In, Out>(f: F) -> JsonHandler<F, In, Out>
where
    F: Fn(In, InvocationContext) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<Out, HandlerFault>> + Send,
    In: DeserializeOwned + Send,
    Out: Serialize,
{
    JsonHandler {
        f,
        _marker: PhantomData,
    }
}

pub struct JsonHandler<F, In, Out> {
    f: F,
    _marker: PhantomData<fn(In) -> Out>,
}

#[async_trait]
impl<F, Fut, In, Out> Handler for JsonHandler<F, In, Out>
where
    F: Fn(In, InvocationContext) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<Out, HandlerFault>> + Send,
    In: DeserializeOwned + Send,
    Out: Serialize,
{
    async fn handle(
        &self,
        payload: Vec<u8>,
        ctx: &InvocationContext,
    ) -> std::result::Result<Vec<u8>, HandlerFault> {
        let input: In = serde_json::from_slice(&payload).map_err(|e| {
            HandlerFault::unhandled(
                "SerializationException",
                format!("failed to deserialize invocation payload: {e}"),
            )
        })?;
        let output = (self.f)(input, ctx.clone()).await?;
        serde_json::to_vec(&output).map_err(|e| {
            HandlerFault::unhandled(
                "SerializationException",
                format!("failed to serialize handler response: {e}"),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FaultKind;
    use serde::Deserialize;
    use std::time::{Duration, Instant};

    fn test_ctx() -> InvocationContext {
        InvocationContext::new("req-1", "reverse", 128, Instant::now() + Duration::from_secs(3))
    }

    #[derive(Deserialize)]
    struct Input {
        #[serde(rename = "Data")]
        data: String,
    }

    #[derive(Serialize)]
    struct Output {
        #[serde(rename = "Reverse")]
        reverse: String,
    }

    #[tokio::test]
    async fn json_handler_round_trips_typed_payloads() {
        let handler = json_handler(|input: Input, _ctx| async move {
            Ok(Output {
                reverse: input.data.chars().rev().collect(),
            })
        });

        let response = handler
            .handle(br#"{"Data":"Bar"}"#.to_vec(), &test_ctx())
            .await
            .unwrap();
        assert_eq!(response, br#"{"Reverse":"raB"}"#);
    }

    #[tokio::test]
    async fn json_handler_reports_bad_payload_as_unhandled() {
        let handler = json_handler(|input: Input, _ctx| async move {
            Ok(Output {
                reverse: input.data,
            })
        });

        let fault = handler
            .handle(b"not json".to_vec(), &test_ctx())
            .await
            .unwrap_err();
        assert_eq!(fault.kind, FaultKind::Unhandled);
        assert_eq!(fault.error_type, "SerializationException");
    }

    #[tokio::test]
    async fn handler_fn_passes_raw_bytes_through() {
        let handler =
            handler_fn(|payload: Vec<u8>, _ctx| async move { Ok(payload) });

        let response = handler.handle(vec![1, 2, 3], &test_ctx()).await.unwrap();
        assert_eq!(response, vec![1, 2, 3]);
    }
}
