//! Invocation dispatch: admission, execution under a deadline, and
//! conversion of every completion into a single tagged outcome.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use lambda_emu_common::{
    ContextFactory, HandlerFault, HostFault, InvocationOutcome,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::limiter::ConcurrencyLimiter;
use crate::registry::FunctionRegistry;

/// Completion of one dispatch: the request id the context carried, the
/// outcome, and the log lines the handler emitted through its context.
#[derive(Debug)]
pub struct DispatchResult {
    pub request_id: String,
    pub outcome: InvocationOutcome,
    pub log_lines: Vec<String>,
}

impl DispatchResult {
    fn host_error(request_id: String, fault: HostFault) -> Self {
        Self {
            request_id,
            outcome: InvocationOutcome::HostError(fault),
            log_lines: Vec::new(),
        }
    }
}

/// Resolves a function name, runs its handler against a fresh context, and
/// reports completion as an [`InvocationOutcome`]. Handler failures never
/// cross this boundary as panics or errors; they become tagged outcomes.
pub struct Dispatcher {
    registry: Arc<FunctionRegistry>,
    limiter: Arc<ConcurrencyLimiter>,
    context_factory: Arc<dyn ContextFactory>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<FunctionRegistry>,
        limiter: Arc<ConcurrencyLimiter>,
        context_factory: Arc<dyn ContextFactory>,
    ) -> Self {
        Self {
            registry,
            limiter,
            context_factory,
        }
    }

    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    pub fn limiter(&self) -> &Arc<ConcurrencyLimiter> {
        &self.limiter
    }

    pub async fn dispatch(&self, function_name: &str, payload: Vec<u8>) -> DispatchResult {
        let request_id = Uuid::new_v4().to_string();

        // Admission: slot first, then resolution. A throttled invocation is
        // terminal before anything ran and holds no slot.
        let Some(_slot) = self.limiter.try_acquire() else {
            warn!(
                function = %function_name,
                limit = self.limiter.limit(),
                "invocation throttled"
            );
            return DispatchResult::host_error(request_id, HostFault::Throttled);
        };

        let Some(registration) = self.registry.resolve(function_name) else {
            debug!(function = %function_name, "invocation for unknown function");
            return DispatchResult::host_error(
                request_id,
                HostFault::NotFound(function_name.to_string()),
            );
        };

        let ctx = self.context_factory.create(
            request_id,
            registration.name(),
            registration.memory_mb(),
            registration.timeout(),
        );
        // The factory may pin its own request id; report the one the
        // handler actually saw.
        let request_id = ctx.request_id().to_string();

        debug!(
            request_id = %request_id,
            function = %registration.name(),
            in_flight = self.limiter.in_flight(),
            "invocation running"
        );

        let run = AssertUnwindSafe(registration.handler().handle(payload, &ctx)).catch_unwind();
        let outcome = match tokio::time::timeout(ctx.remaining_time(), run).await {
            Ok(Ok(Ok(response))) => InvocationOutcome::Success(response),
            Ok(Ok(Err(fault))) => {
                debug!(
                    request_id = %request_id,
                    function = %registration.name(),
                    error_type = %fault.error_type,
                    kind = fault.kind.as_str(),
                    "handler returned a fault"
                );
                InvocationOutcome::HandlerError(fault)
            }
            Ok(Err(panic)) => {
                let message = panic_message(panic);
                warn!(
                    request_id = %request_id,
                    function = %registration.name(),
                    "handler panicked: {message}"
                );
                InvocationOutcome::HandlerError(HandlerFault::unhandled(
                    "Runtime.ExitError",
                    message,
                ))
            }
            Err(_elapsed) => {
                // The handler future was dropped at the deadline; the caller
                // is not kept waiting past it.
                warn!(
                    request_id = %request_id,
                    function = %registration.name(),
                    timeout_ms = registration.timeout().as_millis() as u64,
                    "invocation deadline exceeded"
                );
                InvocationOutcome::HostError(HostFault::Timeout {
                    request_id: request_id.clone(),
                    timeout: registration.timeout(),
                })
            }
        };

        // `_slot` drops here on every path, releasing the reservation.
        DispatchResult {
            request_id,
            outcome,
            log_lines: ctx.log_lines(),
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
