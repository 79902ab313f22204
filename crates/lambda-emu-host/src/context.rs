//! Context factory implementations.

use std::time::{Duration, Instant};

use lambda_emu_common::{ContextFactory, InvocationContext};

/// Production factory: deadline = now + the function's configured timeout.
#[derive(Debug, Default)]
pub struct SystemContextFactory;

impl SystemContextFactory {
    pub fn new() -> Self {
        Self
    }
}

impl ContextFactory for SystemContextFactory {
    fn create(
        &self,
        request_id: String,
        function_name: &str,
        memory_limit_mb: u32,
        timeout: Duration,
    ) -> InvocationContext {
        InvocationContext::new(
            request_id,
            function_name,
            memory_limit_mb,
            Instant::now() + timeout,
        )
    }
}

/// Test factory: optionally pins the request id and ignores the configured
/// timeout so handlers under a debugger never hit the deadline.
#[derive(Debug, Default)]
pub struct StaticContextFactory {
    fixed_request_id: Option<String>,
}

impl StaticContextFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.fixed_request_id = Some(request_id.into());
        self
    }
}

impl ContextFactory for StaticContextFactory {
    fn create(
        &self,
        request_id: String,
        function_name: &str,
        memory_limit_mb: u32,
        _timeout: Duration,
    ) -> InvocationContext {
        let request_id = self
            .fixed_request_id
            .clone()
            .unwrap_or(request_id);
        InvocationContext::new(
            request_id,
            function_name,
            memory_limit_mb,
            Instant::now() + Duration::from_secs(24 * 60 * 60),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_factory_derives_deadline_from_timeout() {
        let ctx = SystemContextFactory::new().create(
            "req-1".to_string(),
            "echo",
            128,
            Duration::from_secs(3),
        );
        assert_eq!(ctx.request_id(), "req-1");
        assert!(ctx.remaining_time() <= Duration::from_secs(3));
        assert!(ctx.remaining_time() > Duration::from_secs(2));
    }

    #[test]
    fn static_factory_pins_request_id_and_ignores_timeout() {
        let factory = StaticContextFactory::new().with_request_id("fixed-id");
        let ctx = factory.create(
            "generated".to_string(),
            "echo",
            128,
            Duration::from_millis(1),
        );
        assert_eq!(ctx.request_id(), "fixed-id");
        assert!(ctx.remaining_time() > Duration::from_secs(3600));
    }
}
