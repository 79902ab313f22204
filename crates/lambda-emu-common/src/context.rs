//! Per-invocation execution context handed to handler code.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Shared buffer of log lines emitted by one invocation. Cheap to clone;
/// clones share the same underlying buffer.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer {
    lines: Arc<Mutex<Vec<String>>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: String) {
        self.lines.lock().expect("log buffer poisoned").push(line);
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("log buffer poisoned").clone()
    }
}

/// Execution context for a single invocation. Exclusively owned by the
/// invocation that created it; carries the request id, the memory limit the
/// real service would advertise, and a monotonic deadline. Remaining time is
/// computed against that deadline, never re-derived from wall clock.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    request_id: String,
    function_name: String,
    invoked_function_arn: String,
    memory_limit_mb: u32,
    deadline: Instant,
    logs: LogBuffer,
}

impl InvocationContext {
    pub fn new(
        request_id: impl Into<String>,
        function_name: impl Into<String>,
        memory_limit_mb: u32,
        deadline: Instant,
    ) -> Self {
        let function_name = function_name.into();
        let invoked_function_arn = function_arn(&function_name);
        Self {
            request_id: request_id.into(),
            function_name,
            invoked_function_arn,
            memory_limit_mb,
            deadline,
            logs: LogBuffer::new(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    pub fn invoked_function_arn(&self) -> &str {
        &self.invoked_function_arn
    }

    pub fn memory_limit_mb(&self) -> u32 {
        self.memory_limit_mb
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline, saturating at zero.
    pub fn remaining_time(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Emit a log line on behalf of handler code. Lines go to `tracing` and
    /// are buffered for log-tail reporting.
    pub fn log(&self, line: impl Into<String>) {
        let line = line.into();
        tracing::info!(
            target: "lambda_emu::handler",
            request_id = %self.request_id,
            function = %self.function_name,
            "{line}"
        );
        self.logs.push(line);
    }

    pub fn log_lines(&self) -> Vec<String> {
        self.logs.lines()
    }
}

/// The emulated account/region every ARN is minted under.
pub fn function_arn(function_name: &str) -> String {
    format!("arn:aws:lambda:us-east-1:000000000000:function:{function_name}")
}

/// Produces the context for each invocation. Supplied through host settings
/// so tests can substitute fixed request ids or unbounded deadlines.
pub trait ContextFactory: Send + Sync {
    fn create(
        &self,
        request_id: String,
        function_name: &str,
        memory_limit_mb: u32,
        timeout: Duration,
    ) -> InvocationContext;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_time_counts_down_from_deadline() {
        let ctx = InvocationContext::new(
            "req-1",
            "echo",
            128,
            Instant::now() + Duration::from_secs(60),
        );
        let remaining = ctx.remaining_time();
        assert!(remaining <= Duration::from_secs(60));
        assert!(remaining > Duration::from_secs(59));
    }

    #[test]
    fn remaining_time_saturates_at_zero() {
        let ctx = InvocationContext::new("req-2", "echo", 128, Instant::now());
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(ctx.remaining_time(), Duration::ZERO);
    }

    #[test]
    fn log_lines_are_buffered_in_order() {
        let ctx = InvocationContext::new(
            "req-3",
            "echo",
            128,
            Instant::now() + Duration::from_secs(1),
        );
        ctx.log("first");
        ctx.log("second");
        assert_eq!(ctx.log_lines(), vec!["first", "second"]);
    }

    #[test]
    fn arn_embeds_function_name() {
        let ctx = InvocationContext::new(
            "req-4",
            "reverse",
            128,
            Instant::now() + Duration::from_secs(1),
        );
        assert!(ctx.invoked_function_arn().ends_with(":function:reverse"));
    }
}
