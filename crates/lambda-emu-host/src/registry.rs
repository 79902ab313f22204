//! Registry of locally-hosted functions.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use lambda_emu_common::{Handler, HostError, Result};

/// Default per-function timeout, matching the real service.
pub const DEFAULT_FUNCTION_TIMEOUT: Duration = Duration::from_secs(3);

/// Default per-function memory size in MB, matching the real service.
pub const DEFAULT_FUNCTION_MEMORY_MB: u32 = 128;

/// A locally-registered function: the routing key, the handler callable, and
/// the descriptor fields the wire surface reports back. Immutable once
/// registered; the registry owns it for the lifetime of the host.
pub struct FunctionRegistration {
    name: String,
    handler: Arc<dyn Handler>,
    handler_name: String,
    timeout: Duration,
    memory_mb: u32,
}

impl FunctionRegistration {
    pub fn new(name: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        Self {
            name: name.into(),
            handler,
            handler_name: "handler".to_string(),
            timeout: DEFAULT_FUNCTION_TIMEOUT,
            memory_mb: DEFAULT_FUNCTION_MEMORY_MB,
        }
    }

    /// Entry-point selector reported in the function descriptor. The handler
    /// callable is already bound, so this is informational, the way the real
    /// service echoes the configured handler string.
    pub fn with_handler_name(mut self, handler_name: impl Into<String>) -> Self {
        self.handler_name = handler_name.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_memory_mb(mut self, memory_mb: u32) -> Self {
        self.memory_mb = memory_mb;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn memory_mb(&self) -> u32 {
        self.memory_mb
    }
}

impl std::fmt::Debug for FunctionRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistration")
            .field("name", &self.name)
            .field("handler_name", &self.handler_name)
            .field("timeout", &self.timeout)
            .field("memory_mb", &self.memory_mb)
            .finish()
    }
}

/// Append-only map from function name to registration. Registration after
/// host start is allowed and synchronized against concurrent resolution.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: DashMap<String, Arc<FunctionRegistration>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, registration: FunctionRegistration) -> Result<()> {
        let name = registration.name().to_string();
        match self.functions.entry(name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(HostError::DuplicateFunction(name))
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(Arc::new(registration));
                Ok(())
            }
        }
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<FunctionRegistration>> {
        self.functions.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
