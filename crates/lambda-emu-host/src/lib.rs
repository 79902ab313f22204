//! The invocation engine: function registry, account-wide concurrency
//! limiter, and the dispatcher that runs handler code under a deadline.

pub mod context;
pub mod dispatcher;
pub mod limiter;
pub mod registry;

pub use context::{StaticContextFactory, SystemContextFactory};
pub use dispatcher::{DispatchResult, Dispatcher};
pub use limiter::{ConcurrencyLimiter, ConcurrencySlot};
pub use registry::{FunctionRegistration, FunctionRegistry};

/// Default account-wide concurrency limit, matching the real service's
/// default account quota.
pub const DEFAULT_ACCOUNT_CONCURRENCY_LIMIT: usize = 1000;
