//! HTTP-facing invocation host.
//!
//! Embedding code configures a [`HostSettings`], starts an
//! [`InvocationHost`], and hands `service_url()` to anything that needs to
//! reach the invoke endpoint — a test client, or a container-orchestrated
//! collaborator that forwards event-source invocations here. The host never
//! tries to discover its own externally-reachable address; collaborators
//! receive the URL as configuration.

pub mod api;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use dashmap::DashMap;
use lambda_emu_common::{ContextFactory, HostError, Result};
use lambda_emu_host::{
    ConcurrencyLimiter, Dispatcher, FunctionRegistration, FunctionRegistry,
    SystemContextFactory, DEFAULT_ACCOUNT_CONCURRENCY_LIMIT,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use api::FunctionConfiguration;

/// Host configuration: listen address, account concurrency limit, context
/// factory, and the set of locally-registered functions.
pub struct HostSettings {
    listen_addr: SocketAddr,
    account_concurrency_limit: usize,
    context_factory: Arc<dyn ContextFactory>,
    registry: FunctionRegistry,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            // Port zero: the host binds a random free port; use
            // `InvocationHost::service_url` to reach it.
            listen_addr: ([127, 0, 0, 1], 0).into(),
            account_concurrency_limit: DEFAULT_ACCOUNT_CONCURRENCY_LIMIT,
            context_factory: Arc::new(SystemContextFactory::new()),
            registry: FunctionRegistry::new(),
        }
    }
}

impl HostSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = addr;
        self
    }

    pub fn with_account_concurrency_limit(mut self, limit: usize) -> Self {
        self.account_concurrency_limit = limit;
        self
    }

    pub fn with_context_factory(mut self, factory: Arc<dyn ContextFactory>) -> Self {
        self.context_factory = factory;
        self
    }

    /// Register a function before the host starts. Fails with
    /// [`HostError::DuplicateFunction`] if the name is already taken.
    pub fn add_function(self, registration: FunctionRegistration) -> Result<Self> {
        self.registry.register(registration)?;
        Ok(self)
    }
}

/// Shared application state behind the router.
#[derive(Clone)]
pub struct AppState {
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) registry: Arc<FunctionRegistry>,
    pub(crate) created: Arc<DashMap<String, FunctionConfiguration>>,
}

impl AppState {
    pub fn new(
        registry: Arc<FunctionRegistry>,
        limiter: Arc<ConcurrencyLimiter>,
        context_factory: Arc<dyn ContextFactory>,
    ) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher::new(
                registry.clone(),
                limiter,
                context_factory,
            )),
            registry,
            created: Arc::new(DashMap::new()),
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/2015-03-31/functions", post(api::create_function))
        .route(
            "/2015-03-31/functions/:function_name/invocations",
            post(api::invoke),
        )
        .route("/health", get(api::health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// A running invocation host bound to a local address.
///
/// Dropping the host triggers graceful shutdown; [`InvocationHost::shutdown`]
/// does the same but waits for the server task to finish.
pub struct InvocationHost {
    addr: SocketAddr,
    state: AppState,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl InvocationHost {
    pub async fn start(settings: HostSettings) -> Result<Self> {
        let registry = Arc::new(settings.registry);
        let limiter = ConcurrencyLimiter::new(settings.account_concurrency_limit);
        let state = AppState::new(registry, limiter, settings.context_factory);
        let app = create_app(state.clone());

        let listener = tokio::net::TcpListener::bind(settings.listen_addr).await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    // Resolves on explicit shutdown or when the host handle
                    // is dropped.
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = served {
                error!("invocation host server error: {e}");
            }
        });

        info!(%addr, functions = state.registry.len(), "invocation host listening");

        Ok(Self {
            addr,
            state,
            shutdown: Some(shutdown_tx),
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL of the invoke API, e.g. the value to hand a collaborator as
    /// its forward target.
    pub fn service_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Number of invocations currently holding a concurrency slot.
    pub fn in_flight(&self) -> usize {
        self.state.dispatcher.limiter().in_flight()
    }

    /// Stop accepting connections and wait for the server task to finish.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.task
            .await
            .map_err(|e| HostError::Internal(format!("server task failed: {e}")))
    }

    /// Run until the server task exits (e.g. on process signal handling done
    /// by the embedding binary).
    pub async fn wait(self) -> Result<()> {
        let InvocationHost {
            task,
            shutdown: _shutdown,
            ..
        } = self;
        task.await
            .map_err(|e| HostError::Internal(format!("server task failed: {e}")))
    }
}
