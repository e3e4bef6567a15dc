//! Server runtime
//!
//! [`ServerHandle`] wires the stores, session registry, OCPP WebSocket
//! listener and REST API together, runs them as background tasks and
//! coordinates their shutdown.

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::application::{CommandSender, SharedCommandSender};
use crate::config::AppConfig;
use crate::domain::RepositoryProvider;
use crate::infrastructure::{InMemoryAuthorizationStore, InMemoryRepositoryProvider};
use crate::interfaces::http::{create_api_router, ApiState};
use crate::interfaces::ws::OcppServer;
use crate::session::{SessionRegistry, SharedSessionRegistry};
use crate::support::shutdown::{listen_for_shutdown_signals, ShutdownSignal};

/// Options for starting the central system.
#[derive(Default)]
pub struct ServerOptions {
    pub config: AppConfig,
}

/// Handle to a running central system.
pub struct ServerHandle {
    pub repos: Arc<dyn RepositoryProvider>,
    pub session_registry: SharedSessionRegistry,
    pub command_sender: SharedCommandSender,
    pub config: AppConfig,
    /// Address the OCPP WebSocket listener is bound to
    pub ws_addr: SocketAddr,
    /// Address the REST API is bound to
    pub api_addr: SocketAddr,
    shutdown: ShutdownSignal,
    ws_task: JoinHandle<()>,
    api_task: JoinHandle<()>,
}

impl ServerHandle {
    /// Bind both listeners and start serving.
    pub async fn start(opts: ServerOptions) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let config = opts.config;
        config.validate()?;
        info!("Starting OCPP central system...");

        let prometheus_handle = prometheus_handle();

        // ── Stores ─────────────────────────────────────────────
        let id_tags = InMemoryAuthorizationStore::with_records(config.id_tags.clone());
        info!(count = id_tags.len(), "Authorization records loaded");
        let repos: Arc<dyn RepositoryProvider> = Arc::new(InMemoryRepositoryProvider::new(id_tags));

        // ── Sessions & commands ────────────────────────────────
        let session_registry = SessionRegistry::shared();
        let command_sender =
            CommandSender::shared(session_registry.clone(), config.ocpp.call_timeout());
        let shutdown = ShutdownSignal::new();

        // ── OCPP WebSocket server ──────────────────────────────
        let ws_listener = TcpListener::bind(config.server.ws_address()).await?;
        let ws_addr = ws_listener.local_addr()?;
        let server = Arc::new(OcppServer::new(
            config.ocpp.clone(),
            repos.clone(),
            session_registry.clone(),
            shutdown.clone(),
        ));
        info!("OCPP WebSocket server listening on ws://{}", ws_addr);
        info!("Charge points should connect to ws://{}/ocpp/{{charge_point_id}}", ws_addr);

        // ── REST API server ────────────────────────────────────
        let api_router = create_api_router(
            ApiState::new(
                session_registry.clone(),
                command_sender.clone(),
                repos.clone(),
            ),
            prometheus_handle,
        );
        let api_listener = TcpListener::bind(config.server.api_address()).await?;
        let api_addr = api_listener.local_addr()?;
        info!("REST API server listening on http://{}", api_addr);

        let api_shutdown = shutdown.clone();
        let api_server = axum::serve(api_listener, api_router).with_graceful_shutdown(async move {
            api_shutdown.wait().await;
            info!("REST API server received shutdown signal");
        });

        let ws_task = tokio::spawn(async move {
            if let Err(e) = server.serve(ws_listener).await {
                error!("WebSocket server error: {}", e);
            }
        });
        let api_task = tokio::spawn(async move {
            if let Err(e) = api_server.await {
                error!("REST API server error: {}", e);
            }
        });

        Ok(Self {
            repos,
            session_registry,
            command_sender,
            config,
            ws_addr,
            api_addr,
            shutdown,
            ws_task,
            api_task,
        })
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Trigger shutdown on SIGTERM / SIGINT.
    pub fn install_signal_handler(&self) {
        tokio::spawn(listen_for_shutdown_signals(self.shutdown.clone()));
    }

    pub fn trigger_shutdown(&self) {
        self.shutdown.trigger();
    }

    /// Wait for both servers to stop, bounded by `server.shutdown_timeout`.
    pub async fn wait(self) {
        let Self {
            session_registry,
            config,
            ws_task,
            api_task,
            ..
        } = self;

        info!("Waiting for server tasks to complete...");
        let timeout = Duration::from_secs(config.server.shutdown_timeout);
        let tasks = async move {
            if let Err(e) = ws_task.await {
                error!("WebSocket server task panicked: {}", e);
            }
            if let Err(e) = api_task.await {
                error!("REST API server task panicked: {}", e);
            }
        };

        if tokio::time::timeout(timeout, tasks).await.is_err() {
            warn!(
                remaining_sessions = session_registry.count(),
                "Shutdown timed out after {}s",
                timeout.as_secs()
            );
        }
        info!("OCPP central system shutdown complete");
    }

    /// Trigger shutdown and wait for completion.
    pub async fn shutdown(self) {
        info!("Shutting down OCPP central system...");
        self.trigger_shutdown();
        self.wait().await;
    }

    pub fn is_running(&self) -> bool {
        !self.ws_task.is_finished() || !self.api_task.is_finished()
    }
}

/// The global recorder can only be installed once per process; later
/// starts reuse it.
fn prometheus_handle() -> Option<PrometheusHandle> {
    static HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();
    HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                info!("Prometheus metrics recorder installed");
                Some(handle)
            }
            Err(e) => {
                warn!(error = %e, "Prometheus recorder unavailable, /metrics disabled");
                None
            }
        })
        .clone()
}

/// Initialise tracing from the logging config. `RUST_LOG` overrides the
/// configured level.
pub fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
