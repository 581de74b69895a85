//! Core relay server implementation.
//!
//! This module contains the main `StarsServer` struct: it loads the
//! configuration resources, binds the listening socket and hands both to the
//! concurrency adapter selected in the configuration.

use crate::{
    config::{ConcurrencyMode, ServerConfig},
    error::ServerError,
    messaging::Router,
    resources::LibraryResources,
    server::{event_loop::EventLoop, workers::Workers, SessionSettings},
    shutdown::ShutdownState,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::Duration;
use tracing::info;

/// The core relay server structure.
///
/// `StarsServer` ties the router to a listening socket. All session state
/// lives in the [`Router`]; the server only decides which adapter drives it.
///
/// # Architecture
///
/// * **Router**: node directory, permission filter, aliases, subscriptions
/// * **Event loop adapter**: one task multiplexes every socket, no locks
/// * **Worker adapter**: reader/writer tasks per connection, one shared mutex
pub struct StarsServer {
    /// Server configuration settings
    config: ServerConfig,

    /// Shutdown state used by [`StarsServer::start`] and [`StarsServer::shutdown`]
    shutdown_state: ShutdownState,
}

impl StarsServer {
    /// Creates a new relay server with the specified configuration.
    ///
    /// Nothing is loaded or bound until the server is started.
    ///
    /// # Arguments
    ///
    /// * `config` - Configuration parameters for server behavior
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            shutdown_state: ShutdownState::new(),
        }
    }

    /// Starts the server and runs until the given shutdown state is triggered.
    ///
    /// # Arguments
    ///
    /// * `shutdown_state` - Shared shutdown state for coordinating graceful shutdown
    ///
    /// # Returns
    ///
    /// `Ok(())` if the server started and stopped cleanly, or a `ServerError`
    /// if the configuration is invalid, a resource cannot be loaded or the
    /// socket cannot be bound.
    pub async fn start_with_shutdown_state(&self, shutdown_state: ShutdownState) -> Result<(), ServerError> {
        self.start_internal(shutdown_state).await
    }

    /// Starts the server and runs until [`StarsServer::shutdown`] is called.
    pub async fn start(&self) -> Result<(), ServerError> {
        self.start_internal(self.shutdown_state.clone()).await
    }

    async fn start_internal(&self, shutdown_state: ShutdownState) -> Result<(), ServerError> {
        self.config.validate()?;
        let listener = TcpListener::bind(self.config.bind_address)
            .await
            .map_err(|e| {
                ServerError::Network(format!("Failed to bind {}: {e}", self.config.bind_address))
            })?;
        self.serve(listener, shutdown_state).await
    }

    /// Serves connections from an already bound listener.
    ///
    /// # Startup Sequence
    ///
    /// 1. Load command permissions, aliases and reconnect permissions
    /// 2. Run the configured concurrency adapter until shutdown is initiated
    /// 3. Drop every remaining connection and mark shutdown complete
    pub async fn serve(&self, listener: TcpListener, shutdown_state: ShutdownState) -> Result<(), ServerError> {
        let router = self.build_router()?;
        let local_addr = listener.local_addr()?;
        info!("🚀 Starting STARS server on {}", local_addr);
        info!("📁 Library directory: {}", self.config.library_dir.display());

        let settings = SessionSettings::from_config(&self.config);
        match self.config.mode {
            ConcurrencyMode::EventLoop => {
                EventLoop::new(router, settings)
                    .run(listener, shutdown_state.clone())
                    .await
            }
            ConcurrencyMode::Workers => {
                Workers::run(
                    router,
                    listener,
                    shutdown_state.clone(),
                    settings,
                    Duration::from_millis(self.config.supervisor_interval_ms),
                )
                .await
            }
        }

        shutdown_state.complete_shutdown();
        info!("Server stopped");
        Ok(())
    }

    /// Creates a router over the configured library and loads its resources.
    pub fn build_router(&self) -> Result<Router, ServerError> {
        let resources = Arc::new(LibraryResources::new(
            self.config.library_dir.clone(),
            self.config.effective_key_dir(),
        ));
        let mut router = Router::new(resources);
        router.startup()?;
        Ok(router)
    }

    /// Initiates server shutdown.
    ///
    /// Only affects a server started with [`StarsServer::start`].
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        info!("🛑 Shutting down server...");
        self.shutdown_state.initiate_shutdown();
        Ok(())
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}
