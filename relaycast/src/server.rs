//! Server lifecycle management
//!
//! Starts the HTTP server and supervises it until a shutdown signal
//! arrives or the SFU worker dies. Teardown order: recordings first (so
//! ffmpeg children are reaped and their relay transports released), SFU
//! rooms second. Worker death is fatal; teardown is bounded by the
//! configured grace period and the process exits non-zero.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use relaycast_api::create_router;
use relaycast_core::Config;
use relaycast_session::{ChatChannel, SignalingHub};
use relaycast_sfu::{RecordingManager, SfuManager, Worker};

/// Container for shared services
#[derive(Clone)]
pub struct Services {
    pub hub: Arc<SignalingHub>,
    pub chat: Arc<ChatChannel>,
    pub sfu_manager: Option<Arc<SfuManager>>,
    pub recording_manager: Option<Arc<RecordingManager>>,
}

/// `RelayCast` server - manages the HTTP listener and component lifecycles
pub struct RelayCastServer {
    config: Config,
    services: Services,
}

impl RelayCastServer {
    /// Create a new server instance
    pub const fn new(config: Config, services: Services) -> Self {
        Self { config, services }
    }

    /// Start the HTTP server and wait for a shutdown condition
    pub async fn start(self) -> anyhow::Result<()> {
        info!("Starting RelayCast server...");

        // Create shutdown signal channel
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        if self.services.sfu_manager.is_some() {
            info!("SFU control plane: enabled");
        }
        if self.services.recording_manager.is_some() {
            info!("Recording bridge: enabled");
        }

        let mut http_handle = self.start_http_server(shutdown_rx.clone())?;
        let worker = self.services.sfu_manager.as_ref().map(|sfu| sfu.worker());

        info!("All servers started successfully");

        // Wait for the server to stop, the worker to die, or a signal
        let mut http_done = false;
        let fatal_reason = tokio::select! {
            _ = &mut http_handle => {
                error!("HTTP server stopped unexpectedly");
                http_done = true;
                None
            }
            reason = worker_death(worker) => {
                error!(reason = %reason, "SFU worker died, service cannot continue");
                Some(reason)
            }
            () = shutdown_signal() => {
                info!("Shutdown signal received, starting graceful shutdown...");
                None
            }
        };

        // Signal all components to shut down
        let _ = shutdown_tx.send(true);

        if let Some(reason) = fatal_reason {
            // Teardown is bounded by the grace period; the process exits
            // when it elapses
            let grace = Duration::from_millis(self.config.sfu.worker_exit_grace_ms);
            let (teardown, ()) = tokio::join!(
                tokio::time::timeout(grace, self.shutdown()),
                tokio::time::sleep(grace),
            );
            if teardown.is_err() {
                warn!("Component teardown incomplete at the end of the grace period");
            }
            anyhow::bail!("SFU worker died: {reason}");
        }

        // Run graceful shutdown, then let axum finish in-flight
        // responses before the process exits
        self.shutdown().await;
        if !http_done {
            let drain = Duration::from_secs(5);
            if tokio::time::timeout(drain, &mut http_handle).await.is_err() {
                warn!("HTTP server still serving after {}s, abandoning it", drain.as_secs());
                http_handle.abort();
            }
        }

        Ok(())
    }

    /// Gracefully shut down all server components
    async fn shutdown(&self) {
        info!("Shutting down RelayCast server...");

        // 1. Wait for open signaling connections to close (with timeout).
        //    Skipped when the worker is dead: teardown must fit the grace
        //    period.
        let worker_alive = self
            .services
            .sfu_manager
            .as_ref()
            .map_or(true, |sfu| sfu.worker().is_alive());
        let active = self.services.hub.connection_count();
        if worker_alive && active > 0 {
            let drain_timeout = Duration::from_secs(5);
            let drain_poll_interval = Duration::from_millis(250);
            info!(
                "Waiting up to {}s for {} signaling connection(s) to close...",
                drain_timeout.as_secs(),
                active
            );
            let deadline = tokio::time::Instant::now() + drain_timeout;
            loop {
                let remaining = self.services.hub.connection_count();
                if remaining == 0 {
                    info!("All signaling connections closed");
                    break;
                }
                if tokio::time::Instant::now() >= deadline {
                    warn!(
                        "Drain timeout reached with {} connection(s) still open, proceeding with shutdown",
                        remaining
                    );
                    break;
                }
                tokio::time::sleep(drain_poll_interval).await;
            }
        }

        // 2. Stop recordings so ffmpeg children are reaped and their
        //    relay transports released before rooms close
        if let Some(ref recording) = self.services.recording_manager {
            let jobs = recording.job_count();
            if jobs > 0 {
                info!("Stopping {} active recording(s)...", jobs);
            }
            recording.stop_all().await;
        }

        // 3. Close every SFU room (cascades to transports, producers,
        //    consumers)
        if let Some(ref sfu) = self.services.sfu_manager {
            info!("Shutting down SFU manager...");
            sfu.shutdown();
        }

        info!("RelayCast server shut down complete");
    }

    /// Start the HTTP server with graceful shutdown support
    fn start_http_server(&self, shutdown_rx: watch::Receiver<bool>) -> anyhow::Result<JoinHandle<()>> {
        let http_address = self.config.http_address();
        let router = create_router(
            Arc::new(self.config.clone()),
            self.services.hub.clone(),
            self.services.chat.clone(),
            self.services.sfu_manager.clone(),
            self.services.recording_manager.clone(),
        );

        let handle = tokio::spawn(async move {
            let http_addr: std::net::SocketAddr = match http_address.parse() {
                Ok(addr) => addr,
                Err(e) => {
                    error!("Invalid HTTP address '{}': {}", http_address, e);
                    return;
                }
            };

            let listener = match tokio::net::TcpListener::bind(http_addr).await {
                Ok(listener) => listener,
                Err(e) => {
                    error!("Failed to bind HTTP address {}: {}", http_addr, e);
                    return;
                }
            };

            info!("HTTP server listening on {}", http_addr);

            let mut rx = shutdown_rx;
            let graceful = async move {
                let _ = rx.changed().await;
            };

            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(graceful)
                .await
            {
                error!("HTTP server error: {}", e);
            }

            info!("HTTP server shut down gracefully");
        });

        Ok(handle)
    }
}

/// Resolves with the death reason once the SFU worker dies. Pends
/// forever when the SFU is disabled.
async fn worker_death(worker: Option<Arc<Worker>>) -> String {
    let Some(worker) = worker else {
        return std::future::pending::<String>().await;
    };
    let mut rx = worker.subscribe();
    loop {
        if *rx.borrow_and_update() {
            return worker
                .death_reason()
                .unwrap_or_else(|| "unknown".to_string());
        }
        if rx.changed().await.is_err() {
            // Sender gone means the manager itself was dropped
            return std::future::pending::<String>().await;
        }
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C"); }
        () = terminate => { info!("Received SIGTERM"); }
    }
}
