//! ProxyServer lifecycle and accept loop.

use super::handler::{handle_request, ProxyState};
use super::network::create_listener;
use crate::cache::MockCache;
use crate::config::{Config, ConfigError};
use crate::generator::MockGenerator;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("proxy server is already running")]
    AlreadyRunning,
}

/// Handles owned while the server is listening.
struct Running {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
    cleanup_task: Option<JoinHandle<()>>,
}

/// The proxy server.
///
/// Construction validates the configuration and builds every shared
/// component; [`start`](Self::start) binds the socket and [`stop`](Self::stop)
/// drains connections and clears the mock cache.
pub struct ProxyServer {
    config: Arc<Config>,
    state: Arc<ProxyState>,
    cache: Arc<MockCache>,
    running: Option<Running>,
}

impl ProxyServer {
    pub fn new(config: Config, generator: Arc<dyn MockGenerator>) -> Result<Self, ProxyError> {
        config.validate()?;

        let state = Arc::new(ProxyState::from_config(&config, generator)?);
        let cache = Arc::clone(state.cache());

        Ok(Self {
            config: Arc::new(config),
            state,
            cache,
            running: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &Arc<MockCache> {
        &self.cache
    }

    /// Bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Bind the listener and begin serving. Returns the bound address, which
    /// differs from the configured one when port 0 was requested.
    pub async fn start(&mut self) -> Result<SocketAddr, ProxyError> {
        if self.running.is_some() {
            return Err(ProxyError::AlreadyRunning);
        }

        let listen = &self.config.listen;
        let display_addr = format!("{}:{}", listen.host, listen.port);
        let bind_error = |source: std::io::Error| ProxyError::Bind {
            addr: display_addr.clone(),
            source,
        };

        let addr = tokio::net::lookup_host((listen.host.as_str(), listen.port))
            .await
            .map_err(bind_error)?
            .next()
            .ok_or_else(|| {
                bind_error(std::io::Error::new(
                    std::io::ErrorKind::AddrNotAvailable,
                    "host did not resolve to any address",
                ))
            })?;

        let listener = create_listener(addr).map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        info!("Listening on http://{}", local_addr);
        for route in self.state.routes.routes() {
            info!("Route {} -> {}", route.prefix(), route.target());
        }
        if let Some(ref path) = self.state.metrics_path {
            info!("Metrics available at {}", path);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let grace = Duration::from_secs(listen.shutdown_grace_secs);

        let accept_task = tokio::spawn(serve(
            listener,
            Arc::clone(&self.state),
            shutdown_rx.clone(),
            grace,
        ));

        let cleanup_task = match self.config.cache.cleanup_interval_secs {
            0 => None,
            secs => Some(tokio::spawn(cleanup_loop(
                Arc::clone(&self.cache),
                Duration::from_secs(secs),
                shutdown_rx,
            ))),
        };

        self.running = Some(Running {
            local_addr,
            shutdown_tx,
            accept_task,
            cleanup_task,
        });

        Ok(local_addr)
    }

    /// Stop accepting, give open connections the grace period, then clear the
    /// cache. A no-op when the server is not running.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            debug!("Stop requested but the proxy is not running");
            return;
        };

        info!("Stopping proxy on {}", running.local_addr);
        let _ = running.shutdown_tx.send(true);

        if let Err(e) = running.accept_task.await {
            error!("Accept loop ended abnormally: {}", e);
        }
        if let Some(cleanup) = running.cleanup_task {
            let _ = cleanup.await;
        }

        self.cache.clear();
        info!("Proxy stopped");
    }
}

async fn serve(
    listener: TcpListener,
    state: Arc<ProxyState>,
    mut shutdown_rx: watch::Receiver<bool>,
    grace: Duration,
) {
    let graceful = GracefulShutdown::new();
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, remote_addr) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                };

                let state = Arc::clone(&state);
                let service = service_fn(move |req: Request<Incoming>| {
                    let state = Arc::clone(&state);
                    async move { handle_request(&state, req).await }
                });
                let conn = graceful.watch(
                    http1::Builder::new().serve_connection(TokioIo::new(stream), service),
                );

                connections.spawn(async move {
                    if let Err(err) = conn.await {
                        debug!("Error serving connection from {}: {}", remote_addr, err);
                    }
                });
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            _ = shutdown_rx.changed() => break,
        }
    }

    drop(listener);

    match tokio::time::timeout(grace, graceful.shutdown()).await {
        Ok(()) => debug!("All connections closed"),
        Err(_) => {
            warn!(
                "{} connection(s) still open after {:?}, aborting",
                connections.len(),
                grace
            );
            connections.abort_all();
        }
    }
}

async fn cleanup_loop(
    cache: Arc<MockCache>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = cache.cleanup();
                if removed > 0 {
                    debug!("Cache cleanup removed {} expired entries", removed);
                }
            }
            _ = shutdown_rx.changed() => break,
        }
    }
}
