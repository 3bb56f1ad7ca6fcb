//! # HTTP Server
//!
//! HTTP/1 server built on Hyper and Tokio that feeds requests into an
//! [`App`]. Implements graceful shutdown with signal handling.
//!
//! ## Key Features
//!
//! - Async request handling with Tokio runtime
//! - Graceful shutdown on Ctrl-C with a drain timeout
//! - Connection keep-alive support
//! - Body size limit enforced before the body is buffered

use crate::app::App;
use crate::error::{Error, Result};
use crate::request::Request;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// HTTP Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub address: SocketAddr,
    /// Enable keep-alive connections
    pub keep_alive: bool,
    /// Shutdown timeout for graceful shutdown (default: 30 seconds)
    pub shutdown_timeout: Duration,
    /// Max request body size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: ([127, 0, 0, 1], 8000).into(),
            keep_alive: true,
            shutdown_timeout: Duration::from_secs(30),
            max_body_size: 1024 * 1024,
        }
    }
}

/// HTTP front end for an [`App`]
pub struct Server {
    config: ServerConfig,
    app: Arc<App>,
}

impl Server {
    /// Create a server for `app`
    #[must_use]
    pub fn new(app: Arc<App>, config: ServerConfig) -> Self {
        Self { config, app }
    }

    /// Server settings taken from the app's configuration
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `server.address` is invalid.
    pub fn from_app(app: Arc<App>) -> Result<Self> {
        let config = app.config().server_config()?;
        Ok(Self::new(app, config))
    }

    /// Override the bind address
    #[must_use]
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.config.address = addr;
        self
    }

    /// Current configuration
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Start the server with graceful shutdown
    ///
    /// # Errors
    ///
    /// Returns `Error::BindError` if the socket can't be bound and
    /// `Error::Io` if accepting connections fails.
    pub async fn serve(&self) -> Result<()> {
        let addr = self.config.address;
        let bind_error = |source| Error::BindError {
            address: addr.to_string(),
            source,
        };

        let socket = if addr.is_ipv4() {
            tokio::net::TcpSocket::new_v4()
        } else {
            tokio::net::TcpSocket::new_v6()
        }
        .map_err(bind_error)?;
        socket.set_reuseaddr(true).map_err(bind_error)?;
        socket.bind(addr).map_err(bind_error)?;
        let listener = socket.listen(1024).map_err(bind_error)?;

        info!(address = %addr, routes = self.app.dispatcher().routes().len(), "Server listening");

        let active = Arc::new(AtomicUsize::new(0));
        let max_body_size = self.config.max_body_size;
        let keep_alive = self.config.keep_alive;

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    let (stream, remote_addr) = accept_result?;
                    let io = TokioIo::new(stream);
                    let app = Arc::clone(&self.app);
                    let active = Arc::clone(&active);

                    tokio::task::spawn(async move {
                        active.fetch_add(1, Ordering::Relaxed);

                        let service = service_fn(move |req| {
                            let app = Arc::clone(&app);
                            async move {
                                let method = req.method().clone();
                                let path = req.uri().path().to_string();
                                let response = handle_request(req, &app, max_body_size).await;
                                info!(
                                    remote = %remote_addr,
                                    method = %method,
                                    path = %path,
                                    status = response.status().as_u16(),
                                    "Request served"
                                );
                                Ok::<_, hyper::Error>(response)
                            }
                        });

                        if let Err(err) = http1::Builder::new()
                            .keep_alive(keep_alive)
                            .serve_connection(io, service)
                            .await
                        {
                            error!(remote = %remote_addr, error = %err, "Error serving connection");
                        }
                        active.fetch_sub(1, Ordering::Relaxed);
                    });
                }
                () = shutdown_signal() => {
                    info!("Shutdown signal received, stopping server");
                    break;
                }
            }
        }

        let drain = async {
            while active.load(Ordering::Relaxed) > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        if tokio::time::timeout(self.config.shutdown_timeout, drain).await.is_err() {
            warn!(
                remaining = active.load(Ordering::Relaxed),
                "Shutdown timeout reached with connections still open"
            );
        }
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
}

async fn handle_request(
    req: hyper::Request<hyper::body::Incoming>,
    app: &Arc<App>,
    max_body_size: usize,
) -> hyper::Response<Full<Bytes>> {
    let response = match Request::from_hyper_with_limit(req, max_body_size).await {
        Ok(request) => app.respond(request).await,
        Err(e) => app.error_response(&e, None),
    };
    response.into_hyper()
}

static REQUEST_COUNTER: AtomicUsize = AtomicUsize::new(1);

/// Unique-enough id for one request: time plus a process-wide counter
pub(crate) fn generate_request_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let counter = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{:x}-{:x}", now.as_nanos(), counter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::controller::Controllers;
    use crate::dispatch::Dispatcher;
    use crate::router::RouteTable;

    fn app() -> Arc<App> {
        let dispatcher = Dispatcher::new(RouteTable::new(), Controllers::new()).unwrap();
        Arc::new(App::new(Config::default(), dispatcher))
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.address.port(), 8000);
        assert!(config.keep_alive);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_from_app_uses_config() {
        let server = Server::from_app(app()).unwrap();
        assert_eq!(server.config().max_body_size, 1024 * 1024);

        let server = server.bind(([0, 0, 0, 0], 9001).into());
        assert_eq!(server.config().address.port(), 9001);
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = generate_request_id();
        let b = generate_request_id();
        assert_ne!(a, b);
        assert!(a.contains('-'));
    }

    #[tokio::test]
    async fn test_bind_error_reports_address() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap();

        let server = Server::new(
            app(),
            ServerConfig {
                address: addr,
                ..ServerConfig::default()
            },
        );
        let err = server.serve().await.unwrap_err();
        assert!(matches!(err, Error::BindError { address, .. } if address == addr.to_string()));
    }
}
