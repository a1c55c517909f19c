//! TCP server for the todo API.
//!
//! Accepts connections and hands each one to its own task, which reads a
//! single request, routes it, runs the handler and writes one response
//! before closing. There is no cap on concurrent connections beyond the
//! listen backlog, and no per-request timeout.

use crate::config::{Config, MIN_BACKLOG};
use crate::handlers;
use crate::http::{Request, Response};
use crate::router::{self, RouteError};
use crate::store::RecordStore;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

/// Server instance
pub struct Server {
    host: String,
    port: u16,
    backlog: u32,
    read_buffer_size: usize,
    store: Arc<dyn RecordStore>,
}

impl Server {
    pub fn new(config: &Config, store: Arc<dyn RecordStore>) -> Self {
        Server {
            host: config.host.clone(),
            port: config.port,
            backlog: config.backlog,
            read_buffer_size: config.read_buffer_size,
            store,
        }
    }

    /// Bind the listening socket. Must be called from within a tokio runtime.
    pub fn bind(&self) -> Result<TcpListener, ServerError> {
        let resolve_error = |e| ServerError::Resolve(format!("{}:{}", self.host, self.port), e);
        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(resolve_error)?
            .next()
            .ok_or_else(|| resolve_error(io::Error::new(io::ErrorKind::NotFound, "no address")))?;

        let listener = create_listener(addr, self.backlog).map_err(|e| ServerError::Bind(addr, e))?;
        TcpListener::from_std(listener).map_err(|e| ServerError::Bind(addr, e))
    }

    /// Bind and serve until `shutdown` flips to `true`.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), ServerError> {
        let listener = self.bind()?;
        self.serve(listener, shutdown).await;
        Ok(())
    }

    /// Accept loop. Returns once shutdown is requested; the listener is
    /// dropped (closed) on return. Workers already running are left to
    /// finish on their own.
    pub async fn serve(&self, listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
        if let Ok(addr) = listener.local_addr() {
            info!(address = %addr, "Server listening");
        }

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(peer = %peer, "New connection");

                        let store = Arc::clone(&self.store);
                        let read_buffer_size = self.read_buffer_size;

                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, peer, store, read_buffer_size).await {
                                debug!(peer = %peer, error = %e, "Connection error");
                            }
                        });
                    }
                    Err(e) => {
                        if *shutdown.borrow() {
                            break;
                        }
                        warn!(error = %e, "Failed to accept connection");
                    }
                }
            }
        }

        info!("Server shut down");
    }
}

/// Create a listening socket with SO_REUSEADDR (best effort) and the given
/// backlog.
fn create_listener(addr: SocketAddr, backlog: u32) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    if let Err(e) = socket.set_reuse_address(true) {
        warn!(error = %e, "Failed to set SO_REUSEADDR");
    }
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    let backlog = backlog.max(MIN_BACKLOG).min(i32::MAX as u32) as i32;
    socket.listen(backlog)?;

    Ok(socket.into())
}

/// Handle a single client connection: one read, one response, close.
///
/// The request must arrive in the first read of at most `read_buffer_size`
/// bytes; nothing after it is read.
async fn handle_connection<S>(
    mut stream: S,
    peer: SocketAddr,
    store: Arc<dyn RecordStore>,
    read_buffer_size: usize,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; read_buffer_size];
    let n = stream.read(&mut buffer).await?;
    if n == 0 {
        trace!(peer = %peer, "Connection closed by client");
        return Ok(());
    }

    let response = match Request::parse(&buffer[..n]) {
        Ok(request) => respond(request, store).await,
        Err(e) => {
            warn!(peer = %peer, error = %e, "Parse error");
            Response::error(400, "Bad Request")
        }
    };

    stream.write_all(&response.to_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

/// Route and run the handler. Store errors and handler panics become a
/// generic 500.
async fn respond(request: Request, store: Arc<dyn RecordStore>) -> Response {
    info!(method = %request.method_token, path = %request.target, "Processing request");
    debug!(
        content_type = request.header("Content-Type").unwrap_or("-"),
        body_len = request.body.len(),
        "Request details"
    );

    let route = match router::route(request.method, &request.target) {
        Ok(route) => route,
        Err(RouteError::NotFound) => return Response::error(404, "Not Found"),
        Err(RouteError::MethodNotAllowed) => return Response::error(405, "Method Not Allowed"),
    };

    // Store calls block; keep them off the async workers.
    let handled = tokio::task::spawn_blocking(move || {
        handlers::dispatch(&route, &request, store.as_ref())
    })
    .await;

    match handled {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            error!(error = %e, "Store operation failed");
            Response::internal_error()
        }
        Err(e) => {
            error!(error = %e, "Handler panicked");
            Response::internal_error()
        }
    }
}

/// Startup errors. All of them are fatal.
#[derive(Debug)]
pub enum ServerError {
    Resolve(String, io::Error),
    Bind(SocketAddr, io::Error),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::Resolve(addr, e) => write!(f, "Failed to resolve '{}': {}", addr, e),
            ServerError::Bind(addr, e) => write!(f, "Failed to listen on {}: {}", addr, e),
        }
    }
}

impl std::error::Error for ServerError {}
