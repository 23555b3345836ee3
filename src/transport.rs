//! Line-delimited JSON RPC over TCP.
//!
//! One request line is answered by one response line; a connection may carry
//! any number of exchanges.

use crate::error::{Result, TnsError};
use crate::protocol::{Envelope, Request, Response};
use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Upper bound for a single encoded message
pub const MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

/// Inbound connections silent for this long are closed
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

fn codec() -> LinesCodec {
    LinesCodec::new_with_max_length(MAX_LINE_LENGTH)
}

pub struct RpcServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    idle_timeout: Duration,
}

impl RpcServer {
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("RPC server listening on: {}", local_addr);
        Ok(Self {
            listener,
            local_addr,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        })
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until `shutdown` is cancelled. Every decoded
    /// request is passed to `handler`.
    pub async fn serve<F, Fut>(self, handler: F, shutdown: CancellationToken) -> Result<()>
    where
        F: Fn(Request) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("RPC server on {} stopping", self.local_addr);
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!("New connection from: {}", peer);
                            let handler = handler.clone();
                            let shutdown = shutdown.clone();
                            let idle_timeout = self.idle_timeout;
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, handler, idle_timeout, shutdown).await {
                                    warn!("Error handling connection from {}: {}", peer, e);
                                }
                            });
                        }
                        Err(e) => error!("Failed to accept connection: {}", e),
                    }
                }
            }
        }
    }
}

async fn handle_connection<F, Fut>(
    stream: TcpStream,
    handler: F,
    idle_timeout: Duration,
    shutdown: CancellationToken,
) -> Result<()>
where
    F: Fn(Request) -> Fut,
    Fut: Future<Output = Response>,
{
    stream.set_nodelay(true)?;
    let mut framed = Framed::new(stream, codec());

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            next = timeout(idle_timeout, framed.next()) => match next {
                Ok(Some(line)) => line?,
                Ok(None) => return Ok(()),
                Err(_) => {
                    debug!("Closing connection idle for {:?}", idle_timeout);
                    return Ok(());
                }
            },
        };

        let response = match serde_json::from_str::<Envelope>(&line) {
            Ok(envelope) => match envelope.validate() {
                Ok(()) => handler(envelope.request).await,
                Err(e) => Response::error(e.to_string()),
            },
            Err(e) => Response::error(format!("malformed request: {}", e)),
        };

        timeout(idle_timeout, framed.send(serde_json::to_string(&response)?)).await??;
    }
}

/// Dials peers with bounded connect and IO time.
#[derive(Debug, Clone)]
pub struct RpcClient {
    sender_id: u64,
    connect_timeout: Duration,
    io_timeout: Duration,
}

impl RpcClient {
    pub fn new(sender_id: u64, connect_timeout: Duration, io_timeout: Duration) -> Self {
        Self {
            sender_id,
            connect_timeout,
            io_timeout,
        }
    }

    pub async fn call(&self, addr: &str, request: Request) -> Result<Response> {
        let stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TnsError::Timeout(format!("connect to {}", addr)))?
            .map_err(|e| TnsError::transport(format!("connect to {}: {}", addr, e)))?;
        stream.set_nodelay(true)?;
        let mut framed = Framed::new(stream, codec());

        let line = serde_json::to_string(&Envelope::new(self.sender_id, request))?;
        timeout(self.io_timeout, framed.send(line)).await??;

        let reply = timeout(self.io_timeout, framed.next())
            .await?
            .ok_or_else(|| TnsError::transport(format!("{} closed the connection", addr)))??;

        match serde_json::from_str::<Response>(&reply)? {
            Response::Error { message } => Err(TnsError::Protocol(message)),
            response => Ok(response),
        }
    }
}
