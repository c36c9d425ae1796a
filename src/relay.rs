//! Network relay
//!
//! Accepts TCP connections, reads one command line per connection, hands it
//! to the executor and writes back `success` or `fail`. Error detail never
//! crosses the wire.

use crate::error::ApiError;
use crate::executor::{ExecutorHandle, Reply};
use std::future::Future;
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Longest command line accepted from a client
pub const MAX_LINE_BYTES: u64 = 64 * 1024;

pub struct Relay {
    listener: TcpListener,
    executor: ExecutorHandle,
}

impl Relay {
    pub async fn bind(addr: &str, executor: ExecutorHandle) -> Result<Self, ApiError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ApiError::io(format!("bind relay to {}", addr), e))?;
        Ok(Self { listener, executor })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ApiError> {
        self.listener
            .local_addr()
            .map_err(|e| ApiError::io("relay local address", e))
    }

    /// Accept connections until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> Result<(), ApiError>
    where
        F: Future<Output = ()>,
    {
        info!(addr = %self.local_addr()?, "Relay listening");
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!(error = %e, "Failed to accept relay connection");
                            continue;
                        }
                    };
                    let executor = self.executor.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(stream, executor).await {
                            warn!(peer = %peer, error = %e, "Relay connection failed");
                        }
                    });
                }
                _ = &mut shutdown => {
                    info!("Relay shutting down");
                    break;
                }
            }
        }
        Ok(())
    }
}

async fn serve_connection(stream: TcpStream, executor: ExecutorHandle) -> Result<(), ApiError> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half.take(MAX_LINE_BYTES));
    let mut line = String::new();
    let read = reader
        .read_line(&mut line)
        .await
        .map_err(|e| ApiError::io("read command line", e))?;

    let reply = if read == 0 || !line.ends_with('\n') {
        debug!(bytes = read, "Incomplete command line");
        Reply::Fail
    } else {
        executor.request(line.trim_end()).await
    };

    write_half
        .write_all(format!("{}\n", reply).as_bytes())
        .await
        .map_err(|e| ApiError::io("write reply", e))?;
    write_half
        .shutdown()
        .await
        .map_err(|e| ApiError::io("close connection", e))
}
