//! TCP front end.
//!
//! Accepts connections, reads newline-delimited request envelopes and answers
//! each one on the same connection. Every connection runs on its own task;
//! the [`CompileService`] admission gate is the only thing they share.

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::SynthesisError;
use crate::protocol::{
    codes, methods, CompileRequest, CompileResponse, RequestEnvelope, ResponseEnvelope,
};
use crate::service::CompileService;

/// Default longest request line (16 MiB).
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 16 * 1024 * 1024;

/// Listening compile server.
pub struct Server {
    listener: TcpListener,
    service: CompileService,
    max_request_bytes: usize,
}

impl Server {
    /// Bind to `addr`.
    pub async fn bind<A: ToSocketAddrs>(addr: A, service: CompileService) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            service,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
        })
    }

    /// Set the longest accepted request line.
    pub fn with_max_request_bytes(mut self, limit: usize) -> Self {
        self.max_request_bytes = limit;
        self
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until the process exits.
    pub async fn run(self) -> io::Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves, then drop in-flight connections.
    pub async fn run_until<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = self.local_addr()?;
        info!(%addr, "listening");

        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(in_flight = connections.len(), "shutting down");
                    break;
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            error!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    debug!(%peer, "connection opened");

                    let service = self.service.clone();
                    let limit = self.max_request_bytes;
                    connections.spawn(async move {
                        if let Err(e) = handle_connection(stream, service, limit).await {
                            warn!(%peer, error = %e, "connection error");
                        }
                        debug!(%peer, "connection closed");
                    });
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        connections.shutdown().await;
        Ok(())
    }
}

/// Serve one connection until the peer closes it.
async fn handle_connection(
    stream: TcpStream,
    service: CompileService,
    max_request_bytes: usize,
) -> io::Result<()> {
    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut writer = BufWriter::new(write_half);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let n = (&mut reader)
            .take(max_request_bytes as u64 + 1)
            .read_until(b'\n', &mut buf)
            .await?;
        if n == 0 {
            return Ok(());
        }

        let body = buf.strip_suffix(b"\n").unwrap_or(&buf);
        if body.len() > max_request_bytes {
            let response = ResponseEnvelope::error(
                "",
                codes::REQUEST_TOO_LARGE,
                format!("request exceeds {} bytes", max_request_bytes),
            );
            write_envelope(&mut writer, &response).await?;
            return Ok(());
        }

        let line = match std::str::from_utf8(body) {
            Ok(line) => line,
            Err(e) => {
                let response = ResponseEnvelope::error(
                    "",
                    codes::PARSE_ERROR,
                    format!("request is not valid UTF-8: {}", e),
                );
                write_envelope(&mut writer, &response).await?;
                continue;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let response = dispatch(&service, line).await;
        write_envelope(&mut writer, &response).await?;
    }
}

/// Decode one request line and route it to the service.
pub async fn dispatch(service: &CompileService, line: &str) -> ResponseEnvelope {
    let request: RequestEnvelope = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            let id = recover_id(line);
            return ResponseEnvelope::error(id, codes::PARSE_ERROR, e.to_string());
        }
    };

    match request.method.as_str() {
        methods::COMPILE => {
            let response = match serde_json::from_value::<CompileRequest>(request.params) {
                Ok(params) => service.compile(params).await,
                Err(e) => {
                    let err = SynthesisError::invalid_argument(format!(
                        "invalid compile request: {}",
                        e
                    ));
                    warn!(code = err.code(), error = %e, "rejected compile params");
                    CompileResponse::failure(err.to_response_message())
                }
            };
            ResponseEnvelope::ok(request.id, &response)
        }
        methods::STATUS => ResponseEnvelope::ok(request.id, &service.status()),
        other => ResponseEnvelope::error(
            request.id,
            codes::METHOD_NOT_FOUND,
            format!("unknown method: {}", other),
        ),
    }
}

/// Best-effort id extraction from a line that failed to decode as an envelope.
fn recover_id(line: &str) -> String {
    serde_json::from_str::<serde_json::Value>(line)
        .ok()
        .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(str::to_string))
        .unwrap_or_default()
}

async fn write_envelope<W>(writer: &mut W, response: &ResponseEnvelope) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_string(response).map_err(io::Error::other)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}
