//! Async client for the synthd server.

use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::protocol::{
    methods, CompileRequest, CompileResponse, RequestEnvelope, ResponseEnvelope, StatusResponse,
};

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur while talking to the server.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The server could not be reached.
    #[error("failed to connect to server: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// The connection broke mid-request.
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    /// Request or response JSON was malformed.
    #[error("protocol error: {0}")]
    Json(#[from] serde_json::Error),

    /// The server closed the connection without answering.
    #[error("server closed the connection")]
    ConnectionClosed,

    /// No answer within the client timeout.
    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    /// The answer belongs to a different request.
    #[error("response id {got} does not match request id {expected}")]
    IdMismatch { expected: String, got: String },

    /// The server rejected the envelope.
    #[error("server error: {message} (code: {code})")]
    Remote { code: String, message: String },
}

/// One connection to a synthd server.
///
/// Requests on a connection are answered in order; use one client per
/// concurrent caller.
pub struct SynthesisClient {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
    timeout: Option<Duration>,
}

impl SynthesisClient {
    /// Connect to `addr`.
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> ClientResult<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(ClientError::ConnectFailed)?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            timeout: None,
        })
    }

    /// Bound how long a single request may take.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Submit HDL for synthesis.
    pub async fn compile(&mut self, request: &CompileRequest) -> ClientResult<CompileResponse> {
        self.request(methods::COMPILE, request).await
    }

    /// Query server capacity.
    pub async fn status(&mut self) -> ClientResult<StatusResponse> {
        self.request(methods::STATUS, serde_json::Value::Null).await
    }

    /// Send one envelope and wait for its answer.
    pub async fn request<P, R>(&mut self, method: &str, params: P) -> ClientResult<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = uuid::Uuid::new_v4().to_string();
        let envelope = RequestEnvelope {
            id: id.clone(),
            method: method.to_string(),
            params: serde_json::to_value(params)?,
        };

        let exchange = async {
            let line = serde_json::to_string(&envelope)? + "\n";
            self.writer.write_all(line.as_bytes()).await?;
            self.writer.flush().await?;

            let mut reply = String::new();
            if self.reader.read_line(&mut reply).await? == 0 {
                return Err(ClientError::ConnectionClosed);
            }
            Ok(serde_json::from_str::<ResponseEnvelope>(&reply)?)
        };

        let response = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .map_err(|_| ClientError::Timeout(limit.as_secs()))??,
            None => exchange.await?,
        };

        if !response.success {
            let error = response.error.unwrap_or_else(|| crate::protocol::ErrorInfo {
                code: "UNKNOWN".to_string(),
                message: "Unknown error".to_string(),
            });
            return Err(ClientError::Remote {
                code: error.code,
                message: error.message,
            });
        }

        if response.id != id {
            return Err(ClientError::IdMismatch {
                expected: id,
                got: response.id,
            });
        }

        let result = response.result.unwrap_or(serde_json::Value::Null);
        Ok(serde_json::from_value(result)?)
    }
}
