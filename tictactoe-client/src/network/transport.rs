//! Transport Client
//!
//! One WebSocket connection, one request in flight. `send_request` takes
//! `&mut self`, so callers queue up in front of it (the network worker
//! does that for the app).

use std::time::Duration;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use tictactoe::network::protocol::{Request, Response};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Transport failures. Never retried here.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Channel closed (close frame, end of stream, or after `close()`).
    #[error("Connection closed")]
    Closed,
    /// Socket-level failure.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    /// Response frame was not valid JSON for a `Response`.
    #[error("Malformed response: {0}")]
    Malformed(#[source] serde_json::Error),
    /// Request could not be serialized.
    #[error("Failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),
    /// No response within the request timeout.
    #[error("No response within {0:?}")]
    Timeout(Duration),
    /// Connection could not be established.
    #[error("Could not connect to {url}: {reason}")]
    Connect {
        /// Target URL.
        url: String,
        /// Underlying cause.
        reason: String,
    },
}

impl TransportError {
    /// Whether the channel is unusable from now on.
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            TransportError::Closed | TransportError::WebSocket(_) | TransportError::Connect { .. }
        )
    }
}

/// Request/response channel to the server.
pub struct TransportClient {
    stream: Option<WsStream>,
    next_id: u64,
    request_timeout: Duration,
}

impl TransportClient {
    /// Open a connection.
    pub async fn connect(
        url: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let (stream, _) = match timeout(connect_timeout, connect_async(url)).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                return Err(TransportError::Connect { url: url.to_string(), reason: e.to_string() });
            }
            Err(_) => {
                return Err(TransportError::Connect {
                    url: url.to_string(),
                    reason: format!("timed out after {:?}", connect_timeout),
                });
            }
        };

        info!("Connected to {}", url);
        Ok(Self { stream: Some(stream), next_id: 0, request_timeout })
    }

    /// Whether the channel is still open.
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Send one request and wait for its response.
    pub async fn send_request(&mut self, mut request: Request) -> Result<Response, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;

        self.next_id += 1;
        request.id = self.next_id;
        let text = request.to_json().map_err(TransportError::Encode)?;
        debug!("Sending request {} {:?}", request.id, request.request_type);

        let result = match timeout(self.request_timeout, Self::exchange(stream, text, request.id)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.request_timeout)),
        };

        if let Err(e) = &result {
            if e.is_connection_lost() {
                warn!("Connection lost: {}", e);
                self.stream = None;
            }
        }
        result
    }

    async fn exchange(stream: &mut WsStream, text: String, id: u64) -> Result<Response, TransportError> {
        stream.send(Message::Text(text)).await?;

        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    let response = Response::from_json(&text).map_err(TransportError::Malformed)?;
                    if response.request_id == id {
                        return Ok(response);
                    }
                    // late answer to a request that already timed out
                    warn!("Skipping stale response {} while waiting for {}", response.request_id, id);
                }
                Some(Ok(Message::Close(_))) | None => return Err(TransportError::Closed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Close the channel. Safe to call more than once.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.close(None).await {
                debug!("Error while closing connection: {}", e);
            }
            info!("Connection closed");
        }
    }
}
