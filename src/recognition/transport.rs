//! Transports carrying requests to a recognizer
//!
//! The client drives a transport strictly one request at a time, so a
//! transport only needs to pair each request with the next response.

use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::RecognitionError;

use super::protocol::{ClientMessage, InferenceRequest, ServerMessage};

/// Connection to a chord recognizer
pub trait RecognizerTransport: Send {
    /// Establish (or re-establish) the connection.
    fn connect(&mut self) -> BoxFuture<'_, Result<(), RecognitionError>>;

    /// Send one request and wait for its response.
    ///
    /// A transport-class error means the connection is gone and `connect`
    /// must be called again.
    fn request<'a>(
        &'a mut self,
        request: &'a InferenceRequest,
    ) -> BoxFuture<'a, Result<ServerMessage, RecognitionError>>;

    /// Drop the connection, if any.
    fn close(&mut self) -> BoxFuture<'_, ()>;

    fn name(&self) -> &'static str;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// JSON-over-WebSocket transport
pub struct WebSocketTransport {
    url: String,
    stream: Option<WsStream>,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            stream: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn lost(&mut self, reason: impl Into<String>) -> RecognitionError {
        self.stream = None;
        RecognitionError::TransportFailure {
            reason: reason.into(),
        }
    }
}

impl RecognizerTransport for WebSocketTransport {
    fn connect(&mut self) -> BoxFuture<'_, Result<(), RecognitionError>> {
        Box::pin(async move {
            self.stream = None;
            let (stream, _response) = connect_async(self.url.as_str()).await.map_err(|err| {
                RecognitionError::TransportFailure {
                    reason: format!("{}: {}", self.url, err),
                }
            })?;
            tracing::info!("[RecognitionClient] WebSocket connected to {}", self.url);
            self.stream = Some(stream);
            Ok(())
        })
    }

    fn request<'a>(
        &'a mut self,
        request: &'a InferenceRequest,
    ) -> BoxFuture<'a, Result<ServerMessage, RecognitionError>> {
        Box::pin(async move {
            let text = ClientMessage::InferenceRequest(request.clone()).to_json()?;

            let Some(stream) = self.stream.as_mut() else {
                return Err(self.lost("not connected"));
            };
            if let Err(err) = stream.send(Message::Text(text)).await {
                return Err(self.lost(err.to_string()));
            }

            loop {
                let Some(stream) = self.stream.as_mut() else {
                    return Err(self.lost("not connected"));
                };
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => return ServerMessage::from_json(&text),
                    Some(Ok(Message::Binary(bytes))) => {
                        let text = String::from_utf8_lossy(&bytes);
                        return ServerMessage::from_json(&text);
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| format!("closed by peer ({}): {}", f.code, f.reason))
                            .unwrap_or_else(|| "closed by peer".to_string());
                        return Err(self.lost(reason));
                    }
                    // Control frames are answered by tungstenite itself.
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => return Err(self.lost(err.to_string())),
                    None => return Err(self.lost("stream ended")),
                }
            }
        })
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if let Some(mut stream) = self.stream.take() {
                if let Err(err) = stream.close(None).await {
                    tracing::debug!("[RecognitionClient] Close handshake failed: {}", err);
                }
            }
        })
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}
