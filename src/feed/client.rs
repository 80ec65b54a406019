//! WebSocket connection to the exchange depth stream

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::{L3BookError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One depth-stream subscription
pub struct FeedClient {
    stream: Option<WsStream>,
    endpoint: String,
    symbol: String,
}

impl FeedClient {
    pub fn new(endpoint: &str, symbol: &str) -> Self {
        Self {
            stream: None,
            endpoint: endpoint.to_string(),
            symbol: symbol.to_string(),
        }
    }

    /// Open the stream for this client's symbol
    pub async fn connect(&mut self) -> Result<()> {
        let url = format!(
            "{}/ws/{}@depth@100ms",
            self.endpoint,
            self.symbol.to_lowercase()
        );
        info!(url = %url, "connecting to depth stream");

        let (stream, response) = connect_async(&url).await?;
        info!(status = ?response.status(), "depth stream connected");
        self.stream = Some(stream);
        Ok(())
    }

    /// Wait for the next data payload, answering pings and skipping other
    /// control frames along the way
    pub async fn next_text(&mut self) -> Result<String> {
        loop {
            let Some(stream) = self.stream.as_mut() else {
                return Err(L3BookError::WebSocketConnection("not connected".into()));
            };

            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text),
                Some(Ok(Message::Binary(data))) => {
                    return Ok(String::from_utf8_lossy(&data).into_owned())
                }
                Some(Ok(Message::Ping(payload))) => {
                    debug!("answering ping");
                    stream.send(Message::Pong(payload)).await?;
                }
                Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    warn!(frame = ?frame, "server closed the stream");
                    self.stream = None;
                    return Err(L3BookError::WebSocketConnection("connection closed".into()));
                }
                Some(Err(e)) => {
                    self.stream = None;
                    return Err(L3BookError::WebSocketMessage(e.to_string()));
                }
                None => {
                    self.stream = None;
                    return Err(L3BookError::WebSocketConnection("stream ended".into()));
                }
            }
        }
    }

    /// Probe the connection
    pub async fn ping(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.as_mut() {
            stream
                .send(Message::Ping(vec![]))
                .await
                .map_err(|e| L3BookError::WebSocketMessage(e.to_string()))?;
        }
        Ok(())
    }

    /// Tear the connection down
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
        }
    }
}
