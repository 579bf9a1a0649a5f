use axum::extract::ws::{Message as AxumMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use quickshare_transfer::{Channel, TransferError};
use quickshare_types::PeerMessage;

use crate::error::GatewayError;

fn encode(message: &PeerMessage) -> Result<String, TransferError> {
    message
        .to_json()
        .map_err(|e| TransferError::channel(format!("encode {}: {}", message.kind(), e)))
}

fn decode(text: &str) -> Result<PeerMessage, TransferError> {
    PeerMessage::from_json(text).map_err(|e| {
        debug!("bad frame: {}", text.chars().take(200).collect::<String>());
        TransferError::violation(format!("malformed frame: {}", e))
    })
}

/// Inbound socket accepted by the listener.
pub struct AxumChannel {
    socket: WebSocket,
    closed: bool,
}

impl AxumChannel {
    pub fn new(socket: WebSocket) -> Self {
        Self {
            socket,
            closed: false,
        }
    }
}

impl Channel for AxumChannel {
    async fn send(&mut self, message: PeerMessage) -> Result<(), TransferError> {
        if self.closed {
            return Err(TransferError::channel("channel closed"));
        }
        let text = encode(&message)?;
        self.socket
            .send(AxumMessage::Text(text.into()))
            .await
            .map_err(TransferError::channel)
    }

    async fn recv(&mut self) -> Option<Result<PeerMessage, TransferError>> {
        if self.closed {
            return None;
        }
        loop {
            match self.socket.recv().await? {
                Ok(AxumMessage::Text(text)) => return Some(decode(text.as_str())),
                Ok(AxumMessage::Binary(_)) => {
                    return Some(Err(TransferError::violation("unexpected binary frame")));
                }
                Ok(AxumMessage::Ping(_)) | Ok(AxumMessage::Pong(_)) => continue,
                Ok(AxumMessage::Close(_)) => {
                    self.closed = true;
                    return None;
                }
                Err(e) => return Some(Err(TransferError::channel(e))),
            }
        }
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self.socket.send(AxumMessage::Close(None)).await;
        }
    }
}

/// Outbound socket dialed with tokio-tungstenite.
pub struct TungsteniteChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

impl TungsteniteChannel {
    /// Dial `url` (e.g. `ws://host:3210/Ab3D-x9Yz`).
    pub async fn connect(url: &str) -> Result<Self, GatewayError> {
        let (stream, _) = tokio_tungstenite::connect_async(url).await?;
        info!("connected to {}", url);
        Ok(Self {
            stream,
            closed: false,
        })
    }
}

impl Channel for TungsteniteChannel {
    async fn send(&mut self, message: PeerMessage) -> Result<(), TransferError> {
        if self.closed {
            return Err(TransferError::channel("channel closed"));
        }
        let text = encode(&message)?;
        self.stream
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(TransferError::channel)
    }

    async fn recv(&mut self) -> Option<Result<PeerMessage, TransferError>> {
        if self.closed {
            return None;
        }
        loop {
            match self.stream.next().await? {
                Ok(WsMessage::Text(text)) => return Some(decode(text.as_str())),
                Ok(WsMessage::Binary(_)) => {
                    return Some(Err(TransferError::violation("unexpected binary frame")));
                }
                Ok(WsMessage::Close(_)) => {
                    self.closed = true;
                    return None;
                }
                Ok(_) => continue,
                Err(e) => return Some(Err(TransferError::channel(e))),
            }
        }
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self.stream.close(None).await;
        }
    }
}
