use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use crate::session::is_transport_error;
use crate::types::messages::{FunctionResponse, RealtimeInput, Setup, ToolResponse};
use crate::types::{Blob, ClientMessage, ServerMessage};

pub mod config;
mod consts;
mod utils;

pub use consts::{DEFAULT_MODEL, GEMINI_API_KEY};

pub type ClientTx = tokio::sync::mpsc::Sender<ClientMessage>;
type EventTx = tokio::sync::broadcast::Sender<SessionEvent>;
pub type EventRx = tokio::sync::broadcast::Receiver<SessionEvent>;

/// Transport-level view of inbound traffic. `Closed` is synthesized
/// when the read side ends, so the consumer observes remote close the
/// same way it observes messages.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Message(ServerMessage),
    Closed { reason: Option<String> },
}

/// Handles of the two transport tasks; aborting them releases the
/// socket.
pub struct Connection {
    send_handle: tokio::task::JoinHandle<()>,
    recv_handle: tokio::task::JoinHandle<()>,
}

impl Connection {
    pub fn abort(&self) {
        self.send_handle.abort();
        self.recv_handle.abort();
    }
}

/// Websocket client for the live inference endpoint. Outbound
/// messages flow through an mpsc channel into a dedicated send task;
/// inbound messages are parsed in a receive task and broadcast as
/// [`SessionEvent`]s.
pub struct Client {
    capacity: usize,
    config: config::Config,
    c_tx: Option<ClientTx>,
    e_tx: Option<EventTx>,
}

impl Client {
    fn new(capacity: usize, config: config::Config) -> Self {
        Self {
            capacity,
            config,
            c_tx: None,
            e_tx: None,
        }
    }

    async fn connect(&mut self) -> Result<Connection> {
        if self.c_tx.is_some() {
            anyhow::bail!("already connected");
        }

        let request = utils::build_request(&self.config).context("invalid endpoint request")?;
        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .context("failed to reach the live endpoint")?;

        let (mut write, mut read) = ws_stream.split();

        let (c_tx, mut c_rx) = tokio::sync::mpsc::channel::<ClientMessage>(self.capacity);
        let (e_tx, _) = tokio::sync::broadcast::channel(self.capacity);

        self.c_tx = Some(c_tx.clone());
        self.e_tx = Some(e_tx.clone());

        let send_events = e_tx.clone();
        let send_handle = tokio::spawn(async move {
            while let Some(message) = c_rx.recv().await {
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!("failed to serialize outbound message: {}", e);
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Text(text)).await {
                    let description = e.to_string();
                    if is_transport_error(&description) {
                        let _ = send_events.send(SessionEvent::Closed {
                            reason: Some(description),
                        });
                        break;
                    }
                    tracing::error!("failed to send message: {}", description);
                }
            }
        });

        let recv_handle = tokio::spawn(async move {
            let mut close_reason: Option<String> = None;
            while let Some(message) = read.next().await {
                match message {
                    Err(e) => {
                        close_reason = Some(e.to_string());
                        break;
                    }
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(message) => {
                            if e_tx.send(SessionEvent::Message(message)).is_err() {
                                tracing::debug!("no subscribers for inbound message");
                            }
                        }
                        Err(e) => {
                            tracing::warn!("failed to parse inbound message: {}, text=> {:?}", e, text);
                        }
                    },
                    Ok(Message::Close(frame)) => {
                        close_reason = frame.map(|f| f.reason.to_string());
                        break;
                    }
                    Ok(Message::Binary(bin)) => {
                        tracing::warn!("unexpected binary message ({} bytes)", bin.len());
                    }
                    Ok(_) => {}
                }
            }
            if e_tx
                .send(SessionEvent::Closed {
                    reason: close_reason,
                })
                .is_err()
            {
                tracing::debug!("no subscribers for close event");
            }
        });

        Ok(Connection {
            send_handle,
            recv_handle,
        })
    }

    /// Subscribes to inbound session events.
    pub fn events(&self) -> Result<EventRx> {
        match self.e_tx {
            Some(ref tx) => Ok(tx.subscribe()),
            None => anyhow::bail!("not connected yet"),
        }
    }

    pub(crate) fn sender(&self) -> Option<ClientTx> {
        self.c_tx.clone()
    }

    async fn send(&self, message: ClientMessage) -> Result<()> {
        match self.c_tx {
            Some(ref tx) => {
                tx.send(message)
                    .await
                    .map_err(|_| anyhow::anyhow!("outbound channel closed"))?;
                Ok(())
            }
            None => anyhow::bail!("not connected yet"),
        }
    }

    pub async fn send_setup(&self, setup: Setup) -> Result<()> {
        self.send(ClientMessage::Setup(setup)).await
    }

    pub async fn send_media_chunks(&self, chunks: Vec<Blob>) -> Result<()> {
        self.send(ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: chunks,
        }))
        .await
    }

    pub async fn send_tool_responses(&self, responses: Vec<FunctionResponse>) -> Result<()> {
        self.send(ClientMessage::ToolResponse(ToolResponse {
            function_responses: responses,
        }))
        .await
    }
}

pub async fn connect_with_config(
    capacity: usize,
    config: config::Config,
) -> Result<(Client, Connection)> {
    let mut client = Client::new(capacity, config);
    let connection = client.connect().await?;
    Ok((client, connection))
}

pub async fn connect() -> Result<(Client, Connection)> {
    let config = config::Config::new();
    connect_with_config(256, config).await
}
