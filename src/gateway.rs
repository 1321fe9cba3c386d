//! Gateway connection manager.
//!
//! Owns the WebSocket to the realtime gateway and the single writer of the
//! connection state. The socket is split into a send task and a receive
//! task; the rest of the client talks to them only through channels.

use crate::error::{ClientError, Result};
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use voice_tutor_types::{ClientEvent, ConnectionState};

mod stats;
mod utils;

pub use stats::Stats;
pub use utils::gateway_url;

pub type ClientTx = mpsc::Sender<ClientEvent>;
/// Raw inbound text frames, in arrival order.
pub type InboundRx = mpsc::Receiver<String>;
pub type StateRx = watch::Receiver<ConnectionState>;

/// Write handle to an open channel.
///
/// Every send checks the connection state first and is rejected locally,
/// without touching the channel, unless the state is `connected`.
#[derive(Debug, Clone)]
pub struct Outbound {
    state: StateRx,
    tx: ClientTx,
}

impl Outbound {
    pub fn new(state: StateRx, tx: ClientTx) -> Self {
        Self { state, tx }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub async fn send(&self, event: ClientEvent) -> Result<()> {
        let state = self.state();
        if !state.is_connected() {
            tracing::debug!("rejecting {} while {}", event.kind(), state);
            return Err(ClientError::NotConnected(state));
        }
        self.tx
            .send(event)
            .await
            .map_err(|_| ClientError::ChannelClosed)
    }
}

/// Both halves of a freshly opened channel.
pub struct Connection {
    pub outbound: Outbound,
    pub inbound: InboundRx,
}

pub struct Gateway {
    capacity: usize,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    tasks: Vec<JoinHandle<()>>,
    stats: Arc<Mutex<Stats>>,
}

impl Gateway {
    pub fn new(capacity: usize) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            capacity: capacity.max(1),
            state_tx: Arc::new(state_tx),
            tasks: Vec::new(),
            stats: Arc::new(Mutex::new(Stats::new())),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> StateRx {
        self.state_tx.subscribe()
    }

    pub fn stats(&self) -> Stats {
        match self.stats.lock() {
            Ok(stats_guard) => stats_guard.clone(),
            Err(_) => {
                tracing::error!("failed to read stats");
                Stats::new()
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            tracing::info!("gateway {} -> {}", previous, state);
        }
    }

    /// Opens the channel at `url`.
    ///
    /// Moves the state to `connecting`, then `connected` on success or back to
    /// `disconnected` on failure. There is no reconnect: once the socket
    /// closes, the state stays `disconnected`.
    pub async fn connect(&mut self, url: &Url) -> Result<Connection> {
        if self.state() != ConnectionState::Disconnected {
            return Err(ClientError::AlreadyConnected);
        }
        self.abort_tasks();
        self.set_state(ConnectionState::Connecting);

        let request = match utils::build_request(url) {
            Ok(request) => request,
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(e.into());
            }
        };
        let ws_stream = match tokio_tungstenite::connect_async(request).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                tracing::error!("failed to connect to {}: {}", url, e);
                self.set_state(ConnectionState::Disconnected);
                return Err(e.into());
            }
        };

        // Before the tasks exist, so a socket that closes at once ends disconnected.
        self.set_state(ConnectionState::Connected);

        let (mut write, mut read) = ws_stream.split();
        let (c_tx, mut c_rx) = mpsc::channel::<ClientEvent>(self.capacity);
        let (s_tx, s_rx) = mpsc::channel::<String>(self.capacity);

        let state_tx = self.state_tx.clone();
        let stats = self.stats.clone();
        let send_handle = tokio::spawn(async move {
            while let Some(event) = c_rx.recv().await {
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!("failed to serialize event: {}", e);
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Text(text)).await {
                    tracing::error!("failed to send message: {}", e);
                    if let Ok(mut stats_guard) = stats.lock() {
                        stats_guard.record_send_failure();
                    }
                    state_tx.send_replace(ConnectionState::Disconnected);
                    break;
                }
                if let Ok(mut stats_guard) = stats.lock() {
                    stats_guard.record_sent();
                }
            }
        });

        let state_tx = self.state_tx.clone();
        let stats = self.stats.clone();
        let recv_handle = tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let message = match message {
                    Err(e) => {
                        tracing::error!("failed to read message: {}", e);
                        break;
                    }
                    Ok(message) => message,
                };
                match message {
                    Message::Text(text) => {
                        if let Ok(mut stats_guard) = stats.lock() {
                            stats_guard.record_received();
                        }
                        tracing::trace!("received frame: {} bytes", text.len());
                        if s_tx.send(text).await.is_err() {
                            tracing::debug!("inbound receiver dropped, stopping reader");
                            break;
                        }
                    }
                    Message::Binary(bin) => {
                        tracing::warn!("unexpected binary message: {} bytes", bin.len());
                        if let Ok(mut stats_guard) = stats.lock() {
                            stats_guard.record_binary();
                        }
                    }
                    Message::Close(reason) => {
                        tracing::info!("connection closed: {:?}", reason);
                        break;
                    }
                    _ => {}
                }
            }
            state_tx.send_replace(ConnectionState::Disconnected);
        });

        self.tasks.push(send_handle);
        self.tasks.push(recv_handle);

        Ok(Connection {
            outbound: Outbound::new(self.subscribe(), c_tx),
            inbound: s_rx,
        })
    }

    fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    /// Tears the channel down. Safe to call on every exit path.
    pub fn close(&mut self) {
        self.abort_tasks();
        self.set_state(ConnectionState::Disconnected);
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.close();
    }
}
