//! Realtime Channel.
//!
//! One WebSocket per open conversation, carrying the session token and the
//! conversation id as query parameters. The transport runs on its own tokio
//! task and reports back over an mpsc channel, the same command/notification
//! split the rest of the client uses.
//!
//! ```text
//! Disconnected --subscribe--> Connecting --handshake ok--> Connected
//!      ^                          |                           |
//!      +------ handshake failed --+------ close / error ------+
//! ```
//!
//! Nothing reconnects on its own; the caller decides.

use std::sync::{Arc, Mutex};

use futures::{SinkExt, StreamExt};
use reqwest::Url;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use textchat_shared::constants::{WS_PARAM_CHAT_ID, WS_PARAM_TOKEN};
use textchat_shared::{DecodeError, RealtimeEvent};
use textchat_store::SessionStore;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

const NOTIFICATION_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

/// What the transport task reports to the subscriber.
#[derive(Debug, Clone)]
pub enum ChannelNotification {
    Connected,
    Event(RealtimeEvent),
    /// The connection never opened.
    HandshakeFailed(String),
    /// An open connection closed or failed. Carries the reason when known.
    ConnectionLost(Option<String>),
}

struct Transport {
    conversation_id: String,
    state: Arc<Mutex<ChannelState>>,
    outbound: mpsc::UnboundedSender<Message>,
    task: JoinHandle<()>,
}

impl Transport {
    fn state(&self) -> ChannelState {
        *lock(&self.state)
    }

    fn shutdown(self) {
        set_state(&self.state, ChannelState::Disconnected);
        self.task.abort();
        debug!(conversation = %self.conversation_id, "realtime transport torn down");
    }
}

/// Cancellation handle for one transport. Dropping it (or calling
/// [`Subscription::cancel`]) closes the connection.
pub struct Subscription {
    conversation_id: String,
    notifications: mpsc::Receiver<ChannelNotification>,
    state: Arc<Mutex<ChannelState>>,
    task: AbortHandle,
}

impl Subscription {
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// The next notification, or `None` once the transport has ended.
    pub async fn recv(&mut self) -> Option<ChannelNotification> {
        self.notifications.recv().await
    }

    /// Same as dropping the handle.
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.notifications.close();
        set_state(&self.state, ChannelState::Disconnected);
        self.task.abort();
    }
}

pub struct RealtimeChannel {
    ws_url: Url,
    session: Arc<SessionStore>,
    transport: Option<Transport>,
}

impl RealtimeChannel {
    pub fn new(ws_url: &str, session: Arc<SessionStore>) -> Result<Self> {
        let ws_url = Url::parse(ws_url)
            .map_err(|e| ClientError::Config(format!("realtime URL `{ws_url}`: {e}")))?;
        Ok(Self {
            ws_url,
            session,
            transport: None,
        })
    }

    pub fn from_config(config: &ClientConfig, session: Arc<SessionStore>) -> Result<Self> {
        Self::new(&config.ws_url, session)
    }

    pub fn state(&self) -> ChannelState {
        self.transport
            .as_ref()
            .map_or(ChannelState::Disconnected, Transport::state)
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.transport.as_ref().map(|t| t.conversation_id.as_str())
    }

    /// Open the transport for `conversation_id`, closing any previous one
    /// first. Must be called from within a tokio runtime.
    ///
    /// The returned subscription yields [`ChannelNotification::Connected`] or
    /// [`ChannelNotification::HandshakeFailed`] first, then events until the
    /// connection ends.
    pub fn subscribe(&mut self, conversation_id: &str) -> Result<Subscription> {
        self.unsubscribe();

        let token = self.session.get_token().ok_or(ClientError::Unauthenticated)?;
        if conversation_id.is_empty() {
            return Err(ClientError::Unauthenticated);
        }

        let mut url = self.ws_url.clone();
        url.query_pairs_mut()
            .append_pair(WS_PARAM_TOKEN, &token)
            .append_pair(WS_PARAM_CHAT_ID, conversation_id);

        let state = Arc::new(Mutex::new(ChannelState::Connecting));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (notify_tx, notify_rx) = mpsc::channel(NOTIFICATION_BUFFER);

        let task = tokio::spawn(run_transport(
            url,
            conversation_id.to_string(),
            state.clone(),
            outbound_rx,
            notify_tx,
        ));

        let subscription = Subscription {
            conversation_id: conversation_id.to_string(),
            notifications: notify_rx,
            state: state.clone(),
            task: task.abort_handle(),
        };
        self.transport = Some(Transport {
            conversation_id: conversation_id.to_string(),
            state,
            outbound: outbound_tx,
            task,
        });
        Ok(subscription)
    }

    /// Close the current transport, if any. Safe to call repeatedly.
    pub fn unsubscribe(&mut self) {
        if let Some(transport) = self.transport.take() {
            transport.shutdown();
        }
    }

    /// Send a JSON frame. Returns whether it was handed to an open
    /// connection; outside `Connected` nothing is sent or queued.
    pub fn send<T: Serialize>(&self, payload: &T) -> bool {
        let transport = match &self.transport {
            Some(t) if t.state() == ChannelState::Connected => t,
            _ => {
                warn!(state = ?self.state(), "realtime send while not connected, dropping");
                return false;
            }
        };

        let text = match serde_json::to_string(payload) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "realtime payload could not be serialized");
                return false;
            }
        };

        transport.outbound.send(Message::Text(text)).is_ok()
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

async fn run_transport(
    url: Url,
    conversation_id: String,
    state: Arc<Mutex<ChannelState>>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    notify: mpsc::Sender<ChannelNotification>,
) {
    let ws = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            warn!(conversation = %conversation_id, error = %e, "realtime handshake failed");
            set_state(&state, ChannelState::Disconnected);
            let _ = notify
                .send(ChannelNotification::HandshakeFailed(e.to_string()))
                .await;
            return;
        }
    };

    if !mark_connected(&state, &notify) {
        debug!(conversation = %conversation_id, "subscription gone before connect");
        return;
    }
    info!(conversation = %conversation_id, "realtime connected");
    if notify.send(ChannelNotification::Connected).await.is_err() {
        return;
    }

    let (mut sink, mut stream) = ws.split();
    let reason = loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => match RealtimeEvent::from_json(&text) {
                    Ok(event) => {
                        debug!(kind = event.kind(), id = event.message_id(), "realtime event");
                        if notify.send(ChannelNotification::Event(event)).await.is_err() {
                            break Some("subscriber gone".to_string());
                        }
                    }
                    Err(e) => warn!(error = %e, "dropping realtime frame"),
                },
                Some(Ok(Message::Binary(data))) => {
                    warn!(error = %DecodeError::Binary(data.len()), "dropping realtime frame");
                }
                Some(Ok(Message::Close(frame))) => {
                    break frame.map(|f| f.reason.into_owned()).filter(|r| !r.is_empty());
                }
                // Ping/pong are answered by tungstenite.
                Some(Ok(_)) => {}
                Some(Err(e)) => break Some(e.to_string()),
                None => break None,
            },
            out = outbound.recv() => match out {
                Some(message) => {
                    if let Err(e) = sink.send(message).await {
                        break Some(e.to_string());
                    }
                }
                None => {
                    let _ = sink.close().await;
                    break None;
                }
            },
        }
    };

    info!(conversation = %conversation_id, reason = ?reason, "realtime connection lost");
    set_state(&state, ChannelState::Disconnected);
    let _ = notify.send(ChannelNotification::ConnectionLost(reason)).await;
}

fn lock(state: &Mutex<ChannelState>) -> std::sync::MutexGuard<'_, ChannelState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn set_state(state: &Mutex<ChannelState>, next: ChannelState) {
    *lock(state) = next;
}

/// Move to `Connected` unless the subscriber has already gone away. The
/// check and the write happen under the state lock, so a concurrent
/// cancellation always leaves the channel `Disconnected`.
fn mark_connected(
    state: &Mutex<ChannelState>,
    notify: &mpsc::Sender<ChannelNotification>,
) -> bool {
    let mut current = lock(state);
    if notify.is_closed() {
        return false;
    }
    *current = ChannelState::Connected;
    true
}
