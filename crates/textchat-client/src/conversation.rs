//! The open-conversation screen: history, live updates and the local
//! user's own actions, all folded through one [`ChatReconciler`].

use tracing::{debug, info};

use textchat_shared::{
    ChatMessage, Conversation, DeletedMessage, MessageType, RealtimeEvent, UserProfile,
};

use crate::api::ApiClient;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::realtime::{ChannelNotification, ChannelState, RealtimeChannel, Subscription};
use crate::reconciler::ChatReconciler;

/// What [`ConversationView::next_update`] observed.
#[derive(Debug, Clone)]
pub enum Update {
    Connected,
    /// A realtime event was folded in; `changed` is false when it was
    /// redundant (already present, own echo, or outside the loaded window).
    Applied { event: RealtimeEvent, changed: bool },
    HandshakeFailed(String),
    ConnectionLost(Option<String>),
    /// The subscription is gone; no further updates will arrive.
    Closed,
}

/// Trimmed message text, or [`ClientError::EmptyMessage`] when nothing is
/// left after trimming.
pub fn message_content(raw: &str) -> Result<&str> {
    let content = raw.trim();
    if content.is_empty() {
        return Err(ClientError::EmptyMessage);
    }
    Ok(content)
}

pub struct ConversationView {
    api: ApiClient,
    conversation: Conversation,
    me: UserProfile,
    reconciler: ChatReconciler,
    channel: RealtimeChannel,
    subscription: Option<Subscription>,
    page_size: u32,
    next_cursor: Option<String>,
    has_more: bool,
}

impl ConversationView {
    /// Load `chat_id` and subscribe to its live updates.
    pub async fn open(api: ApiClient, config: &ClientConfig, chat_id: &str) -> Result<Self> {
        let me = api.session().get_user().ok_or(ClientError::Unauthenticated)?;
        let mut channel = RealtimeChannel::from_config(config, api.session().clone())?;

        let (conversations, page) = tokio::join!(
            api.list_conversations(),
            api.get_messages(chat_id, config.page_size, None),
        );
        let conversation = conversations?
            .into_iter()
            .find(|c| c.id == chat_id)
            .ok_or_else(|| ClientError::ConversationNotFound(chat_id.to_string()))?;
        let page = page?;

        let reconciler = ChatReconciler::new(me.id.clone(), page.data);
        let subscription = channel.subscribe(chat_id)?;

        info!(
            conversation = %chat_id,
            messages = reconciler.len(),
            has_more = page.has_more,
            "conversation opened"
        );

        Ok(Self {
            api,
            conversation,
            me,
            reconciler,
            channel,
            subscription: Some(subscription),
            page_size: config.page_size,
            has_more: page.has_more && page.next_cursor.is_some(),
            next_cursor: page.next_cursor,
        })
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.reconciler.messages()
    }

    pub fn me(&self) -> &UserProfile {
        &self.me
    }

    pub fn other_participant(&self) -> Option<&UserProfile> {
        self.conversation.other_participant(&self.me.id)
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channel.state()
    }

    /// Send a text message. The server's copy is recorded on success;
    /// nothing is recorded on failure.
    pub async fn send(&mut self, content: &str) -> Result<ChatMessage> {
        let content = message_content(content)?;

        let sent = self
            .api
            .send_message(&self.conversation.id, content, MessageType::Text)
            .await?;
        self.reconciler.record_sent(sent.clone());
        Ok(sent)
    }

    pub async fn edit(&mut self, message_id: &str, content: &str) -> Result<ChatMessage> {
        let content = message_content(content)?;

        let edited = self
            .api
            .edit_message(&self.conversation.id, message_id, content)
            .await?;
        self.reconciler.apply(RealtimeEvent::MessageEdited(edited.clone()));
        Ok(edited)
    }

    pub async fn delete(&mut self, message_id: &str) -> Result<()> {
        self.api
            .delete_message(&self.conversation.id, message_id)
            .await?;
        self.reconciler.apply(RealtimeEvent::MessageDeleted(DeletedMessage {
            message_id: message_id.to_string(),
        }));
        Ok(())
    }

    /// Fetch the next older page, if the server reported one. Returns how
    /// many messages the page carried. A page without a cursor ends paging.
    pub async fn load_older(&mut self) -> Result<usize> {
        let Some(cursor) = self.next_cursor.as_deref().filter(|_| self.has_more) else {
            return Ok(0);
        };

        let page = self
            .api
            .get_messages(
                &self.conversation.id,
                self.page_size,
                Some(cursor),
            )
            .await?;

        let loaded = page.data.len();
        debug!(
            conversation = %self.conversation.id,
            loaded,
            has_more = page.has_more,
            "older page"
        );
        self.reconciler.merge_history(page.data);
        self.has_more = page.has_more && page.next_cursor.is_some();
        self.next_cursor = page.next_cursor;
        Ok(loaded)
    }

    /// Wait for the next notification from the realtime channel and fold it
    /// into the message list.
    pub async fn next_update(&mut self) -> Update {
        let Some(subscription) = self.subscription.as_mut() else {
            return Update::Closed;
        };

        match subscription.recv().await {
            Some(ChannelNotification::Connected) => Update::Connected,
            Some(ChannelNotification::Event(event)) => {
                let changed = self.reconciler.apply(event.clone());
                Update::Applied { event, changed }
            }
            Some(ChannelNotification::HandshakeFailed(reason)) => Update::HandshakeFailed(reason),
            Some(ChannelNotification::ConnectionLost(reason)) => Update::ConnectionLost(reason),
            None => {
                self.subscription = None;
                Update::Closed
            }
        }
    }

    /// Release the realtime subscription. Dropping the view does the same.
    pub fn close(&mut self) {
        self.subscription = None;
        self.channel.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::extract::{Path, Query};
    use axum::http::StatusCode;
    use axum::routing::{get, patch};
    use axum::{Json, Router};
    use futures::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    use textchat_store::{MemoryStore, SessionStore};

    use super::*;
    use crate::api::tests::{live_token, message_json, serve, user_json};

    fn conversation_json(id: &str) -> Value {
        json!({
            "id": id,
            "type": "direct",
            "created_at": "2024-05-01T09:00:00Z",
            "updated_at": "2024-05-01T10:02:00Z",
            "participants": [user_json(1, "alice"), user_json(2, "bob")]
        })
    }

    static UNCURSORED_FETCHES: AtomicUsize = AtomicUsize::new(0);

    async fn messages(
        Path(id): Path<String>,
        Query(q): Query<HashMap<String, String>>,
    ) -> Json<Value> {
        if id == "c2" {
            UNCURSORED_FETCHES.fetch_add(1, Ordering::SeqCst);
            return Json(json!({
                "data": [message_json("m7", 2, "seven", "2024-05-01T10:00:00Z")],
                "has_more": true,
            }));
        }
        match q.get("cursor").map(String::as_str) {
            None => Json(json!({
                "data": [
                    message_json("m2", 2, "two", "2024-05-01T10:01:00Z"),
                    message_json("m3", 1, "three", "2024-05-01T10:02:00Z"),
                ],
                "has_more": true,
                "next_cursor": "older",
            })),
            Some("older") => Json(json!({
                "data": [
                    message_json("m1", 2, "one", "2024-05-01T10:00:00Z"),
                    message_json("m2", 2, "two", "2024-05-01T10:01:00Z"),
                ],
                "has_more": false,
            })),
            Some(other) => panic!("unexpected cursor {other}"),
        }
    }

    async fn send(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        let content = body["content"].as_str().unwrap_or_default();
        if content == "fail" {
            return (
                StatusCode::FORBIDDEN,
                Json(json!({"error": "Not a participant"})),
            );
        }
        (
            StatusCode::CREATED,
            Json(message_json("m4", 1, content, "2024-05-01T10:03:00Z")),
        )
    }

    async fn edit(Path((_, mid)): Path<(String, String)>, Json(body): Json<Value>) -> Json<Value> {
        let content = body["content"].as_str().unwrap_or_default();
        let mut message = message_json(&mid, 2, content, "2024-05-01T10:01:00Z");
        message["edited"] = json!(true);
        Json(message)
    }

    fn router() -> Router {
        Router::new()
            .route(
                "/api/chats/",
                get(|| async {
                    Json(json!([conversation_json("c1"), conversation_json("c2")]))
                }),
            )
            .route("/api/chats/:id/messages", get(messages).post(send))
            .route(
                "/api/chats/:id/messages/:mid",
                patch(edit).delete(|| async { StatusCode::NO_CONTENT }),
            )
    }

    struct Harness {
        api: ApiClient,
        config: ClientConfig,
        ws: TcpListener,
    }

    async fn harness(logged_in: bool) -> Harness {
        let base = serve(router()).await;
        let ws = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let session = Arc::new(SessionStore::new(MemoryStore::new()));
        if logged_in {
            let me: UserProfile = serde_json::from_value(user_json(1, "alice")).unwrap();
            session.set_session(&live_token("alice"), me).unwrap();
        }

        let config = ClientConfig {
            api_base_url: base.clone(),
            ws_url: format!("ws://{}/ws", ws.local_addr().unwrap()),
            page_size: 2,
            ..ClientConfig::default()
        };
        Harness {
            api: ApiClient::new(&base, session).unwrap(),
            config,
            ws,
        }
    }

    fn ids(view: &ConversationView) -> Vec<&str> {
        view.messages().iter().map(|m| m.id.as_str()).collect()
    }

    #[tokio::test]
    async fn open_requires_session() {
        let h = harness(false).await;
        let err = ConversationView::open(h.api, &h.config, "c1")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ClientError::Unauthenticated), "{err:?}");
    }

    #[tokio::test]
    async fn open_unknown_conversation() {
        let h = harness(true).await;
        let err = ConversationView::open(h.api, &h.config, "c9")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ClientError::ConversationNotFound(id) if id == "c9"));
    }

    #[tokio::test]
    async fn live_conversation_flow() {
        let h = harness(true).await;
        let mut view = ConversationView::open(h.api, &h.config, "c1").await.unwrap();

        assert_eq!(ids(&view), ["m2", "m3"]);
        assert_eq!(view.other_participant().unwrap().username, "bob");
        assert!(view.has_more());

        let (stream, _) = h.ws.accept().await.unwrap();
        let mut server = tokio_tungstenite::accept_async(stream).await.unwrap();
        assert!(matches!(view.next_update().await, Update::Connected));
        assert_eq!(view.channel_state(), ChannelState::Connected);

        // A message from bob arrives live.
        let pushed = json!({
            "type": "new_message",
            "data": message_json("m5", 2, "live", "2024-05-01T10:04:00Z"),
        });
        server.send(Message::Text(pushed.to_string())).await.unwrap();
        match view.next_update().await {
            Update::Applied { event, changed } => {
                assert_eq!(event.message_id(), "m5");
                assert!(changed);
            }
            other => panic!("unexpected update: {other:?}"),
        }

        // Our own send, then its realtime echo.
        let sent = view.send("  hello  ").await.unwrap();
        assert_eq!(sent.content, "hello");
        let echo = json!({
            "type": "new_message",
            "data": message_json("m4", 1, "hello", "2024-05-01T10:03:00Z"),
        });
        server.send(Message::Text(echo.to_string())).await.unwrap();
        assert!(matches!(
            view.next_update().await,
            Update::Applied { changed: false, .. }
        ));
        assert_eq!(ids(&view), ["m2", "m3", "m4", "m5"]);

        assert!(matches!(view.send("   ").await, Err(ClientError::EmptyMessage)));
        let err = view.send("fail").await.unwrap_err();
        assert_eq!(err.to_string(), "Not a participant (HTTP 403)");
        assert_eq!(view.messages().len(), 4);

        let edited = view.edit("m2", "two, revised").await.unwrap();
        assert!(edited.edited);
        assert_eq!(view.messages()[0].content, "two, revised");

        view.delete("m3").await.unwrap();
        assert_eq!(ids(&view), ["m2", "m4", "m5"]);

        assert_eq!(view.load_older().await.unwrap(), 2);
        assert_eq!(ids(&view), ["m1", "m2", "m4", "m5"]);
        assert!(!view.has_more());
        assert_eq!(view.load_older().await.unwrap(), 0);

        view.close();
        assert_eq!(view.channel_state(), ChannelState::Disconnected);
        assert!(matches!(view.next_update().await, Update::Closed));
        assert!(matches!(server.next().await, None | Some(Err(_))));
    }

    #[test]
    fn message_content_trims() {
        assert_eq!(message_content("  hi there \n").unwrap(), "hi there");
        assert!(matches!(message_content(""), Err(ClientError::EmptyMessage)));
        assert!(matches!(message_content(" \t\n"), Err(ClientError::EmptyMessage)));
    }

    #[tokio::test]
    async fn more_without_cursor_stops_paging() {
        let h = harness(true).await;
        let mut view = ConversationView::open(h.api, &h.config, "c2").await.unwrap();

        assert_eq!(ids(&view), ["m7"]);
        assert!(!view.has_more());
        assert_eq!(view.load_older().await.unwrap(), 0);
        assert_eq!(ids(&view), ["m7"]);
        assert_eq!(UNCURSORED_FETCHES.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn server_disconnect_is_reported() {
        let h = harness(true).await;
        let mut view = ConversationView::open(h.api, &h.config, "c1").await.unwrap();

        let (stream, _) = h.ws.accept().await.unwrap();
        let mut server = tokio_tungstenite::accept_async(stream).await.unwrap();
        assert!(matches!(view.next_update().await, Update::Connected));

        server.close(None).await.unwrap();
        assert!(matches!(view.next_update().await, Update::ConnectionLost(_)));
        assert!(matches!(view.next_update().await, Update::Closed));
        assert_eq!(view.channel_state(), ChannelState::Disconnected);
    }
}
