//! API Client.
//!
//! One method per remote capability. Requests carry `Authorization: Bearer`
//! from the [`SessionStore`] when a live token exists and omit it otherwise;
//! login and register never carry it. Failures are always returned as typed
//! [`ClientError`]s and nothing is retried here.

use std::sync::Arc;

use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use textchat_shared::types::{
    AuthResponse, ErrorBody, LoginRequest, MessageEdit, NewConversation, NewMessage,
    ProfileUpdate, RegisterRequest, RegisteredUser,
};
use textchat_shared::{ChatMessage, Conversation, MessageType, Page, UserProfile};
use textchat_store::SessionStore;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// Which credentials a request carries.
enum Auth<'a> {
    /// The session's live token, if there is one.
    Session,
    /// Never an Authorization header.
    Anonymous,
    /// A token that is not (yet) stored in the session.
    Token(&'a str),
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    session: Arc<SessionStore>,
}

impl ApiClient {
    /// `base_url` includes the `/api` prefix.
    pub fn new(base_url: &str, session: Arc<SessionStore>) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ClientError::Config(format!("API base URL `{base_url}`: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::Config(format!(
                "API base URL `{base_url}` cannot carry a path"
            )));
        }

        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            session,
        })
    }

    pub fn from_config(config: &ClientConfig, session: Arc<SessionStore>) -> Result<Self> {
        Self::new(&config.api_base_url, session)
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    // -----------------------------------------------------------------------
    // Authentication
    // -----------------------------------------------------------------------

    pub async fn login(&self, credentials: &LoginRequest) -> Result<AuthResponse> {
        let req = self
            .request(Method::POST, &["auth", "login"], Auth::Anonymous)?
            .json(credentials);
        self.execute(req).await
    }

    pub async fn register(&self, user: &RegisterRequest) -> Result<RegisteredUser> {
        let req = self
            .request(Method::POST, &["auth", "register"], Auth::Anonymous)?
            .json(user);
        self.execute(req).await
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    pub async fn get_user_profile(&self, username: &str) -> Result<UserProfile> {
        let req = self.request(Method::GET, &["users", username], Auth::Session)?;
        self.execute(req).await
    }

    /// Fetch a profile with a token that has not been stored yet.
    pub async fn get_user_profile_with_token(
        &self,
        token: &str,
        username: &str,
    ) -> Result<UserProfile> {
        let req = self.request(Method::GET, &["users", username], Auth::Token(token))?;
        self.execute(req).await
    }

    pub async fn update_user_profile(
        &self,
        username: &str,
        update: &ProfileUpdate,
    ) -> Result<UserProfile> {
        let req = self
            .request(Method::PATCH, &["user", username], Auth::Session)?
            .json(update);
        self.execute(req).await
    }

    pub async fn list_users(&self) -> Result<Vec<UserProfile>> {
        let req = self.request(Method::GET, &["users", ""], Auth::Session)?;
        self.execute(req).await
    }

    pub async fn search_users(&self, query: &str) -> Result<Vec<UserProfile>> {
        let req = self
            .request(Method::GET, &["users", "search"], Auth::Session)?
            .query(&[("query", query)]);
        self.execute(req).await
    }

    // -----------------------------------------------------------------------
    // Conversations
    // -----------------------------------------------------------------------

    pub async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let req = self.request(Method::GET, &["chats", ""], Auth::Session)?;
        self.execute(req).await
    }

    pub async fn create_conversation(&self, recipient_username: &str) -> Result<Conversation> {
        let body = NewConversation {
            recipient_username: recipient_username.to_string(),
        };
        let req = self
            .request(Method::POST, &["chats", ""], Auth::Session)?
            .json(&body);
        self.execute(req).await
    }

    // -----------------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------------

    /// One page of history, oldest to newest. `cursor` is passed back exactly
    /// as the previous page returned it.
    pub async fn get_messages(
        &self,
        chat_id: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<Page<ChatMessage>> {
        let mut params = vec![("limit", limit.to_string())];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor.to_string()));
        }

        let req = self
            .request(Method::GET, &["chats", chat_id, "messages"], Auth::Session)?
            .query(&params);
        self.execute(req).await
    }

    pub async fn send_message(
        &self,
        chat_id: &str,
        content: &str,
        kind: MessageType,
    ) -> Result<ChatMessage> {
        let body = NewMessage {
            content: content.to_string(),
            message_type: kind,
        };
        let req = self
            .request(Method::POST, &["chats", chat_id, "messages"], Auth::Session)?
            .json(&body);
        self.execute(req).await
    }

    pub async fn edit_message(
        &self,
        chat_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<ChatMessage> {
        let body = MessageEdit {
            content: content.to_string(),
        };
        let req = self
            .request(
                Method::PATCH,
                &["chats", chat_id, "messages", message_id],
                Auth::Session,
            )?
            .json(&body);
        self.execute(req).await
    }

    pub async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<()> {
        let req = self.request(
            Method::DELETE,
            &["chats", chat_id, "messages", message_id],
            Auth::Session,
        )?;
        let resp = req.send().await.map_err(ClientError::Network)?;
        check_status(resp).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------------

    /// Path segments are percent-encoded; a trailing `""` yields a trailing
    /// slash.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::Config(format!("API base URL `{}`", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(
        &self,
        method: Method,
        segments: &[&str],
        auth: Auth<'_>,
    ) -> Result<RequestBuilder> {
        let url = self.endpoint(segments)?;
        debug!(%method, path = url.path(), "api request");

        let req = self.http.request(method, url);
        let token = match auth {
            Auth::Session => self.session.get_token(),
            Auth::Token(token) => Some(token.to_string()),
            Auth::Anonymous => None,
        };

        Ok(match token {
            Some(token) => req.bearer_auth(token),
            None => req,
        })
    }

    async fn execute<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T> {
        let resp = req.send().await.map_err(ClientError::Network)?;
        let resp = check_status(resp).await?;
        let body = resp.bytes().await.map_err(ClientError::Network)?;
        serde_json::from_slice(&body).map_err(|e| ClientError::UnexpectedResponse(e.to_string()))
    }
}

/// Turn a non-success response into [`ClientError::Remote`], preferring the
/// body's `error` field over a generic status description.
async fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let path = resp.url().path().to_string();
    let body = resp.bytes().await.unwrap_or_default();
    let message = serde_json::from_slice::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.error)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| describe_status(status));

    warn!(status = status.as_u16(), %path, %message, "api request failed");

    Err(ClientError::Remote {
        status: status.as_u16(),
        message,
    })
}

fn describe_status(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("HTTP {} {}", status.as_u16(), reason),
        None => format!("HTTP {}", status.as_u16()),
    }
}
