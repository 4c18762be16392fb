//! Account flows built on the API client and the session store.

use tracing::{debug, info, warn};

use textchat_shared::constants::MIN_SEARCH_QUERY_LEN;
use textchat_shared::types::{LoginRequest, ProfileUpdate, RegisterRequest, RegisteredUser};
use textchat_shared::{Conversation, TokenClaims, TokenError, UserProfile};
use textchat_store::Session;

use crate::api::ApiClient;
use crate::error::{ClientError, Result};

#[derive(Clone)]
pub struct AuthService {
    api: ApiClient,
}

impl AuthService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Log in and store the resulting session.
    ///
    /// When the server answers with a bare token the profile is fetched with
    /// that token before anything is stored. On any failure the session is
    /// left cleared.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<Session> {
        let result = self.try_login(identifier, password).await;
        if let Err(e) = &result {
            warn!(error = %e, "login failed");
            self.api.session().clear();
        }
        result
    }

    async fn try_login(&self, identifier: &str, password: &str) -> Result<Session> {
        let credentials = LoginRequest {
            identifier: identifier.to_string(),
            password: password.to_string(),
        };
        let response = self.api.login(&credentials).await?;

        let user = match response.user {
            Some(user) => user,
            None => {
                let claims = TokenClaims::parse(&response.token)?;
                let username = claims.subject().ok_or_else(|| {
                    TokenError::Claims("token names neither identity nor username".into())
                })?;
                debug!(%username, "login response without user, fetching profile");
                self.api
                    .get_user_profile_with_token(&response.token, username)
                    .await?
            }
        };

        let session = self.api.session().set_session(&response.token, user)?;
        info!(user = %session.user.username, "logged in");
        Ok(session)
    }

    /// Create an account. Does not log in.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        full_name: &str,
        password: &str,
    ) -> Result<RegisteredUser> {
        let request = RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            full_name: full_name.to_string(),
            password: password.to_string(),
        };
        let registered = self.api.register(&request).await?;
        info!(user = %registered.username, "registered");
        Ok(registered)
    }

    pub fn logout(&self) {
        self.api.session().clear();
        info!("logged out");
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.api.session().get_user()
    }

    /// Re-fetch the local user's profile into the session.
    pub async fn refresh_profile(&self) -> Result<UserProfile> {
        let session = self.live_session()?;
        let user = self.api.get_user_profile(&session.user.username).await?;
        Ok(self.replace_user(&session, user)?)
    }

    pub async fn update_profile(
        &self,
        full_name: Option<String>,
        bio: Option<String>,
    ) -> Result<UserProfile> {
        let session = self.live_session()?;
        let update = ProfileUpdate { full_name, bio };
        let user = self
            .api
            .update_user_profile(&session.user.username, &update)
            .await?;
        Ok(self.replace_user(&session, user)?)
    }

    /// Search for other users. Queries shorter than two characters (after
    /// trimming) return nothing without touching the network.
    pub async fn find_people(&self, query: &str) -> Result<Vec<UserProfile>> {
        let query = query.trim();
        if query.chars().count() < MIN_SEARCH_QUERY_LEN {
            return Ok(Vec::new());
        }

        let mut found = self.api.search_users(query).await?;
        if let Some(me) = self.current_user() {
            found.retain(|u| u.id != me.id);
        }
        Ok(found)
    }

    pub async fn start_conversation(&self, username: &str) -> Result<Conversation> {
        self.api.create_conversation(username).await
    }

    fn live_session(&self) -> Result<Session> {
        self.api.session().session().ok_or(ClientError::Unauthenticated)
    }

    fn replace_user(
        &self,
        session: &Session,
        user: UserProfile,
    ) -> textchat_store::Result<UserProfile> {
        self.api
            .session()
            .set_session(&session.token, user)
            .map(|s| s.user)
    }
}
