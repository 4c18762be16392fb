/// Application name
pub const APP_NAME: &str = "textchat";

/// Default REST base, already including the `/api` prefix
pub const DEFAULT_API_BASE_URL: &str = "https://api.pokee.in/api";

/// Default realtime endpoint
pub const DEFAULT_WS_URL: &str = "wss://api.pokee.in/ws";

/// Persisted record holding the token, its expiry and the user
pub const TOKEN_KEY: &str = "textchat_token";

/// Persisted standalone copy of the user profile
pub const USER_KEY: &str = "textchat_user";

/// Messages fetched per history page
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Shortest trimmed query sent to the user search endpoint
pub const MIN_SEARCH_QUERY_LEN: usize = 2;

/// Realtime connection query parameters
pub const WS_PARAM_TOKEN: &str = "token";
pub const WS_PARAM_CHAT_ID: &str = "chat_id";
