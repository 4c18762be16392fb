use thiserror::Error;

use textchat_shared::TokenError;
use textchat_store::StoreError;

/// Errors surfaced to the presentation layer.
///
/// Every failure here is local and recoverable: retry the action or log in
/// again.
#[derive(Error, Debug)]
pub enum ClientError {
    /// A token could not be parsed into the expected claims.
    #[error(transparent)]
    InvalidToken(#[from] TokenError),

    /// The operation needs a live session and there is none.
    #[error("Not authenticated")]
    Unauthenticated,

    /// The API answered with a non-success status.
    #[error("{message} (HTTP {status})")]
    Remote { status: u16, message: String },

    /// No response could be obtained.
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    /// A success response whose body does not have the expected shape.
    #[error("Unexpected response from server: {0}")]
    UnexpectedResponse(String),

    /// A configured URL cannot be used.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Message content was blank after trimming; nothing was sent.
    #[error("Message is empty")]
    EmptyMessage,

    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Local storage error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ClientError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidToken(t) => Self::InvalidToken(t),
            other => Self::Store(other),
        }
    }
}

impl ClientError {
    /// Whether the server rejected the credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthenticated | Self::Remote { status: 401, .. })
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
