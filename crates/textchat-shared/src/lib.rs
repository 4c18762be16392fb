// Domain types, token claims and realtime frames shared by the store and the client.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod token;
pub mod types;

pub use error::{DecodeError, TokenError};
pub use protocol::{DeletedMessage, RealtimeEvent};
pub use token::TokenClaims;
pub use types::{ChatMessage, Conversation, MessageType, Page, UserId, UserProfile};
