pub mod api;
pub mod auth;
pub mod config;
pub mod conversation;
pub mod error;
pub mod realtime;
pub mod reconciler;

use tracing_subscriber::{fmt, EnvFilter};

pub use api::ApiClient;
pub use auth::AuthService;
pub use config::ClientConfig;
pub use conversation::{message_content, ConversationView, Update};
pub use error::{ClientError, Result};
pub use realtime::{ChannelNotification, ChannelState, RealtimeChannel, Subscription};
pub use reconciler::ChatReconciler;

/// Install the global subscriber. Respects `RUST_LOG`; logs go to stderr so
/// command output stays clean.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("textchat_client=debug,textchat_store=info,warn"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
