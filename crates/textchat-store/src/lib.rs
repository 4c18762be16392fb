//! # textchat-store
//!
//! Persisted client state for textchat.
//!
//! Everything the client keeps between runs lives in a single key-value area
//! (see [`KeyValueStore`]): a SQLite file in production, a map in tests. The
//! [`SessionStore`] on top of it owns the authentication token and the
//! profile it resolves to.

pub mod database;
pub mod kv;
pub mod migrations;
pub mod models;
pub mod session;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use kv::{KeyValueStore, MemoryStore};
pub use models::Session;
pub use session::{Clock, SessionStore, SystemClock};
