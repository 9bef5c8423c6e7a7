//! Client-side sync engine for the catalog server.
//!
//! - [`sync`]: mirrors per-user data (likes, playlists, settings,
//!   permissions, notifications) from the server event log
//! - [`statics`]: fetches catalog entities on demand and streams them to
//!   consumers
//! - [`session`]: builds both once per signed-in user
//!
//! Persistence goes through the [`stores`] traits plus a redb [`sync_db`]
//! for the cursor and fetch states.

pub mod api;
pub mod config;
pub mod fetch_state;
pub mod model;
pub mod observable;
pub mod session;
pub mod statics;
pub mod stores;
pub mod sync;
pub mod sync_db;
pub mod sync_events;

#[cfg(test)]
mod test_support;

pub use api::{ApiError, HttpRemoteApi, RemoteApi};
pub use config::Config;
pub use session::SyncSession;
pub use statics::{ContentFrame, LiveContentProvider, StaticsSynchronizer};
pub use sync::{SyncManager, SyncState};
pub use sync_db::SyncDb;
