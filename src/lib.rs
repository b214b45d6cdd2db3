//! # Listshare
//!
//! Real-time shared lists. Clients change a list through plain HTTP
//! requests; every other client watching the list hears about the change
//! over a WebSocket push channel.
//!
//! ## Modules
//!
//! - [`websocket`]: connection hub, connections and the push wire format
//! - [`store`]: item storage
//! - [`api`]: HTTP API with Axum
//! - [`config`]: configuration loading
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use listshare::api::{serve, AppState, Users};
//! use listshare::store::MemoryStore;
//! use listshare::websocket::Hub;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hub = Hub::spawn();
//!     let state = AppState::new(Arc::new(MemoryStore::new()), hub, Users::default());
//!
//!     serve(state, "127.0.0.1:8080").await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod store;
pub mod websocket;

pub use api::{build_router, serve, ApiError, AppState, RequestContext, User, Users};

pub use config::{Config, ConfigError, LoggingConfig, ServerConfig, StoreConfig, WebSocketConfig};

pub use store::{Item, ItemStore, MemoryStore, Scope, StoreError, StoreResult};

pub use websocket::{
    serve_connection, websocket_handler, CloseReason, Connection, ConnectionSettings,
    ConnectionState, Envelope, EnvelopeError, EventKind, Hub, HubHandle, HubStats,
};
