//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::api::context::Users;
use crate::store::ItemStore;
use crate::websocket::{ConnectionSettings, HubHandle};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Item storage
    pub store: Arc<dyn ItemStore>,
    /// Handle to the WebSocket hub, for announcing mutations
    pub hub: HubHandle,
    /// Known auth tokens
    pub users: Arc<Users>,
    /// Settings for new push connections
    pub ws_settings: ConnectionSettings,
    /// Frontend directory served at `/`, if any
    pub static_dir: Option<PathBuf>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    pub fn new(store: Arc<dyn ItemStore>, hub: HubHandle, users: Users) -> Self {
        Self {
            store,
            hub,
            users: Arc::new(users),
            ws_settings: ConnectionSettings::default(),
            static_dir: None,
            start_time: Instant::now(),
        }
    }

    /// Use custom push connection settings
    pub fn with_ws_settings(mut self, settings: ConnectionSettings) -> Self {
        self.ws_settings = settings;
        self
    }

    /// Serve static files from `dir`
    pub fn with_static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.static_dir = Some(dir.into());
        self
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
