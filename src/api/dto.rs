//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.

use serde::{Deserialize, Serialize};

use crate::websocket::HubStats;

/// Query parameters accepted by the item endpoints.
///
/// Which fields matter depends on the endpoint; missing ones are empty.
#[derive(Debug, Default, Deserialize)]
pub struct ItemParams {
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: String,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "healthy"
    pub status: String,
    /// Crate version
    pub version: String,
    /// Seconds since start
    pub uptime_seconds: u64,
    /// Push channel counters
    pub websocket: HubStats,
}
