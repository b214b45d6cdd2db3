//! Listshare HTTP API
//!
//! HTTP layer built with Axum.
//!
//! # Endpoints
//!
//! ## Items (require `x-auth-token`)
//! - `GET /items/` - List items of the addressed list
//! - `GET /items/add?name=&category=` - Add an item
//! - `GET /items/delete?uid=` - Delete an item
//! - `GET /items/edit?uid=&name=&category=` - Edit an item
//! - `GET /items/toggle?uid=` - Toggle an item
//!
//! ## WebSocket
//! - `GET /ws?client_id=` - Push channel for list mutations
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health` - Status with push channel counters
//!
//! Anything else is served from the static directory when one is set.
//!
//! # Example
//!
//! ```rust,ignore
//! use listshare::api::{serve, AppState, Users};
//! use listshare::store::MemoryStore;
//! use listshare::websocket::Hub;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let state = AppState::new(Arc::new(MemoryStore::new()), Hub::spawn(), Users::default());
//!     serve(state, "0.0.0.0:8080").await?;
//!     Ok(())
//! }
//! ```

pub mod context;
pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use context::{RequestContext, User, Users};
pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::websocket::websocket_handler;

/// Build the router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let shared_state = Arc::new(state);

    let item_routes = Router::new()
        .route("/items", get(routes::items::list).post(routes::items::list))
        .route("/items/", get(routes::items::list).post(routes::items::list))
        .route("/items/add", get(routes::items::add).post(routes::items::add))
        .route("/items/delete", get(routes::items::delete).post(routes::items::delete))
        .route("/items/edit", get(routes::items::edit).post(routes::items::edit))
        .route("/items/toggle", get(routes::items::toggle).post(routes::items::toggle))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&shared_state),
            context::require_user,
        ));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/", get(routes::health::full_health));

    let mut router = Router::new()
        .merge(item_routes)
        .route("/ws", get(websocket_handler))
        .nest("/health", health_routes);

    if let Some(dir) = &shared_state.static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(shared_state)
}

/// Start the HTTP server and run until a shutdown signal arrives
pub async fn serve(state: AppState, bind: &str) -> Result<(), ApiError> {
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;

    tracing::info!("Listshare listening on {}", bind);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Listshare shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
