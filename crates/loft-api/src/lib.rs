//! loft-api — the Query API consumed by the dashboard.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/v1/deployments` | Launch a deployment |
//! | GET | `/api/v1/deployments` | List all deployments |
//! | GET | `/api/v1/deployments/{id}` | Deployment status |
//! | GET | `/api/v1/deployments/{id}/logs` | Build log, timestamp-ordered |
//! | GET | `/api/v1/analytics/{subdomain}?days=N` | Traffic aggregate |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use loft_dispatch::Dispatcher;
use loft_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub dispatcher: Arc<Dispatcher>,
}

/// Build the complete API router.
pub fn build_router(store: StateStore, dispatcher: Arc<Dispatcher>) -> Router {
    let state = ApiState { store, dispatcher };

    let api_routes = Router::new()
        .route(
            "/deployments",
            get(handlers::list_deployments).post(handlers::create_deployment),
        )
        .route("/deployments/{id}", get(handlers::get_deployment))
        .route("/deployments/{id}/logs", get(handlers::get_logs))
        .route("/analytics/{subdomain}", get(handlers::get_analytics))
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}
