//! API route definitions.

use axum::{Router, middleware};

use crate::{AppState, middleware::admin_middleware};

pub mod health;
pub mod tenants;
pub mod upload;

/// Creates the API router; provisioning routes sit behind the admin token.
#[allow(clippy::needless_pass_by_value)]
pub fn api_routes_with_state(state: AppState) -> Router<AppState> {
    let admin_routes = Router::new()
        .merge(tenants::routes())
        .layer(middleware::from_fn_with_state(state.clone(), admin_middleware));

    Router::new()
        .merge(health::routes())
        .merge(upload::routes())
        .merge(admin_routes)
}
