use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;

use otpgate_core::health::healthz;
use otpgate_core::middleware::{propagate_request_id_layer, request_id_layer};

use crate::handlers::{
    admin::{delete_user, get_config, list_users, update_config},
    health::readyz,
    otp::{generate_otp, validate_otp},
};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // OTP
        .route("/otp/generate", post(generate_otp))
        .route("/otp/validate", post(validate_otp))
        // Admin
        .route("/admin/config", get(get_config).patch(update_config))
        .route("/admin/users", get(list_users))
        .route("/admin/users/{id}", delete(delete_user))
        .with_state(state)
        .layer(propagate_request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(request_id_layer())
}
