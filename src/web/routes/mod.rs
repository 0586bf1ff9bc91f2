//! Contains all the routes that this application can handle.

mod subscribe;

// re-exports
pub use subscribe::{process_subscription, SubscribeError, SubscribeOutcome};

use crate::{web, AppState};

use axum::{
    http::StatusCode,
    routing::{get, post},
    Router,
};

async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// Answers CORS preflight requests before anything looks at the body.
async fn preflight() -> &'static str {
    "ok"
}

async fn method_not_allowed() -> web::Error {
    web::Error::MethodNotAllowed
}

/// All the routes of the server
pub fn routes(app_state: AppState) -> Router {
    Router::new()
        .route(
            "/newsletter-subscribe",
            post(subscribe::subscribe)
                .options(preflight)
                .fallback(method_not_allowed),
        )
        .with_state(app_state)
        .route("/health-check", get(health_check))
}
