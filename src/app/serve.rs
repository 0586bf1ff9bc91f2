use std::time::Duration;

use axum::{
    body::Body,
    http::{HeaderName, Request, Response},
    middleware, Router,
};
use tower::{util::MapResponseLayer, ServiceBuilder};
use tower_http::{
    catch_panic::CatchPanicLayer,
    classify::{ServerErrorsAsFailures, SharedClassifier},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{MakeSpan, OnRequest, OnResponse, TraceLayer},
};
use tokio::signal;
use tracing::{error, info, Span};

use crate::{
    web::{midware, routes::routes, REQUEST_ID_HEADER},
    App, AppState, Result,
};

/// The core async function returning a future that will serve this application.
///
/// Accepts an `App` holding the bound `TcpListener` and the `AppState`.
///
/// Stops accepting connections on Ctrl+C or SIGTERM and lets in-flight requests finish.
/// Might return an IO error from `axum::serve`.
pub async fn serve(app: App) -> Result<()> {
    let App {
        app_state,
        listener,
    } = app;

    axum::serve(listener, app_router(app_state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM. A handler that fails to install never resolves.
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(er) => {
                error!("failed to install Ctrl+C handler: {er}");
                std::future::pending::<()>().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(er) => {
                error!("failed to install SIGTERM handler: {er}");
                std::future::pending::<()>().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// All routes wrapped in the middleware stack.
pub fn app_router(app_state: AppState) -> Router {
    with_middleware(Router::new().merge(routes(app_state)))
}

/// Wraps `router` in the middleware stack.
///
/// Requests travel through the `ServiceBuilder` layers top to bottom and responses bottom to top,
/// so the panic catcher sits closest to the handlers and its output still gets mapped and CORS headers.
/// `CatchPanicLayer` boxes the response body, which is turned back into an axum `Body`
/// before the `map_response` middlewares see it.
pub fn with_middleware(router: Router) -> Router {
    let x_request_id: HeaderName = HeaderName::from_static(REQUEST_ID_HEADER);

    router.layer(
        ServiceBuilder::new()
            // Set UUID per request
            .layer(SetRequestIdLayer::new(
                x_request_id.clone(),
                MakeRequestUuid,
            ))
            .layer(PropagateRequestIdLayer::new(x_request_id))
            .layer(build_trace_layer())
            .layer(middleware::map_response(midware::cors_headers))
            .layer(middleware::map_response(midware::response_mapper))
            .layer(MapResponseLayer::new(midware::caught_panic_body))
            .layer(CatchPanicLayer::custom(midware::panic_response)),
    )
}

/// A helper function that sets up the `tower_http::TraceLayer` - tracing configuration.
fn build_trace_layer() -> TraceLayer<
    SharedClassifier<ServerErrorsAsFailures>,
    impl MakeSpan<Body> + Clone,
    impl OnRequest<Body> + Clone,
    impl OnResponse<Body> + Clone,
> {
    TraceLayer::new_for_http()
        .make_span_with(|req: &Request<Body>| {
            let uuid = req
                .headers()
                .get(REQUEST_ID_HEADER)
                .map(|uuid| uuid.to_str().unwrap_or("").to_string());

            tracing::error_span!(
                "serve",
                id = uuid,
                method = req.method().to_string(),
                path = req.uri().path()
            )
        })
        .on_request(|req: &Request<Body>, _s: &Span| tracing::info!("START @ {}", req.uri()))
        .on_response(|res: &Response<Body>, latency: Duration, _s: &Span| {
            let st_code = res.status().as_u16();

            if (400..=599).contains(&st_code) {
                tracing::error!("END in: {:?} - STATUS: {st_code}", latency)
            } else {
                tracing::info!("END in: {:?} - STATUS: {st_code}", latency)
            }
        })
}
