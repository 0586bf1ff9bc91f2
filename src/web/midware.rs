use std::{any::Any, sync::Arc};

use axum::{
    body::{Body, Bytes},
    http::{self, header, HeaderMap, HeaderValue, Method, Uri},
    response::{IntoResponse, Response},
    BoxError, Json,
};
use serde_json::json;
use tower_http::body::UnsyncBoxBody;

use crate::web::{log, Error, REQUEST_ID_HEADER};

pub const CORS_ALLOW_ORIGIN: &str = "*";
pub const CORS_ALLOW_HEADERS: &str = "authorization, x-client-info, apikey, content-type";
pub const CORS_ALLOW_METHODS: &str = "POST, OPTIONS";

/// Turns an `Error` stashed in the response extensions into the `{"error": ...}`
/// body the caller sees, and writes the request log line.
pub async fn response_mapper(
    req_method: Method,
    uri: Uri,
    req_headers: HeaderMap,
    resp: Response,
) -> Response {
    let req_id = req_headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok());

    let web_error = resp.extensions().get::<Arc<Error>>().map(Arc::as_ref);
    let client_status_and_error = web_error.map(Error::status_code_and_client_error);

    let err_resp = client_status_and_error.as_ref().map(|(status, cl_err)| {
        let client_error_body = json!({ "error": cl_err.to_string() });
        (*status, Json(client_error_body)).into_response()
    });

    let status_code = client_status_and_error
        .as_ref()
        .map(|(sc, _)| *sc)
        .unwrap_or(resp.status());
    log::log_request(
        req_id,
        &req_method,
        &uri,
        status_code,
        web_error,
        client_status_and_error.as_ref().map(|(_, ce)| ce),
    );

    err_resp.unwrap_or(resp)
}

/// Every response, errors included, carries the CORS headers.
pub async fn cors_headers(mut resp: Response) -> Response {
    let headers = resp.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static(CORS_ALLOW_ORIGIN),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(CORS_ALLOW_HEADERS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );

    resp
}

/// Used by `CatchPanicLayer`: a panicking handler becomes a regular `Error`.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let details = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    tracing::error!("handler panicked: {details}");

    Error::Unexpected(anyhow::anyhow!("handler panicked: {details}")).into_response()
}

/// `CatchPanicLayer` answers with a boxed body; the `map_response` middlewares take axum's `Body`.
pub fn caught_panic_body(resp: http::Response<UnsyncBoxBody<Bytes, BoxError>>) -> Response {
    resp.map(Body::new)
}
