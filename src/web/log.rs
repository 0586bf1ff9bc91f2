use axum::http::{Method, StatusCode, Uri};
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use super::{error::ClientError, Error};

pub fn log_request(
    req_id: Option<&str>,
    req_method: &Method,
    uri: &Uri,
    status_code: StatusCode,
    web_error: Option<&Error>,
    client_error: Option<&ClientError>,
) {
    let logline = LogLine {
        timestamp: chrono::Utc::now().to_rfc3339(),
        req_id: req_id.map(str::to_string),
        req_method: req_method.to_string(),
        uri: uri.to_string(),
        status_code: status_code.as_u16(),
        client_error_type: client_error.map(|ce| ce.as_ref().to_string()),
        web_error_type: web_error.map(|we| we.as_ref().to_string()),
        web_error_data: web_error.map(|we| we.to_string()),
    };

    // TODO: ship loglines to a collector instead of the tracing output
    debug!("LOGLINE: {}", json!(logline));
}

#[derive(Serialize)]
struct LogLine {
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    req_id: Option<String>,

    req_method: String,
    uri: String,
    status_code: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    client_error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    web_error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    web_error_data: Option<String>,
}
