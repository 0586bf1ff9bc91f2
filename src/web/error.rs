use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use strum_macros::AsRefStr;

use super::{routes::SubscribeError, types::DataParsingError};

pub type WebResult<T> = core::result::Result<T, Error>;

#[derive(Debug, AsRefStr, thiserror::Error)]
pub enum Error {
    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("subscribe error: {0}")]
    Subscribe(#[from] SubscribeError),

    #[error("unexpected error: {0}")]
    Unexpected(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code_and_client_error(&self) -> (StatusCode, ClientError) {
        use ClientError::*;

        match self {
            Error::MethodNotAllowed => (StatusCode::METHOD_NOT_ALLOWED, MethodNotAllowed),
            Error::Subscribe(er) => er.status_code_and_client_error(),
            Error::Unexpected(_) => (StatusCode::INTERNAL_SERVER_ERROR, ServiceError),
        }
    }
}

impl SubscribeError {
    pub fn status_code_and_client_error(&self) -> (StatusCode, ClientError) {
        use ClientError::*;

        match self {
            SubscribeError::DataParsing(DataParsingError::EmailMissing) => {
                (StatusCode::BAD_REQUEST, EmailRequired)
            }
            SubscribeError::DataParsing(DataParsingError::EmailInvalid) => {
                (StatusCode::BAD_REQUEST, EmailInvalid)
            }
            SubscribeError::DataParsing(DataParsingError::EmailTooLong) => {
                (StatusCode::BAD_REQUEST, EmailTooLong)
            }
            SubscribeError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, TooManyAttempts),
            SubscribeError::RateLimitCheck(_) | SubscribeError::Lookup(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, DatabaseError)
            }
            SubscribeError::Reactivate(_) => (StatusCode::INTERNAL_SERVER_ERROR, ReactivateFailed),
            SubscribeError::Insert(_) => (StatusCode::INTERNAL_SERVER_ERROR, SubscribeFailed),
            SubscribeError::Body(_) => (StatusCode::INTERNAL_SERVER_ERROR, ServiceError),
            SubscribeError::BodyRead(rejection)
                if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE =>
            {
                (StatusCode::PAYLOAD_TOO_LARGE, BodyTooLarge)
            }
            SubscribeError::BodyRead(_) => (StatusCode::INTERNAL_SERVER_ERROR, ServiceError),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        tracing::debug!("{:<12} - into_response(Error: {self:?})", "INTO_RESP");

        // Construct a response
        let mut res = StatusCode::INTERNAL_SERVER_ERROR.into_response();

        // Insert the Error into response so that it can be retrieved later.
        res.extensions_mut().insert(Arc::new(self));

        res
    }
}

/// What the caller gets to see. Server side details never leave the process.
#[derive(Debug, AsRefStr, derive_more::Display)]
pub enum ClientError {
    #[display("Email is required")]
    EmailRequired,
    #[display("Invalid email format")]
    EmailInvalid,
    #[display("Email address too long")]
    EmailTooLong,
    #[display("Method not allowed")]
    MethodNotAllowed,
    #[display("Too many subscription attempts. Please try again later.")]
    TooManyAttempts,
    #[display("Database error occurred")]
    DatabaseError,
    #[display("Failed to reactivate subscription")]
    ReactivateFailed,
    #[display("Failed to subscribe. Please try again.")]
    SubscribeFailed,
    #[display("Request body too large")]
    BodyTooLarge,
    #[display("An unexpected error occurred")]
    ServiceError,
}
