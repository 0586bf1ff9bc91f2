use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{error, info};

use crate::{
    config::RateLimitConfig,
    model::{NewSubscriber, StoreError, Subscriber, SubscriberStore, SubscriberUpdate},
    web::{
        types::{ClientInfo, DataParsingError, Source, SubscribeRequest, ValidEmail},
        WebResult,
    },
    AppState,
};

// ###################################
// ->   ERROR
// ###################################
#[derive(Debug, thiserror::Error)]
pub enum SubscribeError {
    #[error("data parsing error: {0}")]
    DataParsing(#[from] DataParsingError),
    #[error("request body is not a subscription request: {0}")]
    Body(#[from] serde_json::Error),
    #[error("failed to read the request body: {0}")]
    BodyRead(#[from] BytesRejection),

    #[error("{attempts} subscription attempts inside the rate limit window")]
    RateLimited { attempts: i64 },
    #[error("failed to count recent attempts: {0}")]
    RateLimitCheck(StoreError),

    #[error("failed to look up the subscriber: {0}")]
    Lookup(StoreError),
    #[error("failed to reactivate the subscriber: {0}")]
    Reactivate(StoreError),
    #[error("failed to insert the subscriber: {0}")]
    Insert(StoreError),
}

// ###################################
// ->   OUTCOME
// ###################################
/// Every way a subscription request can succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum SubscribeOutcome {
    #[display("Successfully subscribed! We'll notify you when new features launch.")]
    Created,
    #[display("You are already subscribed to our newsletter!")]
    AlreadySubscribed,
    #[display("Welcome back! Your subscription has been reactivated.")]
    Reactivated,
}

impl SubscribeOutcome {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SubscribeOutcome::Created => StatusCode::CREATED,
            SubscribeOutcome::AlreadySubscribed | SubscribeOutcome::Reactivated => StatusCode::OK,
        }
    }
}

impl IntoResponse for SubscribeOutcome {
    fn into_response(self) -> Response {
        (self.status_code(), Json(json!({ "message": self.to_string() }))).into_response()
    }
}

// ###################################
// ->   API
// ###################################
#[tracing::instrument(
    name = "Subscribing to the newsletter",
    skip(app_state, body),
    fields(client_ip = %client.ip)
)]
pub async fn subscribe(
    State(app_state): State<AppState>,
    client: ClientInfo,
    body: Result<Bytes, BytesRejection>,
) -> WebResult<SubscribeOutcome> {
    let body = body.map_err(SubscribeError::BodyRead)?;
    let request: SubscribeRequest = serde_json::from_slice(&body).map_err(SubscribeError::Body)?;

    let outcome = process_subscription(
        app_state.store.as_ref(),
        &app_state.rate_limit,
        request,
        &client,
        Utc::now(),
    )
    .await?;

    info!("SUCCESS: {outcome:?}");
    Ok(outcome)
}

/// Validates the request, enforces the per-IP rate limit and converges the
/// store to an active subscriber for the email.
/// Performs at most one mutating store call.
pub async fn process_subscription(
    store: &dyn SubscriberStore,
    rate_limit: &RateLimitConfig,
    request: SubscribeRequest,
    client: &ClientInfo,
    now: DateTime<Utc>,
) -> Result<SubscribeOutcome, SubscribeError> {
    let email = ValidEmail::parse(request.email.unwrap_or_default())?;
    let source = Source::parse(request.source);

    check_rate_limit(store, rate_limit, &client.ip, now).await?;

    match store.find_by_email(&email).await {
        Ok(existing) if existing.is_active => Ok(SubscribeOutcome::AlreadySubscribed),
        Ok(lapsed) => reactivate_subscriber(store, &lapsed, source, client, now).await,
        Err(StoreError::NotFound) => insert_subscriber(store, email, source, client).await,
        Err(er) => {
            error!(error = %er, "subscriber lookup failed");
            Err(SubscribeError::Lookup(er))
        }
    }
}

// ###################################
// ->   HELPERS
// ###################################
/// Rejects the request once `ip` has created `max_attempts` subscribers inside the window.
/// A failing count query only blocks the request when `fail_open` is off.
async fn check_rate_limit(
    store: &dyn SubscriberStore,
    rate_limit: &RateLimitConfig,
    ip: &str,
    now: DateTime<Utc>,
) -> Result<(), SubscribeError> {
    let since = now - rate_limit.window();

    match store.count_recent_by_ip(ip, since).await {
        Ok(attempts) if attempts >= i64::from(rate_limit.max_attempts) => {
            info!(attempts, "rate limit exceeded");
            Err(SubscribeError::RateLimited { attempts })
        }
        Ok(_) => Ok(()),
        Err(er) if rate_limit.fail_open => {
            error!(error = %er, "rate limit check failed, letting the request through");
            Ok(())
        }
        Err(er) => {
            error!(error = %er, "rate limit check failed, rejecting the request");
            Err(SubscribeError::RateLimitCheck(er))
        }
    }
}

#[tracing::instrument(
    name = "Reactivating a lapsed subscriber",
    skip_all,
    fields(subscriber_id = %lapsed.id)
)]
async fn reactivate_subscriber(
    store: &dyn SubscriberStore,
    lapsed: &Subscriber,
    source: Source,
    client: &ClientInfo,
    now: DateTime<Utc>,
) -> Result<SubscribeOutcome, SubscribeError> {
    let update = SubscriberUpdate {
        is_active: true,
        subscribed_at: now,
        source: source.to_string(),
        ip_address: client.ip.clone(),
        user_agent: client.user_agent.clone(),
    };

    store.update_by_id(lapsed.id, &update).await.map_err(|er| {
        error!(error = %er, "subscriber reactivation failed");
        SubscribeError::Reactivate(er)
    })?;

    Ok(SubscribeOutcome::Reactivated)
}

/// Inserts a new subscriber. A unique violation means a concurrent request
/// for the same email got there first, which is reported as already subscribed.
#[tracing::instrument(name = "Saving new subscriber to the store", skip_all)]
async fn insert_subscriber(
    store: &dyn SubscriberStore,
    email: ValidEmail,
    source: Source,
    client: &ClientInfo,
) -> Result<SubscribeOutcome, SubscribeError> {
    let new_subscriber = NewSubscriber {
        email: email.to_string(),
        source: source.to_string(),
        ip_address: client.ip.clone(),
        user_agent: client.user_agent.clone(),
    };

    match store.insert(&new_subscriber).await {
        Ok(_) => Ok(SubscribeOutcome::Created),
        Err(StoreError::UniqueViolation) => {
            info!("lost an insert race for the same email");
            Ok(SubscribeOutcome::AlreadySubscribed)
        }
        Err(er) => {
            error!(error = %er, "subscriber insert failed");
            Err(SubscribeError::Insert(er))
        }
    }
}
