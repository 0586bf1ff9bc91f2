//! The `Subscriber` entity and the storage abstraction the web layer talks to.
//!
//! Every backend speaks the same closed error vocabulary (`StoreError`), so the
//! handler branches on variants instead of backend specific codes.

mod memory;
mod postgres;
mod rest;

// re-exports
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use rest::RestStore;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::config::{StoreBackend, StoreConfig};

// ###################################
// ->   STRUCTS
// ###################################
/// A stored newsletter opt-in. One row per lowercased email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscriber {
    pub id: Uuid,
    pub email: String,
    pub is_active: bool,
    pub source: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub subscribed_at: DateTime<Utc>,
}

/// The fields supplied on first insert. The store assigns `id`, `is_active`
/// and both timestamps.
#[derive(Debug, Clone, Serialize)]
pub struct NewSubscriber {
    pub email: String,
    pub source: String,
    pub ip_address: String,
    pub user_agent: Option<String>,
}

/// The fields overwritten when a lapsed subscriber signs up again.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriberUpdate {
    pub is_active: bool,
    pub subscribed_at: DateTime<Utc>,
    pub source: String,
    pub ip_address: String,
    pub user_agent: Option<String>,
}

// ###################################
// ->   STORE
// ###################################
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    /// Number of subscribers created from `ip` at or after `since`.
    async fn count_recent_by_ip(&self, ip: &str, since: DateTime<Utc>) -> StoreResult<i64>;

    /// Returns `Err(StoreError::NotFound)` when no row has this email.
    async fn find_by_email(&self, email: &str) -> StoreResult<Subscriber>;

    /// Returns `Err(StoreError::UniqueViolation)` when the email is taken.
    async fn insert(&self, new_subscriber: &NewSubscriber) -> StoreResult<Subscriber>;

    async fn update_by_id(&self, id: Uuid, update: &SubscriberUpdate) -> StoreResult<Subscriber>;

    fn backend_name(&self) -> &'static str;
}

/// Builds the backend selected in the configuration.
pub async fn init_store(config: &StoreConfig) -> StoreResult<Arc<dyn SubscriberStore>> {
    info!(
        "{:<20} - {}",
        "Initializing store:",
        config.backend.as_ref()
    );

    let store: Arc<dyn SubscriberStore> = match config.backend {
        StoreBackend::Rest => Arc::new(RestStore::new(config)?),
        StoreBackend::Postgres => {
            let store = PgStore::init(config).await?;
            if config.migrate_on_start {
                store.migrate().await?;
            }
            Arc::new(store)
        }
        StoreBackend::Memory => Arc::new(MemoryStore::default()),
    };
    info!("{:<20} - {}", "Store ready:", store.backend_name());

    Ok(store)
}

// ###################################
// ->   ERROR
// ###################################
pub type StoreResult<T> = core::result::Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("no subscriber matched the query")]
    NotFound,
    #[error("a subscriber with this email already exists")]
    UniqueViolation,
    #[error("store error: {0}")]
    Other(String),
}

impl StoreError {
    pub fn other(er: impl std::fmt::Display) -> Self {
        StoreError::Other(er.to_string())
    }
}
