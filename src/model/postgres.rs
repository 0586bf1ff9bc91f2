use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;
use uuid::Uuid;

use super::{NewSubscriber, StoreError, StoreResult, Subscriber, SubscriberStore, SubscriberUpdate};
use crate::config::{DbConfig, StoreConfig};

const UNIQUE_VIOLATION: &str = "23505";

/// Direct Postgres connection through an `sqlx` pool.
#[derive(Clone, Debug)]
pub struct PgStore {
    db: PgPool,
    table: String,
}

impl PgStore {
    pub async fn init(config: &StoreConfig) -> StoreResult<Self> {
        info!("{:<20} - Initializing the DB pool", "init_db");
        let max_cons = if cfg!(test) { 1 } else { 5 };

        let db_config = DbConfig::from_store_config(config).map_err(StoreError::other)?;

        let db_pool = PgPoolOptions::new()
            .max_connections(max_cons)
            .acquire_timeout(Duration::from_millis(config.timeout_millis))
            .connect_with(db_config.connection_options())
            .await
            .map_err(|er| StoreError::Other(format!("failed to create db pool: {er}")))?;

        Ok(Self::new(db_pool, config.table.clone()))
    }

    pub fn new(db: PgPool, table: String) -> Self {
        PgStore { db, table }
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db)
            .await
            .map_err(StoreError::other)
    }
}

#[async_trait]
impl SubscriberStore for PgStore {
    async fn count_recent_by_ip(&self, ip: &str, since: DateTime<Utc>) -> StoreResult<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE ip_address = $1 AND created_at >= $2",
            self.table
        );
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(ip)
            .bind(since)
            .fetch_one(&self.db)
            .await?;

        Ok(count)
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Subscriber> {
        let sql = format!("SELECT * FROM {} WHERE email = $1", self.table);
        sqlx::query_as::<_, Subscriber>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn insert(&self, new_subscriber: &NewSubscriber) -> StoreResult<Subscriber> {
        let sql = format!(
            r#"INSERT INTO {} (email, source, ip_address, user_agent)
            VALUES ($1, $2, $3, $4)
            RETURNING *"#,
            self.table
        );
        let subscriber = sqlx::query_as::<_, Subscriber>(&sql)
            .bind(&new_subscriber.email)
            .bind(&new_subscriber.source)
            .bind(&new_subscriber.ip_address)
            .bind(&new_subscriber.user_agent)
            .fetch_one(&self.db)
            .await?;

        Ok(subscriber)
    }

    async fn update_by_id(&self, id: Uuid, update: &SubscriberUpdate) -> StoreResult<Subscriber> {
        let sql = format!(
            r#"UPDATE {}
            SET is_active = $2, subscribed_at = $3, source = $4, ip_address = $5, user_agent = $6
            WHERE id = $1
            RETURNING *"#,
            self.table
        );
        sqlx::query_as::<_, Subscriber>(&sql)
            .bind(id)
            .bind(update.is_active)
            .bind(update.subscribed_at)
            .bind(&update.source)
            .bind(&update.ip_address)
            .bind(&update.user_agent)
            .fetch_optional(&self.db)
            .await?
            .ok_or(StoreError::NotFound)
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(er: sqlx::Error) -> Self {
        match er {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db_er) if db_er.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                StoreError::UniqueViolation
            }
            er => StoreError::Other(er.to_string()),
        }
    }
}
