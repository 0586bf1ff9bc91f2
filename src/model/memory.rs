use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{NewSubscriber, StoreError, StoreResult, Subscriber, SubscriberStore, SubscriberUpdate};

/// An in-process store keyed by email.
/// Used for local development and by the test suite; it enforces the same
/// uniqueness contract as the database backed stores.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<String, Subscriber>>,
}

impl MemoryStore {
    /// Inserts or replaces a row as-is, bypassing the store defaults.
    pub fn seed(&self, subscriber: Subscriber) -> StoreResult<()> {
        self.lock()?.insert(subscriber.email.clone(), subscriber);
        Ok(())
    }

    pub fn get(&self, email: &str) -> StoreResult<Option<Subscriber>> {
        Ok(self.lock()?.get(email).cloned())
    }

    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.lock()?.is_empty())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, HashMap<String, Subscriber>>> {
        self.rows
            .lock()
            .map_err(|_| StoreError::other("memory store mutex poisoned"))
    }
}

#[async_trait]
impl SubscriberStore for MemoryStore {
    async fn count_recent_by_ip(&self, ip: &str, since: DateTime<Utc>) -> StoreResult<i64> {
        let count = self
            .lock()?
            .values()
            .filter(|s| s.ip_address.as_deref() == Some(ip) && s.created_at >= since)
            .count();

        Ok(count as i64)
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Subscriber> {
        self.lock()?.get(email).cloned().ok_or(StoreError::NotFound)
    }

    async fn insert(&self, new_subscriber: &NewSubscriber) -> StoreResult<Subscriber> {
        let mut rows = self.lock()?;
        if rows.contains_key(&new_subscriber.email) {
            return Err(StoreError::UniqueViolation);
        }

        let now = Utc::now();
        let subscriber = Subscriber {
            id: Uuid::new_v4(),
            email: new_subscriber.email.clone(),
            is_active: true,
            source: new_subscriber.source.clone(),
            ip_address: Some(new_subscriber.ip_address.clone()),
            user_agent: new_subscriber.user_agent.clone(),
            created_at: now,
            subscribed_at: now,
        };
        rows.insert(subscriber.email.clone(), subscriber.clone());

        Ok(subscriber)
    }

    async fn update_by_id(&self, id: Uuid, update: &SubscriberUpdate) -> StoreResult<Subscriber> {
        let mut rows = self.lock()?;
        let subscriber = rows
            .values_mut()
            .find(|s| s.id == id)
            .ok_or(StoreError::NotFound)?;

        subscriber.is_active = update.is_active;
        subscriber.subscribed_at = update.subscribed_at;
        subscriber.source = update.source.clone();
        subscriber.ip_address = Some(update.ip_address.clone());
        subscriber.user_agent = update.user_agent.clone();

        Ok(subscriber.clone())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
