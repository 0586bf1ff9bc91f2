//! Spawns the full router on a random port backed by a `MemoryStore`.
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{Arc, OnceLock},
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use dappdir_newsletter::{
    config::RateLimitConfig,
    init_dbg_tracing,
    model::{MemoryStore, Subscriber},
    App, AppState,
};
use serde_json::Value;
use tokio::net::TcpListener;
use tracing::info;
use uuid::Uuid;

/// Trying to bind port 0 will trigger an OS scan for an available port
/// which will then be bound to the application.
const TEST_SOCK_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 0);

fn _init_test_subscriber() {
    static SUBSCRIBER: OnceLock<()> = OnceLock::new();
    SUBSCRIBER.get_or_init(|| {
        init_dbg_tracing();
    });
}

pub struct TestApp {
    pub addr: SocketAddr,
    pub http_client: reqwest::Client,
    pub store: Arc<MemoryStore>,
}

impl TestApp {
    pub async fn spawn() -> Result<Self> {
        Self::spawn_with(RateLimitConfig::default()).await
    }

    /// A helper function that spawns the app in a separate task and returns
    /// the handles needed to talk to it and inspect its store.
    pub async fn spawn_with(rate_limit: RateLimitConfig) -> Result<Self> {
        // _init_test_subscriber();

        let store = Arc::new(MemoryStore::default());
        let app_state = AppState::new(store.clone(), rate_limit);

        let listener = TcpListener::bind(TEST_SOCK_ADDR).await?;
        let addr = listener.local_addr()?;
        info!("Listening on {addr}");

        tokio::spawn(dappdir_newsletter::serve(App::new(app_state, listener)));

        Ok(TestApp {
            addr,
            http_client: reqwest::Client::new(),
            store,
        })
    }

    pub fn subscribe_url(&self) -> String {
        format!("http://{}/newsletter-subscribe", self.addr)
    }

    pub async fn post_subscribe(&self, body: &Value) -> Result<reqwest::Response> {
        self.post_subscribe_from(body, "203.0.113.7").await
    }

    /// Posts as if the request came through a proxy for `ip`.
    pub async fn post_subscribe_from(&self, body: &Value, ip: &str) -> Result<reqwest::Response> {
        let res = self
            .http_client
            .post(self.subscribe_url())
            .header("x-forwarded-for", ip)
            .header("user-agent", "integration-test")
            .json(body)
            .send()
            .await?;
        Ok(res)
    }
}

pub fn subscriber(email: &str, is_active: bool, created_at: DateTime<Utc>) -> Subscriber {
    Subscriber {
        id: Uuid::new_v4(),
        email: email.to_string(),
        is_active,
        source: "website".to_string(),
        ip_address: Some("198.51.100.1".to_string()),
        user_agent: None,
        created_at,
        subscribed_at: created_at,
    }
}

pub fn assert_cors_headers(res: &reqwest::Response) {
    let headers = res.headers();
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(
        headers["access-control-allow-headers"],
        "authorization, x-client-info, apikey, content-type"
    );
    assert_eq!(headers["access-control-allow-methods"], "POST, OPTIONS");
}
