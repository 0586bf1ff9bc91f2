use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{
    header::{HeaderMap, ACCEPT, CONTENT_RANGE},
    Client, Method, RequestBuilder, Response, Url,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize};
use uuid::Uuid;

use super::{NewSubscriber, StoreError, StoreResult, Subscriber, SubscriberStore, SubscriberUpdate};
use crate::config::StoreConfig;

/// Makes PostgREST answer with a single JSON object, or an error when the
/// result is not exactly one row.
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// A client for the hosted database's PostgREST interface, authenticated
/// with the service credential.
#[derive(Debug)]
pub struct RestStore {
    http_client: Client,
    url: Url,
    service_key: SecretString,
}

impl RestStore {
    pub fn new(config: &StoreConfig) -> StoreResult<Self> {
        let mut base =
            Url::parse(&config.url).map_err(|er| StoreError::Other(format!("store url: {er}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let url = base
            .join(&format!("rest/v1/{}", config.table))
            .map_err(|er| StoreError::Other(format!("store url: {er}")))?;

        let http_client = Client::builder().timeout(config.timeout()).build()?;

        Ok(RestStore {
            http_client,
            url,
            service_key: config.service_key.clone(),
        })
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let key = self.service_key.expose_secret();
        self.http_client
            .request(method, url)
            .header("apikey", key)
            .bearer_auth(key)
    }

    fn url_with<'a>(&self, query: impl IntoIterator<Item = (&'a str, String)>) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .extend_pairs(query.into_iter().map(|(k, v)| (k.to_string(), v)));
        url
    }

    async fn single_object<T: DeserializeOwned>(resp: Response) -> StoreResult<T> {
        let resp = error_for_status(resp).await?;
        resp.json::<T>().await.map_err(StoreError::other)
    }
}

#[async_trait]
impl SubscriberStore for RestStore {
    async fn count_recent_by_ip(&self, ip: &str, since: DateTime<Utc>) -> StoreResult<i64> {
        let since = since.to_rfc3339_opts(SecondsFormat::Micros, true);
        let url = self.url_with([
            ("select", "id".to_string()),
            ("ip_address", format!("eq.{ip}")),
            ("created_at", format!("gte.{since}")),
        ]);

        let resp = self
            .request(Method::HEAD, url)
            .header("Prefer", "count=exact")
            .send()
            .await?;
        let resp = error_for_status(resp).await?;

        content_range_total(resp.headers())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Subscriber> {
        let url = self.url_with([("select", "*".to_string()), ("email", format!("eq.{email}"))]);

        let resp = self
            .request(Method::GET, url)
            .header(ACCEPT, SINGLE_OBJECT)
            .send()
            .await?;

        Self::single_object(resp).await
    }

    async fn insert(&self, new_subscriber: &NewSubscriber) -> StoreResult<Subscriber> {
        let resp = self
            .request(Method::POST, self.url.clone())
            .header(ACCEPT, SINGLE_OBJECT)
            .header("Prefer", "return=representation")
            .json(new_subscriber)
            .send()
            .await?;

        Self::single_object(resp).await
    }

    async fn update_by_id(&self, id: Uuid, update: &SubscriberUpdate) -> StoreResult<Subscriber> {
        let url = self.url_with([("id", format!("eq.{id}"))]);

        let resp = self
            .request(Method::PATCH, url)
            .header(ACCEPT, SINGLE_OBJECT)
            .header("Prefer", "return=representation")
            .json(update)
            .send()
            .await?;

        Self::single_object(resp).await
    }

    fn backend_name(&self) -> &'static str {
        "rest"
    }
}

// ###################################
// ->   HELPERS
// ###################################
/// The error body PostgREST sends with any non-2xx response.
#[derive(Debug, Deserialize)]
struct PostgrestError {
    code: String,
    message: String,
    #[serde(default)]
    details: Option<String>,
}

impl From<PostgrestError> for StoreError {
    fn from(er: PostgrestError) -> Self {
        match er.code.as_str() {
            "PGRST116" => StoreError::NotFound,
            "23505" => StoreError::UniqueViolation,
            code => StoreError::Other(format!(
                "{code}: {} ({})",
                er.message,
                er.details.unwrap_or_default()
            )),
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(er: reqwest::Error) -> Self {
        StoreError::Other(format!("http error: {er}"))
    }
}

async fn error_for_status(resp: Response) -> StoreResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let er = match serde_json::from_str::<PostgrestError>(&body) {
        Ok(er) => er.into(),
        Err(_) => StoreError::Other(format!("unexpected status {status}: {body}")),
    };

    Err(er)
}

/// `Content-Range: 0-24/3573` or `*/0` -> the total after the slash.
fn content_range_total(headers: &HeaderMap) -> StoreResult<i64> {
    headers
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.rsplit_once('/'))
        .and_then(|(_, total)| total.parse().ok())
        .ok_or_else(|| StoreError::other("missing or invalid Content-Range header"))
}
