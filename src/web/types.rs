//! Request data for the `web` module: what can be deserialized, what it parses into,
//! and the tests for those parsers.

use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{header::USER_AGENT, request::Parts, HeaderMap},
};
use derive_more::{Deref, Display};
use lazy_regex::regex_is_match;
use serde::Deserialize;

/// Longest address accepted, in characters.
pub const MAX_EMAIL_LEN: usize = 254;
pub const DEFAULT_SOURCE: &str = "website";
/// Used when the proxy headers carry no usable address.
pub const FALLBACK_IP: &str = "127.0.0.1";

// ###################################
// ->   STRUCTS
// ###################################
/// Deserializable subscription request.
/// Both fields may be missing or invalid until parsed.
#[derive(Debug, Default, Deserialize)]
pub struct SubscribeRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

/// Validated, lowercased subscriber email.
#[derive(Debug, Clone, PartialEq, Eq, Deref, Display)]
pub struct ValidEmail(String);

impl AsRef<str> for ValidEmail {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl ValidEmail {
    /// Checks run in order and the first failure wins:
    /// presence, then format, then length.
    pub fn parse<S>(value: S) -> Result<Self, DataParsingError>
    where
        S: AsRef<str>,
    {
        let value = value.as_ref().trim();

        if value.is_empty() {
            return Err(DataParsingError::EmailMissing);
        }

        if !regex_is_match!(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$", value) {
            return Err(DataParsingError::EmailInvalid);
        }

        if value.chars().count() > MAX_EMAIL_LEN {
            return Err(DataParsingError::EmailTooLong);
        }

        Ok(ValidEmail(value.to_lowercase()))
    }
}

/// The UI surface that produced the signup.
#[derive(Debug, Clone, PartialEq, Eq, Deref, Display)]
pub struct Source(String);

impl Source {
    /// Missing or blank sources fall back to `DEFAULT_SOURCE`.
    pub fn parse(value: Option<String>) -> Self {
        match value.as_deref().map(str::trim) {
            Some(source) if !source.is_empty() => Source(source.to_string()),
            _ => Source(DEFAULT_SOURCE.to_string()),
        }
    }
}

/// Who sent the request, as far as the proxy headers tell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        ClientInfo {
            ip: client_ip(headers),
            user_agent: header_str(headers, USER_AGENT.as_str()).map(str::to_string),
        }
    }
}

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientInfo::from_headers(&parts.headers))
    }
}

// ###################################
// ->   HELPERS
// ###################################
/// First hop of `x-forwarded-for`, else `x-real-ip`, else `FALLBACK_IP`.
/// The literal `unknown` some proxies send counts as absent.
fn client_ip(headers: &HeaderMap) -> String {
    header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| header_str(headers, "x-real-ip").map(str::trim))
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("unknown"))
        .unwrap_or(FALLBACK_IP)
        .to_string()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

// ###################################
// ->   ERROR
// ###################################
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DataParsingError {
    #[error("email missing")]
    EmailMissing,
    #[error("email invalid")]
    EmailInvalid,
    #[error("email too long")]
    EmailTooLong,
}
