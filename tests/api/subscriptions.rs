use anyhow::Result;
use chrono::{TimeDelta, Utc};
use claims::{assert_gt, assert_none, assert_some};
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};

use crate::helpers::{assert_cors_headers, subscriber, TestApp};

const CREATED_MSG: &str = "Successfully subscribed! We'll notify you when new features launch.";
const ALREADY_MSG: &str = "You are already subscribed to our newsletter!";
const WELCOME_BACK_MSG: &str = "Welcome back! Your subscription has been reactivated.";

#[tokio::test]
async fn subscribe_new_email_201_and_stored_lowercased() -> Result<()> {
    let app = TestApp::spawn().await?;

    let res = app
        .post_subscribe(&json!({
            "email": "USER@Example.COM",
            "source": "coming_soon_modal"
        }))
        .await?;

    assert_eq!(res.status(), StatusCode::CREATED);
    assert_cors_headers(&res);
    let body: Value = res.json().await?;
    assert_eq!(body, json!({ "message": CREATED_MSG }));

    let row = assert_some!(app.store.get("user@example.com")?);
    assert!(row.is_active);
    assert_eq!(row.source, "coming_soon_modal");
    assert_eq!(row.ip_address.as_deref(), Some("203.0.113.7"));
    assert_eq!(row.user_agent.as_deref(), Some("integration-test"));
    assert_none!(app.store.get("USER@Example.COM")?);

    Ok(())
}

#[tokio::test]
async fn subscribe_without_source_defaults_to_website() -> Result<()> {
    let app = TestApp::spawn().await?;

    let res = app
        .post_subscribe(&json!({ "email": "jane@example.com" }))
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);

    let row = assert_some!(app.store.get("jane@example.com")?);
    assert_eq!(row.source, "website");

    Ok(())
}

#[tokio::test]
async fn subscribe_invalid_email_400_without_mutation() -> Result<()> {
    let app = TestApp::spawn().await?;

    let tests = [
        (json!({}), "Email is required", "Missing email"),
        (json!({ "email": null }), "Email is required", "Null email"),
        (json!({ "email": "" }), "Email is required", "Empty email"),
        (json!({ "email": "   " }), "Email is required", "Blank email"),
        (json!({ "email": "plainaddress" }), "Invalid email format", "Missing @"),
        (json!({ "email": "user@example" }), "Invalid email format", "Missing TLD"),
        (json!({ "email": "@example.com" }), "Invalid email format", "Missing local part"),
        (json!({ "email": "user@example.c" }), "Invalid email format", "One letter TLD"),
    ];

    for (request, expected, case) in tests {
        let res = app.post_subscribe(&request).await?;
        assert_eq!(
            res.status(),
            StatusCode::BAD_REQUEST,
            "Wrong response: ({}); for request with: {case}",
            res.status()
        );
        assert_cors_headers(&res);
        let body: Value = res.json().await?;
        assert_eq!(body, json!({ "error": expected }), "case: {case}");
    }

    assert!(app.store.is_empty()?);

    Ok(())
}

#[tokio::test]
async fn subscribe_email_over_254_chars_400() -> Result<()> {
    let app = TestApp::spawn().await?;
    let email = format!("{}@example.com", "a".repeat(250));

    let res = app.post_subscribe(&json!({ "email": email })).await?;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await?;
    assert_eq!(body, json!({ "error": "Email address too long" }));
    assert!(app.store.is_empty()?);

    Ok(())
}

#[tokio::test]
async fn sixth_attempt_from_same_ip_429() -> Result<()> {
    let app = TestApp::spawn().await?;
    let ip = "192.0.2.10";

    for n in 0..5 {
        let res = app
            .post_subscribe_from(&json!({ "email": format!("reader{n}@example.com") }), ip)
            .await?;
        assert_eq!(res.status(), StatusCode::CREATED, "attempt {n}");
    }

    let res = app
        .post_subscribe_from(&json!({ "email": "reader5@example.com" }), ip)
        .await?;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_cors_headers(&res);
    let body: Value = res.json().await?;
    assert_eq!(
        body,
        json!({ "error": "Too many subscription attempts. Please try again later." })
    );
    assert_none!(app.store.get("reader5@example.com")?);
    assert_eq!(app.store.len()?, 5);

    // Other clients are unaffected
    let res = app
        .post_subscribe_from(&json!({ "email": "reader5@example.com" }), "192.0.2.11")
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);

    Ok(())
}

#[tokio::test]
async fn rate_limit_uses_first_forwarded_hop() -> Result<()> {
    let app = TestApp::spawn().await?;

    for n in 0..6 {
        let res = app
            .post_subscribe_from(
                &json!({ "email": format!("hop{n}@example.com") }),
                &format!("192.0.2.20, 10.0.0.{n}"),
            )
            .await?;
        let expected = if n < 5 {
            StatusCode::CREATED
        } else {
            StatusCode::TOO_MANY_REQUESTS
        };
        assert_eq!(res.status(), expected, "attempt {n}");
    }

    let row = assert_some!(app.store.get("hop0@example.com")?);
    assert_eq!(row.ip_address.as_deref(), Some("192.0.2.20"));

    Ok(())
}

#[tokio::test]
async fn concurrent_duplicate_signups_both_succeed_with_one_row() -> Result<()> {
    let app = TestApp::spawn().await?;
    let request = json!({ "email": "race@example.com" });

    let (first, second) = tokio::join!(
        app.post_subscribe(&request),
        app.post_subscribe(&request)
    );
    let (first, second) = (first?, second?);

    for res in [first, second] {
        assert!(res.status().is_success(), "got {}", res.status());
        let body: Value = res.json().await?;
        let message = body["message"].as_str().unwrap_or_default().to_string();
        assert!(
            message == CREATED_MSG || message == ALREADY_MSG,
            "unexpected message: {message}"
        );
    }

    assert_eq!(app.store.len()?, 1);
    assert_some!(app.store.get("race@example.com")?);

    Ok(())
}

#[tokio::test]
async fn lapsed_subscriber_is_reactivated() -> Result<()> {
    let app = TestApp::spawn().await?;
    let month_ago = Utc::now() - TimeDelta::days(30);
    let lapsed = subscriber("lapsed@example.com", false, month_ago);
    app.store.seed(lapsed.clone())?;

    let res = app
        .post_subscribe(&json!({ "email": "Lapsed@Example.com", "source": "footer" }))
        .await?;

    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body, json!({ "message": WELCOME_BACK_MSG }));

    let row = assert_some!(app.store.get("lapsed@example.com")?);
    assert!(row.is_active);
    assert_eq!(row.id, lapsed.id);
    assert_eq!(row.created_at, lapsed.created_at);
    assert_gt!(row.subscribed_at, lapsed.subscribed_at);
    assert_eq!(row.source, "footer");
    assert_eq!(row.ip_address.as_deref(), Some("203.0.113.7"));
    assert_eq!(row.user_agent.as_deref(), Some("integration-test"));

    Ok(())
}

#[tokio::test]
async fn active_subscriber_is_left_untouched() -> Result<()> {
    let app = TestApp::spawn().await?;
    let active = subscriber("active@example.com", true, Utc::now() - TimeDelta::days(2));
    app.store.seed(active.clone())?;

    let res = app
        .post_subscribe(&json!({ "email": "active@example.com", "source": "footer" }))
        .await?;

    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body, json!({ "message": ALREADY_MSG }));
    assert_eq!(app.store.get("active@example.com")?, Some(active));

    Ok(())
}

#[tokio::test]
async fn options_preflight_200_ok_regardless_of_body() -> Result<()> {
    let app = TestApp::spawn().await?;

    let res = app
        .http_client
        .request(Method::OPTIONS, app.subscribe_url())
        .body("{ this is not json")
        .send()
        .await?;

    assert_eq!(res.status(), StatusCode::OK);
    assert_cors_headers(&res);
    assert_eq!(res.text().await?, "ok");
    assert!(app.store.is_empty()?);

    Ok(())
}

#[tokio::test]
async fn other_methods_405() -> Result<()> {
    let app = TestApp::spawn().await?;

    for method in [Method::GET, Method::PUT, Method::DELETE, Method::PATCH] {
        let res = app
            .http_client
            .request(method.clone(), app.subscribe_url())
            .send()
            .await?;

        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED, "{method}");
        assert_cors_headers(&res);
        let body: Value = res.json().await?;
        assert_eq!(body, json!({ "error": "Method not allowed" }));
    }

    Ok(())
}

#[tokio::test]
async fn unreadable_body_500_generic_message() -> Result<()> {
    let app = TestApp::spawn().await?;

    let res = app
        .http_client
        .post(app.subscribe_url())
        .header("content-type", "application/json")
        .body("{ this is not json")
        .send()
        .await?;

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_cors_headers(&res);
    let body: Value = res.json().await?;
    assert_eq!(body, json!({ "error": "An unexpected error occurred" }));

    Ok(())
}
