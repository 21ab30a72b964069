//! Integration tests for the konsenti broker.
//!
//! This suite spins up the real application router and a stub identity
//! provider in the same process, then drives the full
//! begin → redirect → callback handshake over HTTP:
//! 1. `GET /` must answer with a redirect to the provider's consent screen.
//! 2. The `state` embedded in the redirect must complete the flow exactly
//!    once; replays and forged values must be rejected without ever reaching
//!    the provider's token endpoint.

use anyhow::{anyhow, Context, Result};
use axum::{routing::post, Json, Router};
use konsenti::konsenti::{
    self as broker, config::Config, oauth::ProviderClient, state::StateRegistry,
};
use reqwest::{redirect::Policy, StatusCode};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use url::Url;

async fn spawn(router: Router) -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        let _ = axum::serve(listener, router.into_make_service()).await;
    });

    Ok(format!("http://{addr}"))
}

/// Stub provider token endpoint counting how often it is hit.
fn stub_provider(hits: Arc<AtomicUsize>) -> Router {
    Router::new().route(
        "/token",
        post(move || {
            let hits = Arc::clone(&hits);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Json(json!({
                    "access_token": "stub-access-token",
                    "token_type": "Bearer",
                    "expires_in": 3600,
                    "refresh_token": "stub-refresh-token"
                }))
            }
        }),
    )
}

fn test_config(provider_base: &str, state_ttl_seconds: u64) -> Result<Config> {
    let config: Config = serde_json::from_value(json!({
        "client_id": "integration-client",
        "client_secret": "integration-secret",
        "scopes": ["openid", "email"],
        "redirect_url": "http://localhost:8080/oauth_callback",
        "auth_url_params": {"access_type": "offline"},
        "state_ttl_seconds": state_ttl_seconds,
        "token_url": format!("{provider_base}/token")
    }))?;

    config.validate()?;

    Ok(config)
}

async fn start_app(config: &Config) -> Result<String> {
    let registry = Arc::new(StateRegistry::new(Duration::from_secs(
        config.state_ttl_seconds,
    )));
    let provider = Arc::new(ProviderClient::new(config)?);

    spawn(broker::router(registry, provider)).await
}

fn no_redirect_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(Policy::none())
        .build()
        .context("failed to build test client")
}

/// Begin a flow and return the state token embedded in the redirect.
async fn begin_flow(client: &reqwest::Client, app: &str) -> Result<String> {
    let begin = client.get(format!("{app}/")).send().await?;
    assert_eq!(begin.status(), StatusCode::FOUND);

    let location = begin
        .headers()
        .get("location")
        .context("missing Location header")?
        .to_str()?
        .to_string();

    let url = Url::parse(&location)?;
    assert_eq!(url.host_str(), Some("accounts.google.com"));
    assert!(location.contains("access_type=offline"));

    url.query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| anyhow!("state missing from authorization URL"))
}

#[tokio::test]
async fn full_handshake_roundtrip_and_replay() -> Result<()> {
    let hits = Arc::new(AtomicUsize::new(0));
    let provider_base = spawn(stub_provider(Arc::clone(&hits))).await?;
    let app = start_app(&test_config(&provider_base, 900)?).await?;
    let client = no_redirect_client()?;

    let state = begin_flow(&client, &app).await?;

    let complete = client
        .get(format!("{app}/oauth_callback"))
        .query(&[("state", state.as_str()), ("code", "4/authcode")])
        .send()
        .await?;
    assert_eq!(complete.status(), StatusCode::OK);
    assert_eq!(
        complete
            .headers()
            .get("cache-control")
            .and_then(|value| value.to_str().ok()),
        Some("no-store")
    );

    let credential: serde_json::Value = complete.json().await?;
    assert_eq!(credential["access_token"], "stub-access-token");
    assert_eq!(credential["refresh_token"], "stub-refresh-token");
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // Replaying the same callback URL must fail without a second exchange.
    let replay = client
        .get(format!("{app}/oauth_callback"))
        .query(&[("state", state.as_str()), ("code", "4/authcode")])
        .send()
        .await?;
    assert_eq!(replay.status(), StatusCode::BAD_REQUEST);
    assert_eq!(replay.text().await?, "invalid state");
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    Ok(())
}

#[tokio::test]
async fn forged_state_is_rejected_without_exchange() -> Result<()> {
    let hits = Arc::new(AtomicUsize::new(0));
    let provider_base = spawn(stub_provider(Arc::clone(&hits))).await?;
    let app = start_app(&test_config(&provider_base, 900)?).await?;
    let client = no_redirect_client()?;

    let forged = "0".repeat(128);
    let response = client
        .get(format!("{app}/oauth_callback"))
        .query(&[("state", forged.as_str()), ("code", "4/authcode")])
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.text().await?, "invalid state");
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    Ok(())
}

#[tokio::test]
async fn missing_callback_parameters_are_rejected() -> Result<()> {
    let hits = Arc::new(AtomicUsize::new(0));
    let provider_base = spawn(stub_provider(Arc::clone(&hits))).await?;
    let app = start_app(&test_config(&provider_base, 900)?).await?;
    let client = no_redirect_client()?;

    let response = client.get(format!("{app}/oauth_callback")).send().await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    Ok(())
}

#[tokio::test]
async fn expired_state_is_rejected_without_exchange() -> Result<()> {
    let hits = Arc::new(AtomicUsize::new(0));
    let provider_base = spawn(stub_provider(Arc::clone(&hits))).await?;

    let config = test_config(&provider_base, 900)?;
    let registry = Arc::new(StateRegistry::new(Duration::from_millis(1)));
    let provider = Arc::new(ProviderClient::new(&config)?);
    let app = spawn(broker::router(registry, provider)).await?;
    let client = no_redirect_client()?;

    let state = begin_flow(&client, &app).await?;

    tokio::time::sleep(Duration::from_millis(50)).await;

    let response = client
        .get(format!("{app}/oauth_callback"))
        .query(&[("state", state.as_str()), ("code", "4/authcode")])
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.text().await?, "expired state");
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    Ok(())
}

#[tokio::test]
async fn health_reports_build_info() -> Result<()> {
    let hits = Arc::new(AtomicUsize::new(0));
    let provider_base = spawn(stub_provider(hits)).await?;
    let app = start_app(&test_config(&provider_base, 900)?).await?;

    let response = reqwest::get(format!("{app}/health")).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-app"));

    let health: serde_json::Value = response.json().await?;
    assert_eq!(health["name"], "konsenti");

    Ok(())
}
