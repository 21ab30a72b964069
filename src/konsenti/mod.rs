#[allow(unused_imports)]
use crate::konsenti::handlers::{
    callback, callback::__path_callback, health, health::__path_health, login, login::__path_login,
};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Method, Request},
    routing::get,
    Extension, Router,
};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{debug_span, info, Span};
use ulid::Ulid;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod config;
pub mod handlers;
pub mod oauth;
pub mod state;

use config::Config;
use oauth::ProviderClient;
use state::StateRegistry;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(OpenApi)]
#[openapi(
    paths(health, login, callback),
    components(
        schemas(health::Health, oauth::Credential)
    ),
    tags(
        (name = "konsenti", description = "OAuth2 authorization code flow broker API"),
    )

)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

/// Build the application router around a shared registry and provider client.
#[must_use]
pub fn router(registry: Arc<StateRegistry>, provider: Arc<ProviderClient>) -> Router {
    let cors = CorsLayer::new()
        // the broker only serves `GET`
        .allow_methods([Method::GET])
        // allow requests from any origin
        .allow_origin(Any);

    Router::new()
        .route("/", get(handlers::login))
        .route("/oauth_callback", get(handlers::callback))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(registry))
                .layer(Extension(provider)),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/openapi.json", openapi()))
        .route("/health", get(handlers::health).options(handlers::health))
}

/// Start the broker with the provided configuration.
/// # Errors
/// Returns an error if the configuration is invalid or the server fails to
/// start.
pub async fn new(config: Config) -> Result<()> {
    config.validate()?;

    let registry = Arc::new(StateRegistry::new(Duration::from_secs(
        config.state_ttl_seconds,
    )));
    let provider =
        Arc::new(ProviderClient::new(&config).context("failed to build provider client")?);

    let port = config.port;
    let app = router(registry, provider);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

// span
fn make_span(request: &Request<Body>) -> Span {
    let headers = request.headers();
    let path = request.uri().path();
    let request_id = headers
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    debug_span!("http-request", path, ?headers, request_id)
}
