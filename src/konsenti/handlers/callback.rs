use axum::{
    extract::{rejection::QueryRejection, Extension, Query},
    http::{
        header::{CACHE_CONTROL, CONTENT_TYPE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::{future::Future, pin::Pin, sync::Arc};
use tracing::{debug, error, instrument};
use utoipa::IntoParams;

use crate::konsenti::{
    handlers::valid_state,
    oauth::{Credential, ProviderClient},
    state::{ConsumeOutcome, StateRegistry},
};

#[derive(IntoParams, Debug, Deserialize)]
#[into_params(parameter_in = Query)]
pub struct CallbackArgs {
    /// Anti-forgery token round-tripped through the provider.
    state: String,
    /// Authorization code to exchange for a credential.
    code: String,
}

/// Failure modes of the callback half of the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeError {
    /// The state token was never issued, malformed, or already consumed.
    InvalidState,
    /// The state token was recognized but past its TTL.
    ExpiredState,
    /// The provider rejected the code or the network call failed.
    ExchangeFailed,
    /// The credential could not be converted to its wire format.
    SerializationFailed,
}

impl HandshakeError {
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::InvalidState | Self::ExpiredState => StatusCode::BAD_REQUEST,
            Self::ExchangeFailed | Self::SerializationFailed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::InvalidState => "invalid state",
            Self::ExpiredState => "expired state",
            Self::ExchangeFailed => "failed to exchange code",
            Self::SerializationFailed => "failed to serialize credential",
        }
    }
}

impl IntoResponse for HandshakeError {
    fn into_response(self) -> Response {
        (self.status(), self.message()).into_response()
    }
}

type CallbackResponse = Result<(StatusCode, HeaderMap, String), HandshakeError>;

trait CodeExchanger {
    fn exchange<'a>(
        &'a self,
        code: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Credential>> + Send + 'a>>;
}

impl CodeExchanger for ProviderClient {
    fn exchange<'a>(
        &'a self,
        code: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Credential>> + Send + 'a>> {
        Box::pin(self.exchange_code(code))
    }
}

#[utoipa::path(
    get,
    path= "/oauth_callback",
    params(CallbackArgs),
    responses (
        (status = 200, description = "Credential returned by the identity provider", body = Credential),
        (status = 400, description = "Invalid or expired state token", body = String),
        (status = 500, description = "Code exchange or serialization failure", body = String)
    ),
    tag = "oauth",
)]
#[instrument(skip(registry, provider, query))]
pub async fn callback(
    Extension(registry): Extension<Arc<StateRegistry>>,
    Extension(provider): Extension<Arc<ProviderClient>>,
    query: Result<Query<CallbackArgs>, QueryRejection>,
) -> CallbackResponse {
    let args = parse_callback_args(query)?;

    complete_handshake(&registry, &*provider, &args).await
}

fn parse_callback_args(
    query: Result<Query<CallbackArgs>, QueryRejection>,
) -> Result<CallbackArgs, HandshakeError> {
    let Ok(Query(args)) = query else {
        debug!("Missing or malformed callback query parameters");
        return Err(HandshakeError::InvalidState);
    };

    // A token we issued is always 128 hex chars; anything else can never be
    // in the registry, reject it before taking the lock.
    if !valid_state(&args.state) {
        debug!("Malformed state token in callback");
        return Err(HandshakeError::InvalidState);
    }

    Ok(args)
}

// The state token is consumed before anything else happens, so a replayed
// callback URL is rejected even when the exchange below fails.
async fn complete_handshake<E: CodeExchanger>(
    registry: &StateRegistry,
    provider: &E,
    args: &CallbackArgs,
) -> CallbackResponse {
    match registry.consume(&args.state).await {
        ConsumeOutcome::Unknown => {
            debug!("Unknown or already consumed state token");
            return Err(HandshakeError::InvalidState);
        }
        ConsumeOutcome::Expired => {
            debug!("State token past its TTL");
            return Err(HandshakeError::ExpiredState);
        }
        ConsumeOutcome::Accepted => {}
    }

    let credential = provider.exchange(&args.code).await.map_err(|err| {
        error!("Failed to exchange authorization code: {err:#}");
        HandshakeError::ExchangeFailed
    })?;

    let body = serde_json::to_string_pretty(&credential).map_err(|err| {
        error!("Failed to serialize credential: {}", err);
        HandshakeError::SerializationFailed
    })?;

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));

    Ok((StatusCode::OK, headers, body))
}
