use axum::{
    extract::Extension,
    http::{header::LOCATION, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, error, instrument};

use crate::konsenti::{oauth::ProviderClient, state::StateRegistry};

#[utoipa::path(
    get,
    path= "/",
    responses (
        (status = 302, description = "Redirect to the identity provider's consent screen"),
        (status = 500, description = "Failed to build the authorization URL", body = String)
    ),
    tag = "oauth",
)]
#[instrument(skip(registry, provider))]
pub async fn login(
    Extension(registry): Extension<Arc<StateRegistry>>,
    Extension(provider): Extension<Arc<ProviderClient>>,
) -> Response {
    let state = registry.issue().await;
    let location = provider.authorize_url(&state);

    debug!("Redirecting to the authorization endpoint");

    match location.parse::<HeaderValue>() {
        Ok(value) => {
            let mut headers = HeaderMap::new();
            headers.insert(LOCATION, value);
            (StatusCode::FOUND, headers).into_response()
        }
        Err(err) => {
            error!("Failed to build Location header: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to build authorization URL".to_string(),
            )
                .into_response()
        }
    }
}
