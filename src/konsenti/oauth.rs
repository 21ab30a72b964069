//! Identity-provider client: authorization URL construction and the
//! code-for-credential exchange.

use anyhow::{bail, Context, Result};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;

use crate::konsenti::{config::Config, APP_USER_AGENT};

/// Token bundle returned by the provider after a successful code exchange.
///
/// The broker does not interpret these fields, they are forwarded to the
/// caller as-is.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
pub struct Credential {
    pub access_token: String,

    #[serde(default)]
    pub token_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

#[derive(Debug)]
pub struct ProviderClient {
    http: Client,
    auth_url: Url,
    token_url: Url,
    client_id: String,
    client_secret: SecretString,
    scopes: Vec<String>,
    redirect_url: String,
    auth_url_params: Vec<(String, String)>,
}

impl ProviderClient {
    /// Build a provider client from the validated configuration.
    /// # Errors
    /// Returns an error when an endpoint URL does not parse or the HTTP
    /// client cannot be constructed.
    pub fn new(config: &Config) -> Result<Self> {
        let http = Client::builder()
            .user_agent(APP_USER_AGENT)
            .build()
            .context("failed to build HTTP client")?;

        let auth_url = Url::parse(&config.auth_url).context("invalid auth_url")?;
        let token_url = Url::parse(&config.token_url).context("invalid token_url")?;

        // Sorted so the same configuration always yields the same URL.
        let mut auth_url_params: Vec<(String, String)> = config
            .auth_url_params
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        auth_url_params.sort();

        Ok(Self {
            http,
            auth_url,
            token_url,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            scopes: config.scopes.clone(),
            redirect_url: config.redirect_url.clone(),
            auth_url_params,
        })
    }

    /// Authorization URL the user-agent is redirected to, carrying the state
    /// token and any configured extra query parameters.
    #[must_use]
    pub fn authorize_url(&self, state: &str) -> String {
        let mut url = self.auth_url.clone();

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("response_type", "code");
            query.append_pair("client_id", &self.client_id);
            query.append_pair("redirect_uri", &self.redirect_url);
            if !self.scopes.is_empty() {
                query.append_pair("scope", &self.scopes.join(" "));
            }
            query.append_pair("state", state);
            for (key, value) in &self.auth_url_params {
                query.append_pair(key, value);
            }
        }

        url.to_string()
    }

    /// Exchange an authorization code for a credential at the provider's
    /// token endpoint.
    /// # Errors
    /// Returns an error on network failure, a non-success status or an
    /// unparsable token response.
    pub async fn exchange_code(&self, code: &str) -> Result<Credential> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_url.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
        ];

        let response = self
            .http
            .post(self.token_url.clone())
            .form(&params)
            .send()
            .await
            .context("failed to send token request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("token endpoint returned {status}: {body}");
        }

        response
            .json::<Credential>()
            .await
            .context("failed to parse token response")
    }
}
