//! Runtime configuration, loaded once at startup from a JSON file.

use anyhow::{ensure, Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use url::Url;

use crate::konsenti::state::DEFAULT_STATE_TTL;

/// Google's OAuth2 authorization endpoint, the default provider.
pub const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";

/// Google's OAuth2 token endpoint, the default provider.
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub client_id: String,
    pub client_secret: SecretString,

    /// Scopes requested from the provider, space-joined in the authorization URL.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Callback URL registered with the provider, it must route back to
    /// `/oauth_callback` on this service.
    pub redirect_url: String,

    /// Extra query parameters appended to the authorization URL,
    /// e.g. `{"access_type": "offline", "prompt": "consent"}`.
    #[serde(default)]
    pub auth_url_params: HashMap<String, String>,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Validity window of a pending state token, in seconds.
    #[serde(default = "default_state_ttl_seconds")]
    pub state_ttl_seconds: u64,

    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    #[serde(default = "default_token_url")]
    pub token_url: String,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_state_ttl_seconds() -> u64 {
    DEFAULT_STATE_TTL.as_secs()
}

fn default_auth_url() -> String {
    DEFAULT_AUTH_URL.to_string()
}

fn default_token_url() -> String {
    DEFAULT_TOKEN_URL.to_string()
}

impl Config {
    /// Validate the configuration before the server starts.
    /// # Errors
    /// Returns an error when a required field is empty or a URL does not parse.
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.client_id.is_empty(), "client_id must not be empty");
        ensure!(self.state_ttl_seconds > 0, "state_ttl_seconds must be > 0");

        Url::parse(&self.auth_url).context("invalid auth_url")?;
        Url::parse(&self.token_url).context("invalid token_url")?;
        Url::parse(&self.redirect_url).context("invalid redirect_url")?;

        Ok(())
    }
}
