//! # Konsenti (OAuth2 Handshake Broker)
//!
//! `konsenti` is a small HTTP service that brokers the server side of an
//! OAuth2 **authorization code** handshake:
//!
//! 1. `GET /` mints a single-use anti-forgery state token and redirects the
//!    user-agent to the identity provider's consent screen.
//! 2. `GET /oauth_callback` validates and burns the returned state token,
//!    exchanges the authorization code for an access/refresh token pair and
//!    returns the credential to the caller.
//!
//! State tokens live in an in-memory registry shared by all in-flight flows.
//! Each token is high-entropy (SHA-512 over 512 random bytes), time-bounded
//! (15 minutes by default) and consumed atomically on first presentation, so
//! a captured callback URL cannot be replayed even when the downstream code
//! exchange fails.
//!
//! The service does not persist tokens across restarts and does not refresh
//! or revoke credentials; it only brokers the handshake and forwards whatever
//! the provider returns.

pub mod cli;
pub mod konsenti;
