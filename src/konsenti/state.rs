//! Pending-flow state registry.
//!
//! Every handshake starts by minting a single-use anti-forgery token that is
//! round-tripped through the identity provider as the `state` query
//! parameter. The registry is the only shared mutable state in the service:
//! one instance is shared by all in-flight flows and every mutation goes
//! through its mutex, so check-and-delete on the callback path is a single
//! atomic critical section.

use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha512};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Validity window of a pending token.
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(15 * 60);

// Random bytes fed into the digest per token, well above the 256-bit
// entropy floor for an unguessable value.
const TOKEN_SEED_BYTES: usize = 512;

/// Outcome of presenting a token for consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// The token was pending and within its validity window.
    Accepted,
    /// The token was pending but past its expiry at the moment of consumption.
    Expired,
    /// The token was never issued or has already been consumed.
    Unknown,
}

#[derive(Debug)]
pub struct StateRegistry {
    ttl: Duration,
    pending: Mutex<HashMap<String, Instant>>,
}

impl StateRegistry {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Mint a new state token valid for the configured TTL.
    ///
    /// The token is a SHA-512 digest over 512 CSPRNG bytes, rendered as 128
    /// lowercase hex characters. Collisions are treated as negligible, no
    /// duplicate check is performed.
    pub async fn issue(&self) -> String {
        let token = new_state_token();
        let expires_at = Instant::now() + self.ttl;

        let mut pending = self.pending.lock().await;
        pending.insert(token.clone(), expires_at);

        token
    }

    /// Look up and remove a token in one critical section.
    ///
    /// The entry is removed before the expiry check, so any presented token
    /// is burned on first presentation even when it is rejected. Expired
    /// entries that are never presented stay in the map until consumed; that
    /// is deliberate, `consume` rejects them either way.
    pub async fn consume(&self, token: &str) -> ConsumeOutcome {
        let mut pending = self.pending.lock().await;

        match pending.remove(token) {
            None => ConsumeOutcome::Unknown,
            Some(expires_at) if Instant::now() > expires_at => ConsumeOutcome::Expired,
            Some(_) => ConsumeOutcome::Accepted,
        }
    }

    #[cfg(test)]
    pub(crate) async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }
}

impl Default for StateRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_TTL)
    }
}

fn new_state_token() -> String {
    let mut seed = [0u8; TOKEN_SEED_BYTES];
    OsRng.fill_bytes(&mut seed);

    format!("{:x}", Sha512::digest(seed))
}
