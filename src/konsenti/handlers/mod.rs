pub mod health;
pub use self::health::health;

pub mod login;
pub use self::login::login;

pub mod callback;
pub use self::callback::callback;

// common functions for the handlers
use regex::Regex;

/// State tokens are the lowercase hex rendering of a SHA-512 digest.
pub fn valid_state(state: &str) -> bool {
    Regex::new(r"^[0-9a-f]{128}$").map_or(false, |re| re.is_match(state))
}
