//! Provider auth tokens
//!
//! Tokens are deterministic and never expire: the provider stores them at
//! launch and presents them on every callback.

use crate::uid::sha256_hex;

/// Derive the token for `user_name`
pub fn generate_token(user_name: &str, site_url: &str, label: &str) -> String {
    sha256_hex(&format!("{}{}{}", user_name, site_url, label))
}

/// Compare two byte strings in time independent of where they differ
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Check a presented token against the one derived for `user_name`
pub fn verify(user_name: &str, site_url: &str, label: &str, presented: &str) -> bool {
    let expected = generate_token(user_name, site_url, label);
    constant_time_eq(expected.as_bytes(), presented.as_bytes())
}
