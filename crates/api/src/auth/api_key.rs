//! API key hashing and display helpers
//!
//! Secrets are minted by LiteLLM; the portal keeps only a SHA-256 hash and a
//! short display prefix.

use sha2::{Digest, Sha256};

/// Visible characters kept for display
const DISPLAY_PREFIX_LEN: usize = 10;

/// API key manager for hashing and display
#[derive(Clone, Copy, Default)]
pub struct ApiKeyManager;

impl ApiKeyManager {
    /// Hash an API key for storage. This is also the token id LiteLLM uses
    /// to identify the key in spend data.
    pub fn hash_key(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Extract the prefix from a key for display
    pub fn extract_prefix(key: &str) -> String {
        if key.chars().count() > DISPLAY_PREFIX_LEN {
            format!("{}...", key.chars().take(DISPLAY_PREFIX_LEN).collect::<String>())
        } else {
            key.to_string()
        }
    }

    /// LiteLLM alias for a new key: stable, unique and traceable to the owner
    pub fn key_alias(username: &str, key_id: uuid::Uuid) -> String {
        let user: String = username
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect();
        format!("{}-{}", user.trim_matches('-'), &key_id.simple().to_string()[..8])
    }
}
